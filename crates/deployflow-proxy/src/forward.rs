//! Streaming HTTP/1.1 forwarding to a resolved backend.
//!
//! Each request opens its own connection to the backend. Request and
//! response bodies are passed through as streams; neither is buffered.
//! A request asking to switch protocols (e.g. WebSocket) is tunnelled
//! byte-for-byte once the backend answers `101 Switching Protocols`.

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::RoutingError;
use crate::router::Route;

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single hop and must not be relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forward `request` to `route.backend` and stream the reply back.
///
/// `original_host` is passed on as `X-Forwarded-Host`; the backend sees its
/// own address in `Host`.
pub async fn forward(
    route: &Route,
    original_host: &str,
    request: Request,
) -> Result<Response, RoutingError> {
    let backend = route.backend;
    let stream = TcpStream::connect(backend)
        .await
        .map_err(|e| RoutingError::BackendUnreachable(format!("connect to {backend}: {e}")))?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| RoutingError::BackendUnreachable(format!("handshake with {backend}: {e}")))?;

    tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            debug!(%backend, error = %e, "backend connection closed with error");
        }
    });

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let (mut parts, body) = request.into_parts();
    // Only a connection the server can hand over is eligible for tunnelling.
    let client_upgrade = upgrade_protocol(&parts.headers)
        .and_then(|protocol| Some((protocol, parts.extensions.remove::<OnUpgrade>()?)));

    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_owned();

    let mut builder = hyper::Request::builder()
        .method(parts.method)
        .uri(&path)
        .version(hyper::Version::HTTP_11);

    let headers = builder
        .headers_mut()
        .ok_or_else(|| RoutingError::RequestBuild(format!("invalid request for {path}")))?;
    copy_end_to_end(&parts.headers, headers);
    headers.insert(header::HOST, header_value(&backend.to_string())?);
    headers.insert(X_FORWARDED_HOST, header_value(original_host)?);
    if let Some(ip) = client_addr {
        let forwarded_for = match parts.headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip.to_string(),
        };
        headers.insert(X_FORWARDED_FOR, header_value(&forwarded_for)?);
    }
    if let Some((protocol, _)) = &client_upgrade {
        headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
        headers.insert(header::UPGRADE, protocol.clone());
    }

    let upstream = builder
        .body(body)
        .map_err(|e| RoutingError::RequestBuild(e.to_string()))?;

    trace!(%backend, %path, "forwarding request");
    let mut response = sender
        .send_request(upstream)
        .await
        .map_err(|e| RoutingError::BackendUnreachable(format!("request to {backend}: {e}")))?;

    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let Some((_, client_on)) = client_upgrade else {
            return Err(RoutingError::BackendUnreachable(format!(
                "{backend} switched protocols without an upgrade request"
            )));
        };
        let backend_on = hyper::upgrade::on(&mut response);
        tokio::spawn(tunnel(client_on, backend_on, backend));
    }

    Ok(into_axum_response(response))
}

/// Splice an upgraded client connection to the upgraded backend connection.
async fn tunnel(client: OnUpgrade, upstream: OnUpgrade, backend: SocketAddr) {
    let (client, upstream) = match tokio::try_join!(client, upstream) {
        Ok(pair) => pair,
        Err(e) => {
            debug!(%backend, error = %e, "protocol upgrade failed");
            return;
        }
    };
    let mut client = TokioIo::new(client);
    let mut upstream = TokioIo::new(upstream);
    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((sent, received)) => trace!(%backend, sent, received, "tunnel closed"),
        Err(e) => debug!(%backend, error = %e, "tunnel closed with error"),
    }
}

fn into_axum_response(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    let mut headers = HeaderMap::with_capacity(parts.headers.len());
    copy_end_to_end(&parts.headers, &mut headers);
    if parts.status == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(protocol) = parts.headers.get(header::UPGRADE) {
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, protocol.clone());
        }
    }
    parts.headers = headers;
    Response::from_parts(parts, Body::new(body))
}

/// Header names the `Connection` header marks as hop-by-hop.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// The requested protocol when the request asks to switch protocols.
fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = connection_listed(headers).contains(&header::UPGRADE);
    let protocol = headers.get(header::UPGRADE)?;
    wants_upgrade.then(|| protocol.clone())
}

fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap) {
    let listed = connection_listed(from);
    for (name, value) in from {
        if name != header::HOST && !HOP_BY_HOP.contains(name) && !listed.contains(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RoutingError> {
    HeaderValue::from_str(value)
        .map_err(|_| RoutingError::RequestBuild(format!("invalid header value {value:?}")))
}
