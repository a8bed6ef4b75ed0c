//! End-to-end tests.
//!
//! Drives the management API and the proxy together, with a fake runtime
//! whose containers are in-process HTTP servers answering with the source
//! they were built from.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use deployflow_orchestrator::Orchestrator;
use deployflow_pack::ENTRYPOINT_FILE;
use deployflow_runtime::{GatewayFuture, RunningContainer, RuntimeError, RuntimeGateway};
use deployflow_state::StateStore;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// Runtime whose "images" are the submitted sources and whose containers
/// are loopback HTTP servers.
#[derive(Default)]
struct InProcessRuntime {
    images: Mutex<HashMap<String, String>>,
    containers: Mutex<HashMap<String, JoinHandle<()>>>,
}

fn entrypoint_source(context: &[u8]) -> Option<String> {
    let mut archive = tar::Archive::new(context);
    for entry in archive.entries().ok()? {
        let mut entry = entry.ok()?;
        if entry.path().ok()?.to_str() == Some(ENTRYPOINT_FILE) {
            let mut source = String::new();
            entry.read_to_string(&mut source).ok()?;
            return Some(source);
        }
    }
    None
}

async fn start_backend(source: String) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let source = Arc::new(source);
    let app = Router::new().fallback(move |headers: HeaderMap| {
        let source = Arc::clone(&source);
        async move {
            let forwarded_for = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();
            (
                [("x-seen-forwarded-for", forwarded_for)],
                source.as_bytes().to_vec(),
            )
        }
    });
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (port, handle)
}

impl RuntimeGateway for InProcessRuntime {
    fn build_image<'a>(&'a self, tag: &'a str, context: Vec<u8>) -> GatewayFuture<'a, ()> {
        let source = entrypoint_source(&context);
        Box::pin(async move {
            let source = source
                .ok_or_else(|| RuntimeError::Build(format!("{ENTRYPOINT_FILE} missing")))?;
            if source.contains("SyntaxError") {
                return Err(RuntimeError::Build("invalid syntax".into()));
            }
            self.images.lock().unwrap().insert(tag.to_string(), source);
            Ok(())
        })
    }

    fn run_container<'a>(&'a self, image_tag: &'a str) -> GatewayFuture<'a, RunningContainer> {
        Box::pin(async move {
            let source = self
                .images
                .lock()
                .unwrap()
                .get(image_tag)
                .cloned()
                .ok_or_else(|| RuntimeError::Run(format!("no such image {image_tag}")))?;
            let (port, handle) = start_backend(source).await;
            let id = format!("ctr-{port}");
            self.containers.lock().unwrap().insert(id.clone(), handle);
            Ok(RunningContainer {
                id,
                host_port: port,
            })
        })
    }

    fn stop_container<'a>(
        &'a self,
        container_id: &'a str,
        _grace: Duration,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            if let Some(handle) = self.containers.lock().unwrap().remove(container_id) {
                handle.abort();
            }
            Ok(())
        })
    }
}

struct Platform {
    api: Router,
    proxy: Router,
}

fn platform() -> Platform {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let orchestrator = Orchestrator::new(store.clone(), Arc::new(InProcessRuntime::default()));
    Platform {
        api: deployflow_api::build_router(orchestrator),
        proxy: deployflow_proxy::proxy_router(store),
    }
}

async fn api_call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn create_project(p: &Platform, name: &str) -> String {
    let (status, body) = api_call(&p.api, "POST", "/api/v1/projects", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn deploy(p: &Platform, project_id: &str, code: &str) -> (StatusCode, Value) {
    api_call(
        &p.api,
        "POST",
        "/api/v1/deployments",
        Some(json!({ "project_id": project_id, "code": code })),
    )
    .await
}

async fn wait_until_running(p: &Platform, deployment_id: &str) -> Value {
    for _ in 0..50 {
        let (status, body) =
            api_call(&p.api, "GET", &format!("/api/v1/deployments/{deployment_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["data"]["status"] == "running" {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("deployment {deployment_id} never reached running");
}

async fn fetch(p: &Platform, host: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .uri("/")
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap();
    let resp = p.proxy.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

const HELLO_APP: &str = r#"from flask import Flask
app = Flask(__name__)

@app.route("/")
def hello():
    return "Hello from cat-dog"

app.run(host="0.0.0.0", port=8000)
"#;

#[tokio::test]
async fn deploy_then_browse_by_subdomain() {
    let p = platform();
    let project_id = create_project(&p, "cat-dog").await;

    let (status, body) = deploy(&p, &project_id, HELLO_APP).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let deployment_id = body["data"]["id"].as_str().unwrap().to_string();

    let running = wait_until_running(&p, &deployment_id).await;
    assert!(!running["container_id"].as_str().unwrap().is_empty());
    assert_eq!(
        running["image_tag"],
        format!("deployflow-{deployment_id}").as_str()
    );
    let port = running["port"].as_u64().unwrap();
    assert!((1024..=65535).contains(&port));

    let (status, body) = fetch(&p, "cat-dog.localhost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, HELLO_APP.as_bytes());

    let (status, _) = fetch(&p, "dog-cat.localhost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn newest_running_deployment_serves_traffic() {
    let p = platform();
    let project_id = create_project(&p, "versions").await;

    let (_, first) = deploy(&p, &project_id, "v1").await;
    let first_id = first["data"]["id"].as_str().unwrap().to_string();
    // Distinct creation timestamps.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (_, second) = deploy(&p, &project_id, "v2").await;
    let second_id = second["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = fetch(&p, "versions.localhost").await;
    assert_eq!(body, b"v2");

    let (status, _) = api_call(
        &p.api,
        "POST",
        &format!("/api/v1/deployments/{second_id}/stop"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = fetch(&p, "versions.localhost").await;
    assert_eq!(body, b"v1");

    let (_, list) = api_call(&p.api, "GET", &format!("/api/v1/projects/{project_id}/deployments"), None).await;
    let ids: Vec<&str> = list["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second_id.as_str(), first_id.as_str()]);
}

#[tokio::test]
async fn failed_build_leaves_project_unroutable() {
    let p = platform();
    let project_id = create_project(&p, "broken").await;

    let (status, body) = deploy(&p, &project_id, "SyntaxError here").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    let (_, list) = api_call(&p.api, "GET", &format!("/api/v1/projects/{project_id}/deployments"), None).await;
    let failed = &list["data"][0];
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["port"], 0);
    assert_eq!(failed["container_id"], "");

    let (status, _) = fetch(&p, "broken.localhost").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn proxy_over_tcp_adds_forwarded_for() {
    let p = platform();
    let project_id = create_project(&p, "wire").await;
    let (status, _) = deploy(&p, &project_id, "over the wire").await;
    assert_eq!(status, StatusCode::CREATED);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::serve(
        listener,
        p.proxy
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::spawn(server.into_future());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /anything HTTP/1.1\r\nHost: wire.localhost:8000\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw).to_ascii_lowercase();

    assert!(text.starts_with("http/1.1 200"), "{text}");
    assert!(text.contains("x-seen-forwarded-for: 127.0.0.1"), "{text}");
    assert!(text.ends_with("over the wire"), "{text}");
}
