//! The fixed deployment template.
//!
//! Every deployment is built from the same manifest: a slim Python base
//! image with Flask installed, the submitted source copied in as the entry
//! point, and one exposed port. The template is not configurable.

use std::io;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::archive::{build_context, ContextFiles};

/// Manifest file name the runtime looks for inside the context.
pub const MANIFEST_FILE: &str = "Dockerfile";

/// File the submitted source is written to.
pub const ENTRYPOINT_FILE: &str = "app.py";

/// Port the application listens on inside the container.
pub const APP_PORT: u16 = 8000;

const MANIFEST: &str = r#"FROM python:3.9-slim
WORKDIR /app
RUN pip install flask
COPY app.py /app/app.py
EXPOSE 8000
CMD ["python", "app.py"]
"#;

/// The files making up one deployment's build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    files: ContextFiles,
}

/// A packed build context ready to stream to the runtime.
#[derive(Debug, Clone)]
pub struct PackedContext {
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl BuildContext {
    /// Wrap `source` verbatim with the fixed manifest.
    pub fn for_source(source: &str) -> Self {
        let mut files = ContextFiles::new();
        files.insert(MANIFEST_FILE.to_string(), MANIFEST.to_string());
        files.insert(ENTRYPOINT_FILE.to_string(), source.to_string());
        Self { files }
    }

    pub fn files(&self) -> &ContextFiles {
        &self.files
    }

    /// Serialise into a tar stream stamped with `mtime` (unix seconds).
    pub fn pack(&self, mtime: u64) -> io::Result<PackedContext> {
        let bytes = build_context(&self.files, mtime)?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        debug!(size = bytes.len(), %sha256, "build context packed");
        Ok(PackedContext { bytes, sha256 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_matches_entrypoint_and_port() {
        assert!(MANIFEST.contains(&format!("COPY {ENTRYPOINT_FILE} /app/{ENTRYPOINT_FILE}")));
        assert!(MANIFEST.contains(&format!("EXPOSE {APP_PORT}")));
        assert!(MANIFEST.starts_with("FROM "));
    }

    #[test]
    fn source_is_copied_verbatim() {
        let source = "from flask import Flask\napp = Flask(__name__)\n\t# tabs & ünïcode\n";
        let ctx = BuildContext::for_source(source);

        assert_eq!(ctx.files().len(), 2);
        assert_eq!(ctx.files()[ENTRYPOINT_FILE], source);
        assert_eq!(ctx.files()[MANIFEST_FILE], MANIFEST);
    }

    #[test]
    fn pack_is_stable_for_same_input() {
        let ctx = BuildContext::for_source("print('ok')");
        let a = ctx.pack(1000).unwrap();
        let b = ctx.pack(1000).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.sha256.len(), 64);

        let other = BuildContext::for_source("print('changed')").pack(1000).unwrap();
        assert_ne!(a.sha256, other.sha256);
    }
}
