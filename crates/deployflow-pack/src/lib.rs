//! deployflow pack — package submitted source into a container build context.
//!
//! Two layers:
//! - [`archive`] serialises an ordered set of in-memory files into a tar
//!   stream the container runtime's image-build endpoint accepts.
//! - [`template`] synthesises the fixed build manifest that wraps a single
//!   submitted source file.

pub mod archive;
pub mod template;

pub use archive::{build_context, ContextFiles};
pub use template::{BuildContext, PackedContext, APP_PORT, ENTRYPOINT_FILE, MANIFEST_FILE};
