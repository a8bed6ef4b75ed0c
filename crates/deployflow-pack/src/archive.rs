//! In-memory tar archive builder.

use std::collections::BTreeMap;
use std::io;

use tar::{Builder, EntryType, Header};

/// Relative path → text content. Iteration order is the archive order.
pub type ContextFiles = BTreeMap<String, String>;

/// Permission bits recorded for every entry.
const ENTRY_MODE: u32 = 0o600;

/// Serialise `files` into a finished tar stream.
///
/// Each entry gets a header carrying its path, mode `0600`, byte length and
/// `mtime` (unix seconds), followed by the raw content. The same input always
/// yields the same bytes. The stream ends with the end-of-archive marker.
pub fn build_context(files: &ContextFiles, mtime: u64) -> io::Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    for (path, body) in files {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(ENTRY_MODE);
        header.set_size(body.len() as u64);
        header.set_mtime(mtime);
        builder.append_data(&mut header, path, body.as_bytes())?;
    }
    builder.into_inner()
}
