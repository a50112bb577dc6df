//! Store format detection.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::log_store::{LogStore, MAGIC};

/// Guess which engine wrote the file at `path`.
///
/// Returns `None` if the file cannot be opened or read, `Some("")` if the
/// format is not recognized, and the engine name otherwise.
pub fn whichdb(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "whichdb: cannot open");
            return None;
        }
    };

    let mut header = Vec::with_capacity(MAGIC.len());
    if let Err(e) = file.by_ref().take(MAGIC.len() as u64).read_to_end(&mut header) {
        tracing::debug!(path = %path.display(), error = %e, "whichdb: cannot read");
        return None;
    }

    if header == MAGIC[..] {
        Some(LogStore::ENGINE_NAME.to_string())
    } else {
        Some(String::new())
    }
}
