//! Shared save/load plumbing.
//!
//! Every filter serializes to a magic-tagged, host-local byte buffer (see
//! each module's `serialize`/`deserialize`) and reuses [`write_file`] /
//! [`read_file`] to get those bytes on and off disk. Centralizing the
//! filesystem calls here means the "open a file descriptor for the
//! duration of the call and release it on every exit path" contract (spec
//! §5) only has to be gotten right once.

use std::fs;
use std::path::Path;

use crate::error::Error;

pub(crate) fn write_file(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), Error> {
    fs::write(path, bytes).map_err(|e| Error::io(e, "write filter to disk"))
}

pub(crate) fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|e| Error::io(e, "read filter from disk"))
}
