use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{Marker, TempRoute};

/// Extension for temp files whose slot has no more specific marker.
pub const DEFAULT_EXTENSION: &str = ".tmp";
/// Prefix used when none, or a too-short one, is configured.
pub const FALLBACK_PREFIX: &str = "arg";
/// Shortest prefix a user may configure.
pub const MIN_PREFIX_LEN: usize = 3;

/// True if `prefix` is long enough to be used for a temp file name.
pub fn prefix_is_valid(prefix: &str) -> bool {
    prefix.chars().count() >= MIN_PREFIX_LEN
}

/// The prefix actually used when creating a temp file.
pub fn effective_prefix(route: &TempRoute) -> &str {
    match route.prefix.as_deref() {
        Some(prefix) if prefix_is_valid(prefix) => prefix,
        _ => FALLBACK_PREFIX,
    }
}

/// The extension actually used when creating a temp file.
pub fn extension_for(marker: Option<Marker>) -> &'static str {
    marker.and_then(Marker::extension).unwrap_or(DEFAULT_EXTENSION)
}

/// Create a new, uniquely named, writable file in `dir`.
/// The file is deleted again when dropped unless it is persisted.
pub fn create(dir: &Path, route: &TempRoute, marker: Option<Marker>) -> io::Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix(effective_prefix(route))
        .suffix(extension_for(marker))
        .tempfile_in(dir)?;
    log::debug!("created temp file {:?}", file.path());
    Ok(file)
}
