//! Request path containment
//!
//! Three independent layers, any of which rejects:
//! 1. the raw target is screened for `..`, a leading `/./` and `//`;
//! 2. the percent-decoded path is normalized lexically and must not climb
//!    above the resource root;
//! 3. if the target exists, its canonical form must still lie under the
//!    canonical root (catches symlinks pointing outside).

use std::path::{Component, Path, PathBuf};

/// Why a path was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalKind {
    /// The raw target contains `..`
    DotDot,
    /// The raw target begins with `/./`
    DotSegment,
    /// The raw target contains `//`
    DoubleSlash,
    /// Percent-decoding produced bytes that cannot name a file
    BadEncoding,
    /// Resolution lands outside the resource root
    OutsideRoot,
}

impl std::fmt::Display for TraversalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TraversalKind::DotDot => "path contains '..'",
            TraversalKind::DotSegment => "path begins with '/./'",
            TraversalKind::DoubleSlash => "path contains '//'",
            TraversalKind::BadEncoding => "path has an invalid encoding",
            TraversalKind::OutsideRoot => "path resolves outside the resource directory",
        };
        f.write_str(text)
    }
}

/// Layer 1: reject suspicious raw targets before any resolution
pub fn screen_raw_target(target: &str) -> Result<(), TraversalKind> {
    if target.contains("..") {
        return Err(TraversalKind::DotDot);
    }
    if target.starts_with("/./") {
        return Err(TraversalKind::DotSegment);
    }
    if target.contains("//") {
        return Err(TraversalKind::DoubleSlash);
    }
    Ok(())
}

/// Layer 2: map a request target to a path under `root`
///
/// The query string and fragment are dropped, the remainder is
/// percent-decoded and normalized without touching the filesystem. The root
/// itself maps to `default_document`.
pub fn resolve_under_root(
    target: &str,
    root: &Path,
    default_document: &str,
) -> Result<PathBuf, TraversalKind> {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    let decoded = percent_decode(&target[..end]).ok_or(TraversalKind::BadEncoding)?;
    if decoded.contains('\0') || decoded.contains('\\') {
        return Err(TraversalKind::BadEncoding);
    }

    let relative = decoded.trim_start_matches('/');
    let relative = if relative.is_empty() { default_document } else { relative };

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(TraversalKind::OutsideRoot);
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(TraversalKind::OutsideRoot);
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(default_document);
    }

    Ok(root.join(normalized))
}

/// Layer 3: if `candidate` exists, its canonical path must stay under `root`
///
/// Missing files pass; the dispatcher answers those with 404.
pub fn confine_existing(candidate: &Path, root: &Path) -> Result<(), TraversalKind> {
    let Ok(resolved) = candidate.canonicalize() else {
        return Ok(());
    };
    let root = root.canonicalize().map_err(|_| TraversalKind::OutsideRoot)?;
    if resolved.starts_with(&root) {
        Ok(())
    } else {
        Err(TraversalKind::OutsideRoot)
    }
}

/// Decode `%XX` escapes. Returns `None` for malformed escapes or non-UTF-8 output.
fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_digit)?;
                let lo = bytes.get(i + 2).copied().and_then(hex_digit)?;
                result.push((hi << 4) | lo);
                i += 3;
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(result).ok()
}

/// Convert a hex character to its numeric value
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
