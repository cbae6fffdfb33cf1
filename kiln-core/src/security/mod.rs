//! Kiln Security Module
//!
//! Side-effect-free request validation: the `Host` header policy and path
//! containment under the resource root. Every check returns a tagged
//! [`SecurityDecision`]; the connection handler turns rejections into
//! responses.
//!
//! ## Layers
//! - **Host policy**: `Host` must name this server and its bound port
//! - **Raw screen**: `..`, a leading `/./` and `//` are refused unresolved
//! - **Lexical containment**: the decoded path may not climb above the root
//! - **Canonical containment**: existing targets may not escape via symlinks

mod host;
mod path;

use std::path::{Path, PathBuf};

pub use host::{HostCheck, HostPolicy};
pub use path::{confine_existing, resolve_under_root, screen_raw_target, TraversalKind};

/// Outcome of validating one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityDecision {
    /// The request may be dispatched; `path` is the resolved file under the root
    Allow { path: PathBuf },
    /// The path escapes, or tries to escape, the resource root (403)
    RejectPathTraversal(TraversalKind),
    /// `Host` names some other server (403)
    RejectHostMismatch,
    /// `Host` is absent (400)
    RejectHostMissing,
}

impl SecurityDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SecurityDecision::Allow { .. })
    }

    /// The resolved path, only present on `Allow`
    pub fn resolved_path(&self) -> Option<&Path> {
        match self {
            SecurityDecision::Allow { path } => Some(path),
            _ => None,
        }
    }
}

/// Validates requests against one host policy and one resource root
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    hosts: HostPolicy,
    root: PathBuf,
    default_document: String,
}

impl SecurityValidator {
    pub fn new(hosts: HostPolicy, root: impl Into<PathBuf>, default_document: &str) -> Self {
        Self { hosts, root: root.into(), default_document: default_document.to_string() }
    }

    /// Check the `Host` header first, then the request target
    pub fn validate(&self, host_header: Option<&str>, target: &str) -> SecurityDecision {
        match self.hosts.check(host_header) {
            HostCheck::Allowed => self.validate_path(target),
            HostCheck::Missing => SecurityDecision::RejectHostMissing,
            HostCheck::Mismatch => SecurityDecision::RejectHostMismatch,
        }
    }

    /// Path containment only; every layer must pass
    pub fn validate_path(&self, target: &str) -> SecurityDecision {
        let resolved = screen_raw_target(target)
            .and_then(|()| resolve_under_root(target, &self.root, &self.default_document))
            .and_then(|path| confine_existing(&path, &self.root).map(|()| path));

        match resolved {
            Ok(path) => SecurityDecision::Allow { path },
            Err(kind) => SecurityDecision::RejectPathTraversal(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn validator(root: &Path) -> SecurityValidator {
        SecurityValidator::new(HostPolicy::new("127.0.0.1", 8080), root, "index.html")
    }

    #[test]
    fn test_host_is_checked_before_path() {
        let v = validator(Path::new("/srv/www"));

        assert_eq!(v.validate(None, "/../etc/passwd"), SecurityDecision::RejectHostMissing);
        assert_eq!(
            v.validate(Some("evil.com:8080"), "/../etc/passwd"),
            SecurityDecision::RejectHostMismatch
        );
        assert_eq!(
            v.validate(Some("localhost:8080"), "/../etc/passwd"),
            SecurityDecision::RejectPathTraversal(TraversalKind::DotDot)
        );
    }

    #[test]
    fn test_dot_dot_rejected_whether_or_not_target_exists() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("sub")).unwrap();
        fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();
        let v = validator(root.path());

        // Resolves to an existing file inside the root, still refused
        assert!(!v.validate_path("/sub/../index.html").is_allowed());
        assert!(!v.validate_path("/../../etc/passwd").is_allowed());
        assert!(!v.validate_path("/nonexistent/..").is_allowed());
    }

    #[test]
    fn test_allowed_paths_resolve_under_root() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();
        let v = validator(root.path());

        let slash = v.validate(Some("localhost:8080"), "/");
        let index = v.validate(Some("localhost:8080"), "/index.html");
        assert!(slash.is_allowed());
        assert_eq!(slash.resolved_path(), index.resolved_path());
        assert_eq!(slash.resolved_path(), Some(root.path().join("index.html").as_path()));

        // Missing files are allowed through; the dispatcher answers 404
        assert!(v.validate_path("/missing.txt").is_allowed());
    }

    #[test]
    fn test_layers_are_independent() {
        let v = validator(Path::new("/srv/www"));

        // Passes the raw screen, caught by lexical containment after decoding
        assert_eq!(
            v.validate_path("/%2e%2e/secret.txt"),
            SecurityDecision::RejectPathTraversal(TraversalKind::OutsideRoot)
        );
        // Caught by the raw screen even though it would normalize inside the root
        assert_eq!(
            v.validate_path("/./index.html"),
            SecurityDecision::RejectPathTraversal(TraversalKind::DotSegment)
        );
        assert_eq!(
            v.validate_path("//index.html"),
            SecurityDecision::RejectPathTraversal(TraversalKind::DoubleSlash)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("passwd.txt"), "root:x:0:0").unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("passwd.txt"), root.path().join("p.txt"))
            .unwrap();

        let v = validator(root.path());
        assert_eq!(
            v.validate(Some("127.0.0.1:8080"), "/p.txt"),
            SecurityDecision::RejectPathTraversal(TraversalKind::OutsideRoot)
        );
    }
}
