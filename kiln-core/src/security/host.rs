//! `Host` header validation

/// Outcome of checking a `Host` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCheck {
    Allowed,
    Missing,
    Mismatch,
}

/// The set of `Host` values this server answers to
///
/// Exactly `{configured_host}:{port}`, `localhost:{port}` and
/// `127.0.0.1:{port}`. The hostname compares case-insensitively, the port
/// must match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPolicy {
    port: u16,
    hostnames: Vec<String>,
}

impl HostPolicy {
    pub fn new(configured_host: &str, port: u16) -> Self {
        let mut hostnames = Vec::with_capacity(3);
        for name in [configured_host, "localhost", "127.0.0.1"] {
            let name = normalize_hostname(name);
            if !name.is_empty() && !hostnames.contains(&name) {
                hostnames.push(name);
            }
        }
        Self { port, hostnames }
    }

    /// Check a `Host` header value (`None` when the header is absent)
    pub fn check(&self, host_header: Option<&str>) -> HostCheck {
        let Some(value) = host_header.map(str::trim) else {
            return HostCheck::Missing;
        };
        if value.is_empty() {
            return HostCheck::Missing;
        }

        let Some((hostname, port)) = value.rsplit_once(':') else {
            return HostCheck::Mismatch;
        };
        if port != self.port.to_string() {
            return HostCheck::Mismatch;
        }

        let hostname = hostname.to_ascii_lowercase();
        if self.hostnames.iter().any(|allowed| *allowed == hostname) {
            HostCheck::Allowed
        } else {
            HostCheck::Mismatch
        }
    }
}

/// Lower-case a hostname and bracket bare IPv6 literals
fn normalize_hostname(name: &str) -> String {
    let name = name.trim().to_ascii_lowercase();
    if name.contains(':') && !name.starts_with('[') {
        format!("[{}]", name)
    } else {
        name
    }
}
