//! Dev server URL helpers.

use std::net::{IpAddr, UdpSocket};
use std::sync::LazyLock;

use regex::Regex;
use tokio::net::TcpListener;

use crate::error::{Result, ServiceError};

static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([a-z][a-z\d+\-.]*:)?//").expect("valid regex"));

static PRIVATE_IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10[.]|^172[.](1[6-9]|2[0-9]|3[0-1])[.]|^192[.]168[.]").expect("valid regex")
});

static HAS_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]+://").expect("valid regex"));

/// `scheme://` or protocol-relative `//` URLs.
pub fn is_absolute_url(url: &str) -> bool {
    ABSOLUTE_URL.is_match(url)
}

pub fn is_private_ipv4(address: &str) -> bool {
    PRIVATE_IPV4.is_match(address)
}

/// Prefix `protocol://` unless `url` already has a scheme.
pub fn with_protocol(protocol: &str, url: &str) -> String {
    if HAS_SCHEME.is_match(url) {
        url.to_string()
    } else {
        format!("{protocol}://{url}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrls {
    /// LAN address to hand to clients, if one was found.
    pub lan_url_for_config: Option<String>,
    pub lan_url_for_terminal: Option<String>,
    pub local_url_for_terminal: String,
    pub local_url_for_browser: String,
}

/// URLs a dev server on `host:port` is reachable at.
///
/// An unspecified host (`0.0.0.0`, `::`) is shown as `localhost`, and the
/// machine's private LAN address is looked up for other devices.
pub fn prepare_urls(protocol: &str, host: &str, port: u16, pathname: &str) -> ServerUrls {
    let format_url = |hostname: &str| format!("{protocol}://{hostname}:{port}{pathname}");

    let unspecified = host == "0.0.0.0" || host == "::";
    let (pretty_host, lan_host) = if unspecified {
        let lan = lan_address().filter(|ip| is_private_ipv4(ip));
        ("localhost".to_string(), lan)
    } else {
        (host.to_string(), Some(host.to_string()))
    };

    ServerUrls {
        lan_url_for_terminal: lan_host.as_deref().map(format_url),
        lan_url_for_config: lan_host,
        local_url_for_terminal: format_url(&pretty_host),
        local_url_for_browser: format_url(&pretty_host),
    }
}

/// The IPv4 address of the interface holding the default route.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn lan_address() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() && !ip.is_loopback() => Some(ip.to_string()),
        _ => None,
    }
}

/// First port at or above `base` that can be bound on `host`.
pub async fn find_free_port(host: &str, base: u16) -> Result<u16> {
    for port in base..=u16::MAX {
        if TcpListener::bind((host, port)).await.is_ok() {
            return Ok(port);
        }
    }
    Err(ServiceError::Server(format!(
        "no free port found on {host} at or above {base}"
    )))
}

/// Whether the process runs inside a container, where the public URL
/// cannot be inferred.
pub fn in_container() -> bool {
    static CGROUP: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r":/(lxc|docker|kubepods)/").expect("valid regex"));
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|content| CGROUP.is_match(&content))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_urls() {
        assert!(is_absolute_url("https://cdn.example.com/"));
        assert!(is_absolute_url("//cdn.example.com/"));
        assert!(!is_absolute_url("/app/"));
        assert!(!is_absolute_url(""));
    }

    #[test]
    fn private_ranges() {
        assert!(is_private_ipv4("10.1.2.3"));
        assert!(is_private_ipv4("172.20.0.1"));
        assert!(is_private_ipv4("192.168.1.10"));
        assert!(!is_private_ipv4("172.32.0.1"));
        assert!(!is_private_ipv4("8.8.8.8"));
    }

    #[test]
    fn explicit_host_is_used_everywhere() {
        let urls = prepare_urls("http", "127.0.0.1", 8080, "/app/");
        assert_eq!(urls.local_url_for_browser, "http://127.0.0.1:8080/app/");
        assert_eq!(urls.lan_url_for_config.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn unspecified_host_shows_localhost() {
        let urls = prepare_urls("https", "0.0.0.0", 3000, "/");
        assert_eq!(urls.local_url_for_terminal, "https://localhost:3000/");
        if let Some(lan) = &urls.lan_url_for_config {
            assert!(is_private_ipv4(lan));
        }
    }

    #[test]
    fn protocol_prefix() {
        assert_eq!(with_protocol("http", "example.test:8080"), "http://example.test:8080");
        assert_eq!(with_protocol("http", "https://example.test"), "https://example.test");
    }

    #[tokio::test]
    async fn free_port_skips_bound_ports() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let free = find_free_port("127.0.0.1", port).await.unwrap();
        assert_ne!(free, port);
        assert!(free > port);
    }
}
