//! Remote address resolution.

use std::net::SocketAddr;

use crate::config::ServerConfig;

/// Extract the first (client-nearest) IP from an `x-forwarded-for` header.
pub fn first_forwarded_for(header: &str) -> Option<String> {
    header
        .split(',')
        .next()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
}

/// Resolve the human-readable remote address of a connection, honoring the
/// proxy and anonymization settings.
pub fn resolve_address(
    remote: Option<SocketAddr>,
    forwarded_for: Option<&str>,
    config: &ServerConfig,
) -> String {
    if config.anonymize_addresses {
        return "0.0.0.0".to_string();
    }

    let mut address = match remote {
        Some(addr) => addr.ip().to_string(),
        None => "(remote address missing)".to_string(),
    };

    if config.trust_proxy {
        if let Some(forwarded) = forwarded_for.and_then(first_forwarded_for) {
            address = forwarded;
        }
    }

    address
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Option<SocketAddr> {
        Some("10.0.0.1:5000".parse().unwrap())
    }

    #[test]
    fn forwarded_for_takes_first_entry() {
        assert_eq!(
            first_forwarded_for("203.0.113.7, 10.0.0.2"),
            Some("203.0.113.7".to_string())
        );
        assert_eq!(first_forwarded_for(""), None);
    }

    #[test]
    fn proxy_header_requires_trust() {
        let mut config = ServerConfig::default();
        assert_eq!(
            resolve_address(remote(), Some("203.0.113.7"), &config),
            "10.0.0.1"
        );
        config.trust_proxy = true;
        assert_eq!(
            resolve_address(remote(), Some("203.0.113.7"), &config),
            "203.0.113.7"
        );
    }

    #[test]
    fn anonymization_wins() {
        let mut config = ServerConfig::default();
        config.trust_proxy = true;
        config.anonymize_addresses = true;
        assert_eq!(
            resolve_address(remote(), Some("203.0.113.7"), &config),
            "0.0.0.0"
        );
    }
}
