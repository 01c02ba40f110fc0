use std::net::{AddrParseError, SocketAddr};
use std::num::ParseIntError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum HostPortError {
    #[error("Invalid port: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Invalid hostname: {0}")]
    InvalidHostname(#[from] AddrParseError),
}

/// Gets the host:port from the env vars HOST and PORT.
/// Uses defaults `127.0.0.1:3000` if env vars are unset.
pub fn get_api_base_url() -> Result<SocketAddr, HostPortError> {
    parse_host_port(std::env::var("HOST").ok(), std::env::var("PORT").ok())
}

/// Blank values fall back to the defaults.
pub fn parse_host_port(host: Option<String>, port: Option<String>) -> Result<SocketAddr, HostPortError> {
    let host = host
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match port.filter(|p| !p.trim().is_empty()) {
        Some(p) => p.trim().parse::<u16>()?,
        None => DEFAULT_PORT,
    };
    Ok(format!("{}:{}", host.trim(), port).parse::<SocketAddr>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let addr = parse_host_port(None, Some(" ".to_string())).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_explicit_host_port() {
        let addr = parse_host_port(Some("0.0.0.0".to_string()), Some("8080".to_string())).unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            parse_host_port(None, Some("http".to_string())),
            Err(HostPortError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_host_port(Some("not a host".to_string()), None),
            Err(HostPortError::InvalidHostname(_))
        ));
    }
}
