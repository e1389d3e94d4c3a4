//! MSRP URIs: `msrp://host:port/session-id;tcp`

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::MsrpError;

const SESSION_ID_LEN: usize = 12;

/// An MSRP URI identifying one end of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MsrpPath {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub session_id: String,
    pub transport: String,
}

impl MsrpPath {
    pub fn new(host: impl Into<String>, port: u16, session_id: impl Into<String>) -> Self {
        Self {
            secure: false,
            host: host.into(),
            port,
            session_id: session_id.into(),
            transport: "tcp".to_string(),
        }
    }

    /// A path with a random session id
    pub fn generate(host: impl Into<String>, port: u16, secure: bool) -> Self {
        let session_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        Self {
            secure,
            ..Self::new(host, port, session_id)
        }
    }
}

impl fmt::Display for MsrpPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "msrps" } else { "msrp" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}/{};{}", scheme, self.host, self.port, self.session_id, self.transport)
        } else {
            write!(f, "{}://{}:{}/{};{}", scheme, self.host, self.port, self.session_id, self.transport)
        }
    }
}

impl FromStr for MsrpPath {
    type Err = MsrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MsrpError::invalid_path(s);
        let s = s.trim();
        let (secure, rest) = if let Some(rest) = s.strip_prefix("msrps://") {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix("msrp://") {
            (false, rest)
        } else {
            return Err(invalid());
        };

        let (authority, resource) = rest.split_once('/').ok_or_else(invalid)?;
        let (session_id, transport) = resource.split_once(';').ok_or_else(invalid)?;
        if session_id.is_empty() || transport.is_empty() {
            return Err(invalid());
        }

        let authority = authority.rsplit('@').next().unwrap_or(authority);
        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, port) = bracketed.split_once("]:").ok_or_else(invalid)?;
            (host, port)
        } else {
            authority.rsplit_once(':').ok_or_else(invalid)?
        };
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(MsrpPath {
            secure,
            host: host.to_string(),
            port,
            session_id: session_id.to_string(),
            transport: transport.to_ascii_lowercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let path: MsrpPath = "msrp://192.0.2.10:7394/2s93i9ek2a;tcp".parse().unwrap();
        assert!(!path.secure);
        assert_eq!(path.host, "192.0.2.10");
        assert_eq!(path.port, 7394);
        assert_eq!(path.session_id, "2s93i9ek2a");
        assert_eq!(path.to_string(), "msrp://192.0.2.10:7394/2s93i9ek2a;tcp");
    }

    #[test]
    fn test_ipv6_and_secure() {
        let path: MsrpPath = "msrps://[2001:db8::1]:443/abc;tcp".parse().unwrap();
        assert!(path.secure);
        assert_eq!(path.host, "2001:db8::1");
        assert_eq!(path.to_string(), "msrps://[2001:db8::1]:443/abc;tcp");
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["http://a:1/x;tcp", "msrp://a/x;tcp", "msrp://a:1/x", "msrp://a:port/x;tcp"] {
            assert!(bad.parse::<MsrpPath>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_generate() {
        let a = MsrpPath::generate("10.0.0.1", 9, false);
        let b = MsrpPath::generate("10.0.0.1", 9, false);
        assert_eq!(a.session_id.len(), 12);
        assert_ne!(a.session_id, b.session_id);
    }
}
