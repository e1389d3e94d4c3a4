//! Establishing the MSRP connection

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{MsrpError, Result};

/// A bidirectional byte stream carrying an MSRP session
pub trait MsrpStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> MsrpStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Connection setup role negotiated in SDP (RFC 4145 / RFC 6135)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupRole {
    /// Opens the connection
    Active,
    /// Waits for the peer to connect
    Passive,
    /// Either, decided by the answerer
    ActPass,
}

impl SetupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupRole::Active => "active",
            SetupRole::Passive => "passive",
            SetupRole::ActPass => "actpass",
        }
    }

    /// Role an answerer takes for an offered role
    pub fn answer_to(offer: Option<SetupRole>) -> SetupRole {
        match offer {
            Some(SetupRole::Active) => SetupRole::Passive,
            Some(SetupRole::Passive) => SetupRole::Active,
            Some(SetupRole::ActPass) | None => SetupRole::Passive,
        }
    }

    /// Whether this side opens the TCP connection
    pub fn is_active(&self) -> bool {
        matches!(self, SetupRole::Active)
    }
}

impl fmt::Display for SetupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetupRole {
    type Err = MsrpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SetupRole::Active),
            "passive" => Ok(SetupRole::Passive),
            "actpass" => Ok(SetupRole::ActPass),
            other => Err(MsrpError::protocol(format!("unknown setup role: {}", other))),
        }
    }
}

/// Where and how to open the media connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Role this side plays
    pub setup: SetupRole,
    /// Local address to listen on when passive
    pub local_addr: SocketAddr,
    pub remote_host: String,
    pub remote_port: u16,
}

/// Opens the byte stream of an MSRP session
#[async_trait]
pub trait MsrpConnector: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn MsrpStream>>;
}

/// TCP connector: connects when active, accepts one connection when passive
#[derive(Debug, Clone)]
pub struct TcpConnector {
    accept_timeout: Duration,
}

impl TcpConnector {
    pub fn new(accept_timeout: Duration) -> Self {
        Self { accept_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl MsrpConnector for TcpConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn MsrpStream>> {
        if request.setup.is_active() {
            let address = format!("{}:{}", request.remote_host, request.remote_port);
            debug!("Opening MSRP connection to {}", address);
            let stream = TcpStream::connect((request.remote_host.as_str(), request.remote_port))
                .await
                .map_err(|e| MsrpError::connect(address.clone(), e.to_string()))?;
            stream.set_nodelay(true)?;
            info!("MSRP connection established to {}", address);
            Ok(Box::new(stream))
        } else {
            let listener = TcpListener::bind(request.local_addr).await?;
            debug!("Waiting for MSRP connection on {}", request.local_addr);
            let (stream, peer) = tokio::time::timeout(self.accept_timeout, listener.accept())
                .await
                .map_err(|_| MsrpError::connect(request.local_addr.to_string(), "timed out waiting for peer"))??;
            stream.set_nodelay(true)?;
            info!("MSRP connection accepted from {}", peer);
            Ok(Box::new(stream))
        }
    }
}
