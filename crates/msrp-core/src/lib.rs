//! MSRP transport for RCS sessions
//!
//! This crate provides the chunked message transport negotiated inside a
//! chat, file-transfer or generic SIP/MSRP session (RFC 4975), the
//! connectors that establish its TCP connection and the activity monitor
//! that detects idle sessions.

pub mod error;
pub mod chunk;
pub mod codec;
pub mod path;
pub mod session;
pub mod connector;
pub mod activity;

pub use error::{MsrpError, Result};
pub use chunk::{ByteRange, ChunkType, ContinuationFlag, MsrpChunk, StartLine};
pub use codec::MsrpCodec;
pub use path::MsrpPath;
pub use session::{MsrpEvent, MsrpSession, MsrpSessionConfig};
pub use connector::{ConnectRequest, MsrpConnector, MsrpStream, SetupRole, TcpConnector};
pub use activity::ActivityMonitor;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        ActivityMonitor, ChunkType, ConnectRequest, MsrpConnector, MsrpError, MsrpEvent, MsrpPath,
        MsrpSession, MsrpSessionConfig, MsrpStream, Result, SetupRole, TcpConnector,
    };
}
