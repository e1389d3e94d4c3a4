//! MSRP chunks: requests and responses carried on the session connection

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::MsrpError;

pub const HEADER_TO_PATH: &str = "To-Path";
pub const HEADER_FROM_PATH: &str = "From-Path";
pub const HEADER_MESSAGE_ID: &str = "Message-ID";
pub const HEADER_BYTE_RANGE: &str = "Byte-Range";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_STATUS: &str = "Status";
pub const HEADER_SUCCESS_REPORT: &str = "Success-Report";
pub const HEADER_FAILURE_REPORT: &str = "Failure-Report";

pub const METHOD_SEND: &str = "SEND";
pub const METHOD_REPORT: &str = "REPORT";

/// Last character of the end-line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationFlag {
    /// `$` final chunk of the message
    Complete,
    /// `+` more chunks follow
    More,
    /// `#` sender aborted the message
    Aborted,
}

impl ContinuationFlag {
    pub fn as_char(&self) -> char {
        match self {
            ContinuationFlag::Complete => '$',
            ContinuationFlag::More => '+',
            ContinuationFlag::Aborted => '#',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'$' => Some(ContinuationFlag::Complete),
            b'+' => Some(ContinuationFlag::More),
            b'#' => Some(ContinuationFlag::Aborted),
            _ => None,
        }
    }
}

/// `Byte-Range: start-end/total`, `*` meaning unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
    pub total: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: u64, total: u64) -> Self {
        Self {
            start,
            end: Some(end),
            total: Some(total),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.start)?;
        match self.end {
            Some(end) => write!(f, "{}", end)?,
            None => f.write_str("*")?,
        }
        match self.total {
            Some(total) => write!(f, "/{}", total),
            None => f.write_str("/*"),
        }
    }
}

impl FromStr for ByteRange {
    type Err = MsrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MsrpError::protocol(format!("invalid Byte-Range: {}", s));
        let (range, total) = s.trim().split_once('/').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let parse_optional = |value: &str| -> Result<Option<u64>, MsrpError> {
            if value == "*" {
                Ok(None)
            } else {
                value.parse().map(Some).map_err(|_| invalid())
            }
        };
        Ok(ByteRange {
            start: start.parse().map_err(|_| invalid())?,
            end: parse_optional(end)?,
            total: parse_optional(total)?,
        })
    }
}

/// First line of a chunk after the transaction id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: String },
    Response { status: u16, comment: Option<String> },
}

/// What a chunk carries, used when reporting transfer outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    TextMessage,
    IsComposing,
    DeliveryReport,
    Geolocation,
    HttpFileSharing,
    FileSharing,
    EmptyChunk,
    Unknown,
}

impl ChunkType {
    /// Classify a SEND payload by its content type
    pub fn from_content_type(content_type: Option<&str>, body_len: usize) -> Self {
        let content_type = match content_type {
            Some(ct) => ct.trim().to_ascii_lowercase(),
            None if body_len == 0 => return ChunkType::EmptyChunk,
            None => return ChunkType::Unknown,
        };
        if content_type.starts_with("message/imdn+xml") {
            ChunkType::DeliveryReport
        } else if content_type.starts_with("application/im-iscomposing+xml") {
            ChunkType::IsComposing
        } else if content_type.starts_with("application/vnd.gsma.rcspushlocation+xml") {
            ChunkType::Geolocation
        } else if content_type.starts_with("application/vnd.gsma.rcs-ft-http+xml") {
            ChunkType::HttpFileSharing
        } else if content_type.starts_with("text/plain") || content_type.starts_with("message/cpim") {
            ChunkType::TextMessage
        } else if body_len > 0 {
            ChunkType::FileSharing
        } else {
            ChunkType::Unknown
        }
    }
}

/// One MSRP request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrpChunk {
    pub transaction_id: String,
    pub start_line: StartLine,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub flag: ContinuationFlag,
}

impl MsrpChunk {
    /// A SEND request carrying one chunk of a message
    pub fn send(
        transaction_id: impl Into<String>,
        to_path: &str,
        from_path: &str,
        message_id: &str,
        byte_range: ByteRange,
        content_type: Option<&str>,
        body: Bytes,
        flag: ContinuationFlag,
    ) -> Self {
        let mut headers = vec![
            (HEADER_TO_PATH.to_string(), to_path.to_string()),
            (HEADER_FROM_PATH.to_string(), from_path.to_string()),
            (HEADER_MESSAGE_ID.to_string(), message_id.to_string()),
            (HEADER_BYTE_RANGE.to_string(), byte_range.to_string()),
        ];
        if let Some(content_type) = content_type {
            headers.push((HEADER_CONTENT_TYPE.to_string(), content_type.to_string()));
        }
        Self {
            transaction_id: transaction_id.into(),
            start_line: StartLine::Request {
                method: METHOD_SEND.to_string(),
            },
            headers,
            body,
            flag,
        }
    }

    /// A transaction response to `request`
    ///
    /// The paths are swapped: the response goes back to the sender.
    pub fn response_to(request: &MsrpChunk, status: u16, comment: &str) -> Self {
        let mut headers = Vec::with_capacity(2);
        if let Some(from_path) = request.from_path() {
            headers.push((HEADER_TO_PATH.to_string(), first_path(from_path).to_string()));
        }
        if let Some(to_path) = request.to_path() {
            headers.push((HEADER_FROM_PATH.to_string(), first_path(to_path).to_string()));
        }
        Self {
            transaction_id: request.transaction_id.clone(),
            start_line: StartLine::Response {
                status,
                comment: Some(comment.to_string()),
            },
            headers,
            body: Bytes::new(),
            flag: ContinuationFlag::Complete,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { method } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn to_path(&self) -> Option<&str> {
        self.header(HEADER_TO_PATH)
    }

    pub fn from_path(&self) -> Option<&str> {
        self.header(HEADER_FROM_PATH)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header(HEADER_MESSAGE_ID)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
    }

    pub fn byte_range(&self) -> Option<ByteRange> {
        self.header(HEADER_BYTE_RANGE).and_then(|value| value.parse().ok())
    }

    /// Whether the sender wants a response to this request
    ///
    /// `Failure-Report: no` suppresses transaction responses.
    pub fn wants_response(&self) -> bool {
        !self
            .header(HEADER_FAILURE_REPORT)
            .map_or(false, |value| value.trim().eq_ignore_ascii_case("no"))
    }

    /// Status code carried in the `Status` header of a REPORT
    pub fn report_status(&self) -> Option<u16> {
        self.header(HEADER_STATUS)
            .and_then(|value| value.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
    }
}

fn first_path(paths: &str) -> &str {
    paths.split_whitespace().next().unwrap_or(paths)
}
