//! File-transfer resume info
//!
//! When an HTTP file transfer is interrupted the content server answers a
//! resume query with the byte range it already holds:
//!
//! ```xml
//! <file-resume-info>
//!   <file-range start="0" end="1023"/>
//!   <data url="https://ftcontentserver.rcs/download?id=001"/>
//! </file-resume-info>
//! ```

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{CodecError, Result};
use crate::xml::{attribute, OpenElements};

/// Action token of the trigger that resumes an interrupted transfer
pub const ACTION_FT_RESUME: &str = "FT_RESUME";

/// Resume point of an interrupted file transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeInfo {
    /// First byte already uploaded
    pub range_start: u64,
    /// Last byte already uploaded
    pub range_end: u64,
    /// Where the partial content lives on the content server
    pub file_uri: String,
    /// Transfer this info belongs to, once correlated
    pub transfer_id: Option<String>,
}

impl ResumeInfo {
    /// Number of bytes the server already holds
    pub fn transferred(&self) -> u64 {
        self.range_end.saturating_sub(self.range_start).saturating_add(1)
    }

    pub fn with_transfer_id(mut self, transfer_id: impl Into<String>) -> Self {
        self.transfer_id = Some(transfer_id.into());
        self
    }
}

/// Parse a resume-info document
///
/// Broken XML is a malformed envelope; well-formed XML without a usable
/// `file-range` or `data` element is a malformed document.
pub fn parse_resume_info(data: &[u8]) -> Result<ResumeInfo> {
    let text = std::str::from_utf8(data)
        .map_err(|e| CodecError::malformed_envelope(format!("resume info is not UTF-8: {}", e)))?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut range = None;
    let mut url = None;
    let mut open = OpenElements::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| CodecError::malformed_envelope(format!("invalid resume info XML: {}", e)))?;
        open.track(&event);
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"file-range" => {
                    let start = attribute(e, b"start").and_then(|v| v.trim().parse::<u64>().ok());
                    let end = attribute(e, b"end").and_then(|v| v.trim().parse::<u64>().ok());
                    if let (Some(start), Some(end)) = (start, end) {
                        range = Some((start, end));
                    }
                }
                b"data" => url = attribute(e, b"url").filter(|v| !v.is_empty()),
                _ => {}
            },
            Event::Eof if !open.is_empty() => {
                return Err(CodecError::malformed_envelope(format!(
                    "resume info XML ends with {} unclosed elements",
                    open.count()
                )));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let (range_start, range_end) =
        range.ok_or_else(|| CodecError::malformed_document("resume info without file-range"))?;
    let file_uri = url.ok_or_else(|| CodecError::malformed_document("resume info without data url"))?;
    Ok(ResumeInfo {
        range_start,
        range_end,
        file_uri,
        transfer_id: None,
    })
}
