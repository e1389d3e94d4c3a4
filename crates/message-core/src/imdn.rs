//! IMDN delivery reports (RFC 5438)

use std::fmt;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::cpim::parse_cpim_envelope;
use crate::datetime::{decode_date, encode_date};
use crate::error::{CodecError, Result};
use crate::mime;
use crate::xml::{DocumentWriter, OpenElements};

pub const IMDN_XMLNS: &str = "urn:ietf:params:xml:ns:imdn";

pub const DELIVERY_NOTIFICATION: &str = "delivery-notification";
pub const DISPLAY_NOTIFICATION: &str = "display-notification";
pub const PROCESSING_NOTIFICATION: &str = "processing-notification";

/// Disposition reported for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImdnStatus {
    Delivered,
    Displayed,
    Processed,
    Stored,
    Failed,
    Forbidden,
    Error,
}

impl ImdnStatus {
    pub const ALL: [ImdnStatus; 7] = [
        ImdnStatus::Delivered,
        ImdnStatus::Displayed,
        ImdnStatus::Processed,
        ImdnStatus::Stored,
        ImdnStatus::Failed,
        ImdnStatus::Forbidden,
        ImdnStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImdnStatus::Delivered => "delivered",
            ImdnStatus::Displayed => "displayed",
            ImdnStatus::Processed => "processed",
            ImdnStatus::Stored => "stored",
            ImdnStatus::Failed => "failed",
            ImdnStatus::Forbidden => "forbidden",
            ImdnStatus::Error => "error",
        }
    }

    /// Notification element wrapping this status
    pub fn notification_method(&self) -> &'static str {
        match self {
            ImdnStatus::Delivered => DELIVERY_NOTIFICATION,
            ImdnStatus::Displayed => DISPLAY_NOTIFICATION,
            _ => PROCESSING_NOTIFICATION,
        }
    }
}

impl fmt::Display for ImdnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImdnStatus {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        ImdnStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CodecError::malformed_document(format!("unknown IMDN status: {}", s)))
    }
}

/// A parsed delivery report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImdnReport {
    pub message_id: String,
    pub status: ImdnStatus,
    /// Milliseconds since the epoch, second granularity on the wire
    pub timestamp: i64,
}

/// Build an IMDN document
pub fn build_imdn_report(message_id: &str, status: ImdnStatus, timestamp: i64) -> Result<String> {
    let mut doc = DocumentWriter::new()?;
    let mut root = BytesStart::new("imdn");
    root.push_attribute(("xmlns", IMDN_XMLNS));
    doc.start(root)?;
    doc.text_element("message-id", message_id)?;
    doc.text_element("datetime", &encode_date(timestamp))?;

    let method = status.notification_method();
    doc.start(BytesStart::new(method))?;
    doc.start(BytesStart::new("status"))?;
    doc.empty(BytesStart::new(status.as_str()))?;
    doc.end("status")?;
    doc.end(method)?;

    doc.end("imdn")?;
    doc.finish()
}

#[derive(PartialEq)]
enum Field {
    None,
    MessageId,
    DateTime,
}

/// Parse an IMDN document
pub fn parse_imdn_report(xml: &str) -> Result<ImdnReport> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut field = Field::None;
    let mut in_status = false;
    let mut message_id = None;
    let mut timestamp = None;
    let mut status = None;
    let mut open = OpenElements::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| CodecError::malformed_document(format!("invalid IMDN document: {}", e)))?;
        open.track(&event);
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"message-id" => field = Field::MessageId,
                    b"datetime" => field = Field::DateTime,
                    b"status" => in_status = is_start,
                    name if in_status && status.is_none() => {
                        let name = String::from_utf8_lossy(name);
                        status = Some(name.parse::<ImdnStatus>()?);
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| CodecError::malformed_document(err.to_string()))?
                    .trim()
                    .to_string();
                match field {
                    Field::MessageId => message_id = Some(text),
                    Field::DateTime => timestamp = decode_date(&text),
                    Field::None => {}
                }
                field = Field::None;
            }
            Event::End(ref e) => {
                if e.local_name().as_ref() == b"status" {
                    in_status = false;
                }
                field = Field::None;
            }
            Event::Eof if !open.is_empty() => {
                return Err(CodecError::malformed_document(format!(
                    "IMDN document ends with {} unclosed elements",
                    open.count()
                )));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ImdnReport {
        message_id: message_id.ok_or_else(|| CodecError::malformed_document("IMDN without message-id"))?,
        status: status.ok_or_else(|| CodecError::malformed_document("IMDN without status"))?,
        timestamp: timestamp.ok_or_else(|| CodecError::malformed_document("IMDN without valid datetime"))?,
    })
}

/// Extract the delivery report from a CPIM-wrapped notification
///
/// Returns `None` when the CPIM content is not an IMDN document.
pub fn parse_cpim_delivery_report(cpim: &[u8]) -> Result<Option<ImdnReport>> {
    let message = parse_cpim_envelope(cpim)?;
    match message.content_type() {
        Some(content_type) if mime::is_imdn(content_type) => parse_imdn_report(message.content()).map(Some),
        _ => Ok(None),
    }
}
