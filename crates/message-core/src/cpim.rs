//! CPIM envelope (RFC 3862) with IMDN headers (RFC 5438)
//!
//! A CPIM message is two header blocks and a body, each separated by an
//! empty line:
//!
//! ```text
//! From: <tel:+33612345678>
//! To: <tel:+33698765432>
//! NS: imdn <urn:ietf:params:imdn>
//! imdn.Message-ID: 5c8a...
//! DateTime: 2023-11-14T22:13:20Z
//! imdn.Disposition-Notification: positive-delivery, display
//!
//! Content-Type: text/plain;charset=UTF-8
//! Content-Length: 5
//!
//! Hello
//! ```

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, not_line_ending, space0},
    IResult,
};
use tracing::trace;

use crate::contact::ContactId;
use crate::datetime::{decode_date, encode_date};
use crate::error::{CodecError, Result};
use crate::message::generate_message_id;
use crate::mime;

const CRLF: &str = "\r\n";

pub const HEADER_FROM: &str = "From";
pub const HEADER_TO: &str = "To";
pub const HEADER_NS: &str = "NS";
pub const HEADER_DATETIME: &str = "DateTime";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const HEADER_IMDN_MSG_ID: &str = "imdn.Message-ID";
pub const HEADER_IMDN_DISPO_NOTIF: &str = "imdn.Disposition-Notification";

/// IMDN namespace declaration
pub const IMDN_NAMESPACE: &str = "imdn <urn:ietf:params:imdn>";

pub const POSITIVE_DELIVERY: &str = "positive-delivery";
pub const DISPLAY: &str = "display";
pub const NOTIFICATION: &str = "notification";

/// Which IMDN notifications the sender asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImdnOptions {
    /// Plain envelope, no IMDN headers
    None,
    /// Request a delivery notification
    DeliveryOnly { message_id: String },
    /// Request delivery and display notifications
    DeliveryAndDisplay { message_id: String },
}

impl ImdnOptions {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ImdnOptions::None => None,
            ImdnOptions::DeliveryOnly { message_id } | ImdnOptions::DeliveryAndDisplay { message_id } => {
                Some(message_id)
            }
        }
    }

    fn disposition(&self) -> Option<String> {
        match self {
            ImdnOptions::None => None,
            ImdnOptions::DeliveryOnly { .. } => Some(POSITIVE_DELIVERY.to_string()),
            ImdnOptions::DeliveryAndDisplay { .. } => Some(format!("{}, {}", POSITIVE_DELIVERY, DISPLAY)),
        }
    }
}

/// Format an identifier for a CPIM `From`/`To` header
///
/// Values already in name-addr form are kept, bare SIP/tel URIs are
/// enclosed in angle brackets and phone numbers are normalised to a
/// `tel:` URI first.
pub fn format_cpim_uri(input: &str) -> String {
    let input = input.trim();
    if input.starts_with('<') || input.starts_with('"') {
        return input.to_string();
    }
    let lower = input.to_ascii_lowercase();
    if lower.starts_with("sip:") || lower.starts_with("tel:") {
        return format!("<{}>", input);
    }
    match ContactId::from_number(input) {
        Some(contact) => format!("<{}>", contact.to_uri()),
        None => format!("<{}>", input),
    }
}

/// Build a CPIM envelope around `content`
pub fn build_cpim_envelope(
    from: &str,
    to: &str,
    content: &str,
    content_type: &str,
    timestamp_sent: i64,
    imdn: &ImdnOptions,
) -> String {
    let mut cpim = String::with_capacity(content.len() + 256);
    push_header(&mut cpim, HEADER_FROM, &format_cpim_uri(from));
    push_header(&mut cpim, HEADER_TO, &format_cpim_uri(to));
    if let Some(message_id) = imdn.message_id() {
        push_header(&mut cpim, HEADER_NS, IMDN_NAMESPACE);
        push_header(&mut cpim, HEADER_IMDN_MSG_ID, message_id);
    }
    push_header(&mut cpim, HEADER_DATETIME, &encode_date(timestamp_sent));
    if let Some(disposition) = imdn.disposition() {
        push_header(&mut cpim, HEADER_IMDN_DISPO_NOTIF, &disposition);
    }
    cpim.push_str(CRLF);
    push_header(&mut cpim, HEADER_CONTENT_TYPE, &format!("{};charset=UTF-8", content_type));
    if imdn.message_id().is_some() {
        push_header(&mut cpim, HEADER_CONTENT_LENGTH, &content.len().to_string());
    }
    cpim.push_str(CRLF);
    cpim.push_str(content);
    cpim
}

/// Build the CPIM wrapper of an IMDN delivery report
pub fn build_cpim_delivery_report(from: &str, to: &str, imdn_xml: &str, timestamp_sent: i64) -> String {
    let mut cpim = String::with_capacity(imdn_xml.len() + 256);
    push_header(&mut cpim, HEADER_FROM, &format_cpim_uri(from));
    push_header(&mut cpim, HEADER_TO, &format_cpim_uri(to));
    push_header(&mut cpim, HEADER_NS, IMDN_NAMESPACE);
    push_header(&mut cpim, HEADER_IMDN_MSG_ID, &generate_message_id());
    push_header(&mut cpim, HEADER_DATETIME, &encode_date(timestamp_sent));
    cpim.push_str(CRLF);
    push_header(&mut cpim, HEADER_CONTENT_TYPE, mime::IMDN);
    push_header(&mut cpim, HEADER_CONTENT_DISPOSITION, NOTIFICATION);
    push_header(&mut cpim, HEADER_CONTENT_LENGTH, &imdn_xml.len().to_string());
    cpim.push_str(CRLF);
    cpim.push_str(imdn_xml);
    cpim
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

/// A parsed CPIM message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpimMessage {
    headers: Vec<(String, String)>,
    content_headers: Vec<(String, String)>,
    content: String,
}

impl CpimMessage {
    /// Value of a message header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Value of a content header, matched case-insensitively
    pub fn content_header(&self, name: &str) -> Option<&str> {
        find_header(&self.content_headers, name)
    }

    pub fn from(&self) -> Option<&str> {
        self.header(HEADER_FROM)
    }

    pub fn to(&self) -> Option<&str> {
        self.header(HEADER_TO)
    }

    pub fn datetime(&self) -> Option<&str> {
        self.header(HEADER_DATETIME)
    }

    /// Sender-asserted timestamp in milliseconds, if present and valid
    pub fn timestamp_sent(&self) -> Option<i64> {
        self.datetime().and_then(decode_date)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header(HEADER_IMDN_MSG_ID)
    }

    /// Content type without its parameters
    pub fn content_type(&self) -> Option<&str> {
        self.content_header(HEADER_CONTENT_TYPE)
            .map(|value| value.split(';').next().unwrap_or(value).trim())
    }

    /// Requested disposition notifications, lower-cased
    pub fn disposition_notifications(&self) -> Vec<String> {
        self.header(HEADER_IMDN_DISPO_NOTIF)
            .map(|value| {
                value
                    .split(',')
                    .map(|token| token.trim().to_ascii_lowercase())
                    .filter(|token| !token.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_delivery_requested(&self) -> bool {
        self.disposition_notifications().iter().any(|d| d == POSITIVE_DELIVERY)
    }

    pub fn is_display_requested(&self) -> bool {
        self.disposition_notifications().iter().any(|d| d == DISPLAY)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(header, _)| header.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Parse a CPIM envelope
pub fn parse_cpim_envelope(data: &[u8]) -> Result<CpimMessage> {
    let text = std::str::from_utf8(data)
        .map_err(|e| CodecError::malformed_envelope(format!("CPIM is not UTF-8: {}", e)))?;

    let (message_block, rest) = split_block(text)
        .ok_or_else(|| CodecError::malformed_envelope("missing end of CPIM message headers"))?;
    let (content_block, body) = split_block(rest)
        .ok_or_else(|| CodecError::malformed_envelope("missing end of CPIM content headers"))?;

    let headers = parse_header_block(message_block);
    let content_headers = parse_header_block(content_block);

    let content = match find_header(&content_headers, HEADER_CONTENT_LENGTH)
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        Some(length) if length <= body.len() && body.is_char_boundary(length) => &body[..length],
        _ => body,
    };

    Ok(CpimMessage {
        headers,
        content_headers,
        content: content.to_string(),
    })
}

/// Split off everything up to the first empty line
fn split_block(text: &str) -> Option<(&str, &str)> {
    let crlf = text.find("\r\n\r\n").map(|idx| (idx, 4));
    let lf = text.find("\n\n").map(|idx| (idx, 2));
    let (idx, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&text[..idx], &text[idx + len..]))
}

fn is_header_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')
}

/// Parse a `Name: value` header line
pub(crate) fn parse_header_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, name) = take_while1(is_header_name_char)(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = not_line_ending(input)?;
    let input = input.trim_start_matches(['\r', '\n']);
    Ok((input, (name, value.trim())))
}

fn parse_header_block(block: &str) -> Vec<(String, String)> {
    block
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_header_line(line) {
            Ok((_, (name, value))) => Some((name.to_string(), value.to_string())),
            Err(_) => {
                trace!("Ignoring CPIM header line {:?}", line);
                None
            }
        })
        .collect()
}
