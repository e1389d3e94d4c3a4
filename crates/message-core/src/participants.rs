//! Group conversation participants and the resource-list document (RFC 4826)

use std::collections::HashMap;
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contact::ContactId;
use crate::error::{CodecError, Result};
use crate::xml::{attribute, DocumentWriter, OpenElements};

pub const RESOURCE_LISTS_XMLNS: &str = "urn:ietf:params:xml:ns:resource-lists";
pub const COPY_CONTROL_XMLNS: &str = "urn:ietf:params:xml:ns:copycontrol";

/// Status of a participant in a group conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Inviting,
    Invited,
    Connected,
    Disconnected,
    Departed,
    Failed,
    Declined,
    Timeout,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticipantStatus::Inviting => "inviting",
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Connected => "connected",
            ParticipantStatus::Disconnected => "disconnected",
            ParticipantStatus::Departed => "departed",
            ParticipantStatus::Failed => "failed",
            ParticipantStatus::Declined => "declined",
            ParticipantStatus::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Build a resource list with one `to` entry per participant
pub fn build_resource_list<'a, I>(participants: I) -> Result<String>
where
    I: IntoIterator<Item = &'a ContactId>,
{
    let mut doc = DocumentWriter::new()?;
    let mut root = BytesStart::new("resource-lists");
    root.push_attribute(("xmlns", RESOURCE_LISTS_XMLNS));
    root.push_attribute(("xmlns:cp", COPY_CONTROL_XMLNS));
    doc.start(root)?;
    doc.start(BytesStart::new("list"))?;
    for contact in participants {
        let uri = contact.to_uri();
        let mut entry = BytesStart::new("entry");
        entry.push_attribute(("uri", uri.as_str()));
        entry.push_attribute(("cp:copyControl", "to"));
        doc.empty(entry)?;
    }
    doc.end("list")?;
    doc.end("resource-lists")?;
    doc.finish()
}

/// Parse a resource list, giving every entry `status`
///
/// Entries whose URI does not resolve to a contact are skipped.
pub fn parse_resource_list(xml: &str, status: ParticipantStatus) -> Result<HashMap<ContactId, ParticipantStatus>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut participants = HashMap::new();
    let mut open = OpenElements::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| CodecError::malformed_document(format!("invalid resource list: {}", e)))?;
        open.track(&event);
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"entry" => {
                match attribute(e, b"uri") {
                    Some(uri) => match ContactId::from_uri(&uri) {
                        Some(contact) => {
                            participants.insert(contact, status);
                        }
                        None => debug!("Skipping resource list entry {} (not a contact)", uri),
                    },
                    None => debug!("Skipping resource list entry without uri"),
                }
            }
            Event::Eof if !open.is_empty() => {
                return Err(CodecError::malformed_document(format!(
                    "resource list ends with {} unclosed elements",
                    open.count()
                )));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(participants)
}

/// Give every contact the same status
pub fn participants_from_contacts<I>(contacts: I, status: ParticipantStatus) -> HashMap<ContactId, ParticipantStatus>
where
    I: IntoIterator<Item = ContactId>,
{
    contacts.into_iter().map(|contact| (contact, status)).collect()
}
