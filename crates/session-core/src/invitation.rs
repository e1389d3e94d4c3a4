//! Reading chat invitations
//!
//! An INVITE for a chat session may carry the first message of the
//! conversation, either as a CPIM part of a multipart body or in the
//! Subject header, and for group chats a resource list of participants.

use std::collections::HashMap;

use tracing::{debug, warn};

use rcs_message_core::{
    cpim, geoloc, mime, parse_cpim_envelope, parse_resource_list, ChatMessage, ContactId, CpimMessage,
    MessageKind, ParticipantStatus,
};

use crate::errors::{Result, SessionError};
use crate::request::InviteRequest;

/// Contribution-ID header of the invitation
pub fn contribution_id(request: &InviteRequest) -> Option<&str> {
    request.contribution_id.as_deref()
}

/// A group invitation comes from a conference focus
pub fn is_group_invitation(request: &InviteRequest) -> bool {
    request.has_contact_param("isfocus")
}

/// Identity of the inviting party: Referred-By, else P-Asserted-Identity
pub fn referred_identity_as_uri(request: &InviteRequest) -> Option<&str> {
    request
        .referred_by
        .as_deref()
        .or(request.asserted_identity.as_deref())
}

/// Inviting party as a contact
///
/// Falls back to P-Asserted-Identity when Referred-By is absent or is not
/// a phone number.
pub fn referred_identity_as_contact(request: &InviteRequest) -> Option<ContactId> {
    request
        .referred_by
        .as_deref()
        .and_then(ContactId::from_uri)
        .or_else(|| request.asserted_identity.as_deref().and_then(ContactId::from_uri))
}

/// Whether the invitation has a body or a subject to turn into a message
pub fn is_containing_first_message(request: &InviteRequest) -> bool {
    request.body.is_some() || request.subject.as_deref().map_or(false, |s| !s.is_empty())
}

/// The CPIM part of a multipart body
pub fn extract_cpim_message(request: &InviteRequest) -> Result<Option<CpimMessage>> {
    let multipart = request.multipart();
    if !multipart.is_multipart() {
        return Ok(None);
    }
    match multipart.part(mime::CPIM) {
        Some(part) => Ok(Some(parse_cpim_envelope(part.as_bytes())?)),
        None => Ok(None),
    }
}

/// Whether the first message is a file-transfer-over-HTTP descriptor
pub fn is_file_transfer_over_http(request: &InviteRequest) -> bool {
    match extract_cpim_message(request) {
        Ok(Some(message)) => message.content_type().map_or(false, mime::is_file_transfer_http),
        _ => false,
    }
}

/// An IMDN-capable CPIM body
pub fn is_imdn_service(request: &InviteRequest) -> bool {
    let is_cpim = request.media_type().map_or(false, |t| t.eq_ignore_ascii_case(mime::CPIM));
    is_cpim
        && request
            .body
            .as_deref()
            .map_or(false, |body| body.contains(cpim::IMDN_NAMESPACE))
}

fn header_in_body<'a>(request: &'a InviteRequest, name: &str) -> Option<&'a str> {
    let body = request.body.as_deref()?;
    let start = body.find(name)? + name.len();
    let rest = body[start..].strip_prefix(':')?;
    let end = rest.find(['\r', '\n']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Whether the sender asked for a display notification
pub fn is_imdn_displayed_requested(request: &InviteRequest) -> bool {
    header_in_body(request, cpim::HEADER_IMDN_DISPO_NOTIF).map_or(false, |value| {
        value.split(',').any(|n| n.trim().eq_ignore_ascii_case(cpim::DISPLAY))
    })
}

/// `imdn.Message-ID` of the message carried in the body
pub fn message_id(request: &InviteRequest) -> Option<&str> {
    header_in_body(request, cpim::HEADER_IMDN_MSG_ID).filter(|id| !id.is_empty())
}

/// Extract the first message of a chat invitation
///
/// The CPIM part is tried first; when it gives nothing the Subject header
/// becomes a text message stamped with `timestamp` on both clocks.
pub fn extract_first_message(request: &InviteRequest, timestamp: i64) -> Result<Option<ChatMessage>> {
    if let Some(message) = first_message_from_cpim(request, timestamp)? {
        return Ok(Some(message));
    }
    first_message_from_subject(request, timestamp)
}

fn first_message_from_cpim(request: &InviteRequest, timestamp: i64) -> Result<Option<ChatMessage>> {
    let cpim_message = match extract_cpim_message(request) {
        Ok(Some(message)) => message,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!("Ignoring unreadable CPIM part of invitation {}: {}", request.call_id, e);
            return Ok(None);
        }
    };
    let Some(remote) = referred_identity_as_contact(request) else {
        warn!("Cannot resolve the sender of the first message, ignoring CPIM content");
        return Ok(None);
    };
    let (Some(message_id), Some(_)) = (cpim_message.message_id(), cpim_message.content_type()) else {
        debug!("CPIM first message without message id or content type");
        return Ok(None);
    };
    chat_message_from_cpim(&cpim_message, message_id, remote, timestamp)
}

/// Turn the content of a CPIM envelope into a chat message
///
/// Content types without a message kind give `None`; geolocation content
/// is stored in its persisted form.
pub(crate) fn chat_message_from_cpim(
    cpim_message: &CpimMessage,
    message_id: &str,
    remote: ContactId,
    timestamp: i64,
) -> Result<Option<ChatMessage>> {
    let content_type = cpim_message.content_type().unwrap_or(mime::TEXT_PLAIN);
    let Some(kind) = MessageKind::from_mime_type(content_type) else {
        warn!("Unknown MIME type in message; msgId={}, mime='{}'", message_id, content_type);
        return Ok(None);
    };
    let content = match kind {
        MessageKind::Geoloc => geoloc::network_geoloc_to_persisted(cpim_message.content())?,
        MessageKind::Text | MessageKind::FileTransferInfo => cpim_message.content().to_string(),
    };
    let timestamp_sent = cpim_message.timestamp_sent().unwrap_or(timestamp);

    Ok(Some(ChatMessage::new(
        message_id,
        remote,
        content,
        kind,
        timestamp,
        timestamp_sent,
        None,
    )))
}

fn first_message_from_subject(request: &InviteRequest, timestamp: i64) -> Result<Option<ChatMessage>> {
    let subject = match request.subject.as_deref().map(str::trim) {
        Some(subject) if !subject.is_empty() => subject,
        _ => return Ok(None),
    };
    let remote = referred_identity_as_contact(request)
        .ok_or_else(|| SessionError::missing_sender_identity("Cannot parse contact from message subject"))?;
    // the subject has no DateTime, so the local time stands in for both
    Ok(Some(ChatMessage::text(remote, subject, timestamp, timestamp)))
}

/// Participants listed in the resource-list part of a group invitation
///
/// The inviter joins the list unless it is `local_identity`. Without a
/// resource list the map is empty.
pub fn extract_participants(
    request: &InviteRequest,
    status: ParticipantStatus,
    local_identity: Option<&ContactId>,
) -> Result<HashMap<ContactId, ParticipantStatus>> {
    let multipart = request.multipart();
    let Some(list) = multipart.part(mime::RESOURCE_LISTS) else {
        return Ok(HashMap::new());
    };
    let mut participants = parse_resource_list(list, status)?;
    match referred_identity_as_contact(request) {
        Some(inviter) if Some(&inviter) != local_identity => {
            participants.insert(inviter, status);
        }
        Some(_) => {}
        None => warn!("Cannot resolve the inviter of group invitation {}", request.call_id),
    }
    Ok(participants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcs_message_core::{build_cpim_envelope, ImdnOptions};

    const BOUNDARY: &str = "boundary1";

    fn multipart_request(parts: &[(&str, &str)]) -> InviteRequest {
        let mut body = String::new();
        for (content_type, content) in parts {
            body.push_str(&format!("--{}\r\nContent-Type: {}\r\n\r\n{}\r\n", BOUNDARY, content_type, content));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        InviteRequest::new("call-1", "tel:+33600000001")
            .with_body(format!("multipart/mixed;boundary={}", BOUNDARY), body)
    }

    fn cpim_text(message_id: &str, text: &str) -> String {
        build_cpim_envelope(
            "tel:+33600000001",
            "tel:+33600000002",
            text,
            mime::TEXT_PLAIN,
            1_700_000_000_000,
            &ImdnOptions::DeliveryAndDisplay {
                message_id: message_id.to_string(),
            },
        )
    }

    #[test]
    fn test_identity_fallback() {
        let request = InviteRequest::new("c", "x")
            .with_referred_by("<sip:anonymous@example.com>")
            .with_asserted_identity("tel:+33600000003");
        assert_eq!(referred_identity_as_uri(&request), Some("<sip:anonymous@example.com>"));
        assert_eq!(referred_identity_as_contact(&request).unwrap().as_str(), "+33600000003");
    }

    #[test]
    fn test_first_message_from_cpim() {
        let request = multipart_request(&[("application/sdp", "v=0"), ("message/cpim", &cpim_text("msg-1", "Hi"))])
            .with_referred_by("tel:+33600000001");

        let message = extract_first_message(&request, 42).unwrap().unwrap();
        assert_eq!(message.message_id(), "msg-1");
        assert_eq!(message.content(), "Hi");
        assert_eq!(message.kind(), MessageKind::Text);
        assert_eq!(message.timestamp(), 42);
        assert_eq!(message.timestamp_sent(), 1_700_000_000_000);

        assert_eq!(message_id(&request), Some("msg-1"));
        assert!(is_imdn_displayed_requested(&request));
        assert!(!is_file_transfer_over_http(&request));
    }

    #[test]
    fn test_cpim_without_sender_falls_back_to_subject() {
        let request = multipart_request(&[("message/cpim", &cpim_text("msg-1", "Hi"))]).with_subject("Hello");
        // neither path can resolve the sender
        assert!(matches!(
            extract_first_message(&request, 1),
            Err(SessionError::MissingSenderIdentity { .. })
        ));

        let no_subject = multipart_request(&[("message/cpim", &cpim_text("msg-1", "Hi"))]);
        assert_eq!(extract_first_message(&no_subject, 1).unwrap(), None);
    }

    #[test]
    fn test_unreadable_cpim_falls_back_to_subject() {
        let broken = "From: <tel:+33600000001>\r\nTo: <tel:+33600000002>";
        let request = multipart_request(&[("application/sdp", "v=0"), ("message/cpim", broken)])
            .with_referred_by("tel:+33600000001")
            .with_subject("Hello");
        assert!(extract_cpim_message(&request).is_err());

        let message = extract_first_message(&request, 7).unwrap().unwrap();
        assert_eq!(message.content(), "Hello");
        assert_eq!(message.kind(), MessageKind::Text);
        assert_eq!(message.timestamp_sent(), 7);

        let without_subject = multipart_request(&[("message/cpim", broken)]).with_referred_by("tel:+33600000001");
        assert_eq!(extract_first_message(&without_subject, 7).unwrap(), None);
    }

    #[test]
    fn test_unknown_cpim_type_is_skipped() {
        let cpim = build_cpim_envelope(
            "tel:+33600000001",
            "tel:+33600000002",
            "<x/>",
            "application/x-custom",
            0,
            &ImdnOptions::DeliveryOnly {
                message_id: "m".to_string(),
            },
        );
        let request = multipart_request(&[("message/cpim", &cpim)]).with_asserted_identity("tel:+33600000001");
        assert_eq!(extract_first_message(&request, 1).unwrap(), None);
    }

    #[test]
    fn test_group_detection() {
        let request = InviteRequest::new("c", "sip:focus@example.com").with_contact("<sip:focus@example.com>;isfocus");
        assert!(is_group_invitation(&request));
        let request = InviteRequest::new("c", "tel:+33600000001").with_contact("<tel:+33600000001>");
        assert!(!is_group_invitation(&request));
    }

    #[test]
    fn test_no_resource_list_means_no_participants() {
        let request = multipart_request(&[("application/sdp", "v=0")]).with_referred_by("tel:+33600000001");
        assert!(extract_participants(&request, ParticipantStatus::Connected, None)
            .unwrap()
            .is_empty());
        assert!(!is_containing_first_message(&InviteRequest::new("c", "x")));
    }
}
