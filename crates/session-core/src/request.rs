//! Incoming invitation as seen by the session layer

use rcs_message_core::{mime, Multipart};

/// Response status codes used by the session layer
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const UNSUPPORTED_MEDIA_TYPE: u16 = 415;
    pub const TEMPORARILY_UNAVAILABLE: u16 = 480;
    pub const BUSY_HERE: u16 = 486;
    pub const REQUEST_TERMINATED: u16 = 487;
    pub const SERVER_INTERNAL_ERROR: u16 = 500;
    pub const BUSY_EVERYWHERE: u16 = 600;
    pub const DECLINE: u16 = 603;

    /// The callee refused the session itself
    pub fn is_decline(status: u16) -> bool {
        matches!(status, BUSY_HERE | BUSY_EVERYWHERE | DECLINE)
    }
}

/// The parts of an INVITE the session layer reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteRequest {
    pub call_id: String,
    pub from: String,
    /// Full Content-Type header value, parameters included
    pub content_type: Option<String>,
    pub body: Option<String>,
    pub subject: Option<String>,
    /// Contact header value with its parameters
    pub contact: Option<String>,
    pub referred_by: Option<String>,
    pub asserted_identity: Option<String>,
    pub contribution_id: Option<String>,
    pub accept_contact: Vec<String>,
}

impl InviteRequest {
    pub fn new(call_id: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            from: from.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = Some(body.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_referred_by(mut self, referred_by: impl Into<String>) -> Self {
        self.referred_by = Some(referred_by.into());
        self
    }

    pub fn with_asserted_identity(mut self, identity: impl Into<String>) -> Self {
        self.asserted_identity = Some(identity.into());
        self
    }

    pub fn with_contribution_id(mut self, contribution_id: impl Into<String>) -> Self {
        self.contribution_id = Some(contribution_id.into());
        self
    }

    pub fn with_accept_contact(mut self, tag: impl Into<String>) -> Self {
        self.accept_contact.push(tag.into());
        self
    }

    /// Media type of the body without parameters
    pub fn media_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .map(|value| value.split(';').next().unwrap_or(value).trim())
    }

    /// `boundary` parameter of a multipart Content-Type
    pub fn boundary(&self) -> Option<&str> {
        let content_type = self.content_type.as_deref()?;
        content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("boundary") {
                Some(value.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }

    /// The body split into its parts; empty when the body is not multipart
    pub fn multipart(&self) -> Multipart {
        Multipart::new(self.body.as_deref(), self.boundary())
    }

    /// SDP offer carried directly or as a multipart part
    pub fn sdp_offer(&self) -> Option<String> {
        let media_type = self.media_type()?;
        if media_type.eq_ignore_ascii_case(mime::SDP) {
            return self.body.clone();
        }
        self.multipart().part(mime::SDP).map(str::to_string)
    }

    /// Parameters of the Contact header, after the URI
    pub fn contact_params(&self) -> Vec<(String, Option<String>)> {
        let Some(contact) = self.contact.as_deref() else {
            return Vec::new();
        };
        let params = match contact.rfind('>') {
            Some(end) => &contact[end + 1..],
            None => contact.split_once(';').map_or("", |(_, p)| p),
        };
        params
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), Some(value.trim().to_string())),
                None => (p.to_string(), None),
            })
            .collect()
    }

    pub fn has_contact_param(&self, name: &str) -> bool {
        self.contact_params().iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Feature tags from the Contact parameters and Accept-Contact
    pub fn feature_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .contact_params()
            .into_iter()
            .filter(|(name, _)| name.starts_with('+') || name.eq_ignore_ascii_case("video"))
            .map(|(name, value)| match value {
                Some(value) => format!("{}={}", name, value),
                None => name,
            })
            .collect();
        tags.extend(self.accept_contact.iter().cloned());
        tags
    }
}
