//! MIME types carried by chat and file-transfer sessions

use crate::error::{CodecError, Result};

/// Plain text message
pub const TEXT_PLAIN: &str = "text/plain";
/// Geolocation push document as sent on the network
pub const GEOLOC_NETWORK: &str = "application/vnd.gsma.rcspushlocation+xml";
/// Geolocation as exposed through the messaging API
pub const GEOLOC_API: &str = "application/geoloc";
/// File-transfer-over-HTTP info document
pub const FILE_TRANSFER_HTTP: &str = "application/vnd.gsma.rcs-ft-http+xml";
/// CPIM envelope
pub const CPIM: &str = "message/cpim";
/// IMDN delivery report
pub const IMDN: &str = "message/imdn+xml";
/// Is-composing indication
pub const IS_COMPOSING: &str = "application/im-iscomposing+xml";
/// Resource list of a group invitation
pub const RESOURCE_LISTS: &str = "application/resource-lists+xml";
/// SDP offer/answer
pub const SDP: &str = "application/sdp";
/// Multipart invitation body
pub const MULTIPART_MIXED: &str = "multipart/mixed";

fn has_prefix(mime: &str, prefix: &str) -> bool {
    let mime = mime.trim();
    mime.get(..prefix.len()).map_or(false, |start| start.eq_ignore_ascii_case(prefix))
}

/// Whether the type is plain text
pub fn is_text_plain(mime: &str) -> bool {
    has_prefix(mime, TEXT_PLAIN)
}

/// Whether the type is a geolocation document
pub fn is_geoloc(mime: &str) -> bool {
    has_prefix(mime, GEOLOC_NETWORK)
}

/// Whether the type is a CPIM envelope
pub fn is_cpim(mime: &str) -> bool {
    has_prefix(mime, CPIM)
}

/// Whether the type is an IMDN report
pub fn is_imdn(mime: &str) -> bool {
    has_prefix(mime, IMDN)
}

/// Whether the type is an is-composing indication
pub fn is_composing(mime: &str) -> bool {
    has_prefix(mime, IS_COMPOSING)
}

/// Whether the type is a file-transfer-over-HTTP info document
pub fn is_file_transfer_http(mime: &str) -> bool {
    has_prefix(mime, FILE_TRANSFER_HTTP)
}

/// Whether the type is a multipart body
pub fn is_multipart(mime: &str) -> bool {
    has_prefix(mime, "multipart/")
}

/// Map an API MIME type onto the type sent on the network
pub fn api_to_network_mime_type(api_mime: &str) -> Result<&'static str> {
    if has_prefix(api_mime, TEXT_PLAIN) {
        Ok(TEXT_PLAIN)
    } else if has_prefix(api_mime, GEOLOC_API) {
        Ok(GEOLOC_NETWORK)
    } else {
        Err(CodecError::unsupported_mime_type(api_mime))
    }
}

/// Map a network MIME type onto the type exposed through the API
pub fn network_to_api_mime_type(network_mime: &str) -> Result<&'static str> {
    if is_text_plain(network_mime) {
        Ok(TEXT_PLAIN)
    } else if is_geoloc(network_mime) {
        Ok(GEOLOC_API)
    } else if is_file_transfer_http(network_mime) {
        Ok(FILE_TRANSFER_HTTP)
    } else {
        Err(CodecError::unsupported_mime_type(network_mime))
    }
}
