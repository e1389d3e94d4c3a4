//! Feature tags advertised in Contact and Accept-Contact headers

use serde::{Deserialize, Serialize};

/// OMA SIMPLE IM
pub const FEATURE_OMA_IM: &str = "+g.oma.sip-im";
/// Carrier of the RCS application references
pub const FEATURE_RCSE: &str = "+g.3gpp.iari-ref";
pub const FEATURE_RCSE_GEOLOCATION_PUSH: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.geopush";
pub const FEATURE_RCSE_FT: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ft";
pub const FEATURE_RCSE_FT_HTTP: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.fthttp";
pub const FEATURE_RCSE_FT_SF: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.ftsf";
pub const FEATURE_3GPP_IP_VOICE_CALL: &str = "urn%3Aurn-7%3A3gpp-service.ims.icsi.mmtel";
pub const FEATURE_RCSE_IP_VOICE_CALL: &str = "+g.gsma.rcs.ipcall";
pub const FEATURE_RCSE_IP_VIDEO_CALL: &str = "video";

/// Capabilities this client supports for chat sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub geolocation_push: bool,
    pub file_transfer: bool,
    pub file_transfer_http: bool,
    pub file_transfer_store_forward: bool,
}

impl CapabilityConfig {
    /// Everything enabled
    pub fn all() -> Self {
        Self {
            geolocation_push: true,
            file_transfer: true,
            file_transfer_http: true,
            file_transfer_store_forward: true,
        }
    }

    /// Enabled application references in declaration order
    fn enabled_references(&self) -> Vec<&'static str> {
        [
            (self.geolocation_push, FEATURE_RCSE_GEOLOCATION_PUSH),
            (self.file_transfer, FEATURE_RCSE_FT),
            (self.file_transfer_http, FEATURE_RCSE_FT_HTTP),
            (self.file_transfer_store_forward, FEATURE_RCSE_FT_SF),
        ]
        .into_iter()
        .filter_map(|(enabled, tag)| enabled.then_some(tag))
        .collect()
    }
}

fn rcse_tag(references: &[&str]) -> String {
    format!("{}=\"{}\"", FEATURE_RCSE, references.join(","))
}

/// Feature tags for one-to-one and group chat sessions
///
/// The OMA IM tag always comes first, followed by one aggregated
/// application reference tag when any capability is enabled.
pub fn supported_feature_tags(config: &CapabilityConfig) -> Vec<String> {
    let mut tags = vec![FEATURE_OMA_IM.to_string()];
    let references = config.enabled_references();
    if !references.is_empty() {
        tags.push(rcse_tag(&references));
    }
    tags
}

/// Feature tags for group chat sessions
pub fn supported_group_feature_tags(config: &CapabilityConfig) -> Vec<String> {
    supported_feature_tags(config)
}

/// Accept-Contact tags for chat sessions
pub fn accept_contact_tags() -> Vec<String> {
    vec![FEATURE_OMA_IM.to_string()]
}

/// Feature tags for IP voice or video calls
pub fn ip_call_feature_tags(video: bool) -> Vec<String> {
    let mut tags = vec![rcse_tag(&[FEATURE_3GPP_IP_VOICE_CALL]), FEATURE_RCSE_IP_VOICE_CALL.to_string()];
    if video {
        tags.push(FEATURE_RCSE_IP_VIDEO_CALL.to_string());
    }
    tags
}

/// Whether `tags` contain every tag in `required`
pub fn contains_all_tags(tags: &[String], required: &[String]) -> bool {
    required.iter().all(|tag| tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_capabilities() {
        assert_eq!(supported_feature_tags(&CapabilityConfig::default()), vec![FEATURE_OMA_IM.to_string()]);
    }

    #[test]
    fn test_partial_capabilities_keep_order() {
        let config = CapabilityConfig {
            geolocation_push: false,
            file_transfer: true,
            file_transfer_http: false,
            file_transfer_store_forward: true,
        };
        let tags = supported_feature_tags(&config);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1], format!("+g.3gpp.iari-ref=\"{},{}\"", FEATURE_RCSE_FT, FEATURE_RCSE_FT_SF));
    }

    #[test]
    fn test_ip_call_tags() {
        let voice = ip_call_feature_tags(false);
        assert_eq!(
            voice,
            vec![
                "+g.3gpp.iari-ref=\"urn%3Aurn-7%3A3gpp-service.ims.icsi.mmtel\"".to_string(),
                "+g.gsma.rcs.ipcall".to_string(),
            ]
        );
        let video = ip_call_feature_tags(true);
        assert_eq!(video.last().map(String::as_str), Some("video"));
        assert!(contains_all_tags(&video, &voice));
        assert!(!contains_all_tags(&voice, &video));
    }
}
