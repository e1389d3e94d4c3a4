//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rcs_message_core::{CapabilityConfig, ContactId};
use rcs_msrp_core::session::DEFAULT_MAX_CHUNK_SIZE;

use crate::errors::{Result, SessionError};

/// Immutable configuration shared by the service and its sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcsConfig {
    /// Advertised capabilities
    #[serde(flatten)]
    pub capabilities: CapabilityConfig,
    /// Maximum concurrent sessions, 0 for unlimited
    pub max_sessions: usize,
    /// MSRP idle time before a session ends, 0 disables the check
    pub idle_threshold_ms: u64,
    pub activity_check_interval_ms: u64,
    pub max_chunk_size: usize,
    /// Largest received MSRP message, 0 for unlimited
    pub max_message_size: usize,
    pub local_ip_address: String,
    pub local_msrp_port: u16,
    pub msrp_tls: bool,
    /// Our own identity (`tel:` or `sip:` URI)
    pub local_identity: Option<String>,
    /// Ask for display reports on outgoing chat messages
    pub request_display_report: bool,
}

impl Default for RcsConfig {
    fn default() -> Self {
        Self {
            capabilities: CapabilityConfig::default(),
            max_sessions: 0,
            idle_threshold_ms: 0,
            activity_check_interval_ms: 1000,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_message_size: 0,
            local_ip_address: "127.0.0.1".to_string(),
            local_msrp_port: 20000,
            msrp_tls: false,
            local_identity: None,
            request_display_report: true,
        }
    }
}

impl RcsConfig {
    /// Load a configuration from TOML and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RcsConfig =
            toml::from_str(text).map_err(|e| SessionError::config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(SessionError::config("max_chunk_size must be greater than zero"));
        }
        if self.local_ip_address.trim().is_empty() {
            return Err(SessionError::config("local_ip_address must be set"));
        }
        if self.idle_threshold_ms > 0 && self.activity_check_interval_ms == 0 {
            return Err(SessionError::config(
                "activity_check_interval_ms must be greater than zero when idle_threshold_ms is set",
            ));
        }
        if let Some(identity) = &self.local_identity {
            if ContactId::from_uri(identity).is_none() {
                return Err(SessionError::config(format!("Invalid local identity: {}", identity)));
            }
        }
        Ok(())
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityConfig) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_idle_threshold_ms(mut self, idle_threshold_ms: u64, activity_check_interval_ms: u64) -> Self {
        self.idle_threshold_ms = idle_threshold_ms;
        self.activity_check_interval_ms = activity_check_interval_ms;
        self
    }

    pub fn with_local_address(mut self, ip: impl Into<String>, msrp_port: u16) -> Self {
        self.local_ip_address = ip.into();
        self.local_msrp_port = msrp_port;
        self
    }

    pub fn with_local_identity(mut self, identity: impl Into<String>) -> Self {
        self.local_identity = Some(identity.into());
        self
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn activity_check_interval(&self) -> Duration {
        Duration::from_millis(self.activity_check_interval_ms)
    }

    /// Local identity as a contact, when it resolves to one
    pub fn local_contact(&self) -> Option<ContactId> {
        self.local_identity.as_deref().and_then(ContactId::from_uri)
    }
}
