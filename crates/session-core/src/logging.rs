//! Tracing setup for applications embedding the engine
//!
//! The engine crates log at the configured level, together with the
//! embedding application's own target. Everything else is kept at `warn`.
//! Setting `RCS_LOG` replaces these directives entirely.

use std::str::FromStr;

use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::RcsConfig;
use crate::errors::{Result, SessionError};

/// Environment variable overriding the generated filter directives
pub const LOG_ENV_VAR: &str = "RCS_LOG";

/// Tracing targets of the engine crates
const ENGINE_TARGETS: [&str; 3] = ["rcs_session_core", "rcs_msrp_core", "rcs_message_core"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level of the engine and application targets
    pub level: Level,
    /// Emit one JSON object per event on stdout
    pub json: bool,
    /// Include source file and line in each event
    pub source_locations: bool,
    /// Crate name of the embedding application
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            source_locations: false,
            app_name: "rcs_engine".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        Self {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_source_locations(mut self) -> Self {
        self.source_locations = true;
        self
    }

    /// Filter directives used when `RCS_LOG` is unset
    ///
    /// Cargo package names use dashes where tracing targets use underscores,
    /// so `app_name` is accepted in either form.
    pub fn directives(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        let app_target = self.app_name.trim().replace('-', "_");

        let mut directives = vec!["warn".to_string()];
        directives.extend(ENGINE_TARGETS.iter().map(|target| format!("{}={}", target, level)));
        if !app_target.is_empty() && !ENGINE_TARGETS.contains(&app_target.as_str()) {
            directives.push(format!("{}={}", app_target, level));
        }
        directives.join(",")
    }

    fn filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_env(LOG_ENV_VAR) {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.directives())
                .map_err(|e| SessionError::config(format!("Invalid log filter for {}: {}", self.app_name, e))),
        }
    }
}

/// Install the global subscriber described by `config`
///
/// Fails when a global subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter()?)
        .with_file(config.source_locations)
        .with_line_number(config.source_locations);

    let installed = if config.json {
        builder.with_writer(std::io::stdout).json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SessionError::config(format!("Failed to install logging for {}: {}", config.app_name, e)))
}

/// Parse a log level such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| SessionError::config(format!("Invalid log level: {}", level)))
}

/// One-line description of the engine settings that shape session handling
pub fn engine_summary(config: &RcsConfig) -> String {
    let limit = |n: usize| if n == 0 { "unlimited".to_string() } else { n.to_string() };
    let idle = if config.idle_threshold_ms == 0 {
        "off".to_string()
    } else {
        format!("{} ms", config.idle_threshold_ms)
    };
    format!(
        "identity {}, MSRP {}:{}{}, max sessions {}, idle check {}, chunk {} B, max message {}",
        config.local_identity.as_deref().unwrap_or("unset"),
        config.local_ip_address,
        config.local_msrp_port,
        if config.msrp_tls { " (TLS)" } else { "" },
        limit(config.max_sessions),
        idle,
        config.max_chunk_size,
        limit(config.max_message_size),
    )
}

/// Log the engine settings once at startup
pub fn log_engine_config(config: &RcsConfig) {
    info!("Session service ready: {}", engine_summary(config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(SessionError::Configuration { .. })));
    }

    #[test]
    fn test_directives_cover_engine_and_application() {
        let config = LoggingConfig::new(Level::DEBUG, "chat-client");
        assert_eq!(
            config.directives(),
            "warn,rcs_session_core=debug,rcs_msrp_core=debug,rcs_message_core=debug,chat_client=debug"
        );

        let engine_only = LoggingConfig::new(Level::TRACE, "rcs-msrp-core");
        assert_eq!(
            engine_only.directives(),
            "warn,rcs_session_core=trace,rcs_msrp_core=trace,rcs_message_core=trace"
        );
    }

    #[test]
    fn test_engine_summary() {
        let config = RcsConfig::default()
            .with_local_identity("tel:+33612345678")
            .with_local_address("10.0.0.2", 20010)
            .with_max_sessions(4)
            .with_idle_threshold_ms(30000, 1000);
        assert_eq!(
            engine_summary(&config),
            format!(
                "identity tel:+33612345678, MSRP 10.0.0.2:20010, max sessions 4, idle check 30000 ms, chunk {} B, max message unlimited",
                config.max_chunk_size
            )
        );

        let defaults = engine_summary(&RcsConfig::default());
        assert!(defaults.starts_with("identity unset, MSRP 127.0.0.1:20000, max sessions unlimited, idle check off"));
    }

    #[test]
    #[serial]
    fn test_second_setup_is_rejected() {
        let config = LoggingConfig::new(Level::DEBUG, "rcs-engine-tests").with_source_locations();
        // another test may have installed a subscriber first
        let _ = setup_logging(&config);
        let err = setup_logging(&config).unwrap_err();
        assert!(err.to_string().contains("rcs-engine-tests"));
        log_engine_config(&RcsConfig::default());
    }
}
