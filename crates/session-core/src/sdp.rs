//! MSRP session descriptions
//!
//! Only the subset of SDP used by RCS MSRP sessions is handled: the
//! session-level `o=`/`c=` lines and `m=message` media descriptions with
//! their `setup`, `path`, `accept-types`, `accept-wrapped-types` and
//! `max-size` attributes.

use std::str::FromStr;

use nom::{
    character::complete::{anychar, char, not_line_ending},
    IResult,
};
use tracing::{debug, trace};

use rcs_msrp_core::{MsrpPath, SetupRole};

use crate::errors::{Result, SessionError};

/// Seconds between the NTP epoch (1900) and the Unix epoch
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Port advertised by an active endpoint, which never listens
pub const DISCARD_PORT: u16 = 9;

pub const MSRP_PROTOCOL: &str = "TCP/MSRP";
pub const MSRPS_PROTOCOL: &str = "TCP/TLS/MSRP";

/// Local parameters of an MSRP media description
#[derive(Debug, Clone)]
pub struct MsrpSdpParams {
    pub local_ip: String,
    pub port: u16,
    pub path: MsrpPath,
    pub setup: SetupRole,
    pub max_size: usize,
    pub accept_types: Vec<String>,
    pub wrapped_types: Vec<String>,
}

/// Current time on the NTP clock, used as SDP session id and version
pub fn ntp_time() -> u64 {
    let unix = chrono::Utc::now().timestamp().max(0) as u64;
    unix + NTP_UNIX_OFFSET
}

fn address_type(ip: &str) -> &'static str {
    if ip.contains(':') {
        "IP6"
    } else {
        "IP4"
    }
}

/// Build the SDP offer or answer of an MSRP session
pub fn build_msrp_sdp(params: &MsrpSdpParams, ntp_time: u64) -> String {
    let addr_type = address_type(&params.local_ip);
    let port = if params.setup.is_active() { DISCARD_PORT } else { params.port };
    let protocol = if params.path.secure { MSRPS_PROTOCOL } else { MSRP_PROTOCOL };

    let mut sdp = String::with_capacity(512);
    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o=- {} {} IN {} {}\r\n", ntp_time, ntp_time, addr_type, params.local_ip));
    sdp.push_str("s=-\r\n");
    sdp.push_str(&format!("c=IN {} {}\r\n", addr_type, params.local_ip));
    sdp.push_str("t=0 0\r\n");
    sdp.push_str(&format!("m=message {} {} *\r\n", port, protocol));
    sdp.push_str(&format!("a=setup:{}\r\n", params.setup));
    sdp.push_str(&format!("a=path:{}\r\n", params.path));
    sdp.push_str(&format!("a=max-size:{}\r\n", params.max_size));
    sdp.push_str(&format!("a=accept-types:{}\r\n", params.accept_types.join(" ")));
    if !params.wrapped_types.is_empty() {
        sdp.push_str(&format!("a=accept-wrapped-types:{}\r\n", params.wrapped_types.join(" ")));
    }
    sdp.push_str("a=sendrecv\r\n");
    sdp
}

/// Parse one `x=value` line
pub fn parse_sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    let (input, key) = anychar(input)?;
    let (input, _) = char('=')(input)?;
    let (input, value) = not_line_ending(input)?;

    let input = input.trim_start_matches(['\r', '\n']);

    Ok((input, (key, value.trim())))
}

/// One `m=` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    /// Address from a media-level `c=` line
    pub connection: Option<String>,
    pub attributes: Vec<(String, Option<String>)>,
}

impl MediaDescription {
    /// Value of the first attribute called `name`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }
}

/// A parsed session description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub origin_address: Option<String>,
    /// Address from the session-level `c=` line
    pub connection: Option<String>,
    pub media: Vec<MediaDescription>,
}

fn connection_address(value: &str) -> Result<String> {
    // c=<nettype> <addrtype> <address>
    let address = value
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| SessionError::signaling(format!("Invalid SDP connection line: {}", value)))?;
    // strip a multicast TTL suffix
    Ok(address.split('/').next().unwrap_or(address).to_string())
}

fn media_line(value: &str) -> Result<MediaDescription> {
    let mut fields = value.split_whitespace();
    let invalid = || SessionError::signaling(format!("Invalid SDP media line: {}", value));
    let media = fields.next().ok_or_else(invalid)?.to_string();
    let port = fields
        .next()
        .and_then(|p| p.split('/').next())
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(invalid)?;
    let protocol = fields.next().ok_or_else(invalid)?.to_string();
    Ok(MediaDescription {
        media,
        port,
        protocol,
        formats: fields.map(str::to_string).collect(),
        connection: None,
        attributes: Vec::new(),
    })
}

impl FromStr for SessionDescription {
    type Err = SessionError;

    fn from_str(text: &str) -> Result<Self> {
        let mut description = SessionDescription::default();
        let mut input = text.trim_start();
        let mut saw_version = false;

        while !input.is_empty() {
            let (rest, (key, value)) = parse_sdp_line(input)
                .map_err(|e| SessionError::signaling(format!("Invalid SDP line: {}", e)))?;
            input = rest;

            match key {
                'v' => saw_version = true,
                'o' => {
                    description.origin_address = value.split_whitespace().nth(5).map(str::to_string);
                }
                'c' => {
                    let address = connection_address(value)?;
                    match description.media.last_mut() {
                        Some(media) => media.connection = Some(address),
                        None => description.connection = Some(address),
                    }
                }
                'm' => description.media.push(media_line(value)?),
                'a' => {
                    if let Some(media) = description.media.last_mut() {
                        let (name, attribute_value) = match value.split_once(':') {
                            Some((name, v)) => (name.trim().to_string(), Some(v.trim().to_string())),
                            None => (value.to_string(), None),
                        };
                        media.attributes.push((name, attribute_value));
                    }
                }
                other => trace!("Ignoring SDP line {}={}", other, value),
            }
        }

        if !saw_version {
            return Err(SessionError::signaling("SDP without version line"));
        }
        Ok(description)
    }
}

/// What is needed to reach the remote MSRP endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrpMediaInfo {
    pub remote_host: String,
    pub remote_port: u16,
    pub remote_path: MsrpPath,
    pub setup: Option<SetupRole>,
    pub accept_types: Vec<String>,
    pub max_size: Option<usize>,
}

impl MsrpMediaInfo {
    /// Take the first `m=message` description of `description`
    pub fn from_sdp(description: &SessionDescription) -> Result<Self> {
        let media = description
            .media
            .iter()
            .find(|m| m.media.eq_ignore_ascii_case("message"))
            .ok_or_else(|| SessionError::signaling("SDP has no message media"))?;

        let path = media
            .attribute("path")
            .ok_or_else(|| SessionError::signaling("SDP message media has no path"))?;
        // several paths mean relays; the last hop is the remote endpoint
        let remote_path = path
            .split_whitespace()
            .last()
            .unwrap_or(path)
            .parse::<MsrpPath>()
            .map_err(|e| SessionError::signaling(e.to_string()))?;

        let remote_host = media
            .connection
            .clone()
            .or_else(|| description.connection.clone())
            .ok_or_else(|| SessionError::signaling("SDP has no connection address"))?;

        let setup = match media.attribute("setup") {
            Some(value) => Some(
                value
                    .parse::<SetupRole>()
                    .map_err(|e| SessionError::signaling(e.to_string()))?,
            ),
            None => None,
        };

        let info = MsrpMediaInfo {
            remote_host,
            remote_port: media.port,
            remote_path,
            setup,
            accept_types: media
                .attribute("accept-types")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            max_size: media.attribute("max-size").and_then(|v| v.parse().ok()),
        };
        debug!(
            "Remote MSRP endpoint {}:{} path {} setup {:?}",
            info.remote_host, info.remote_port, info.remote_path, info.setup
        );
        Ok(info)
    }

    /// Parse an SDP body and take its MSRP media
    pub fn parse(sdp: &str) -> Result<Self> {
        Self::from_sdp(&sdp.parse()?)
    }
}
