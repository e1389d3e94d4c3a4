//! Geolocation push document
//!
//! Geolocation messages travel as an `rcsenvelope` XML document and are
//! persisted as the comma separated `label,latitude,longitude,expiration,accuracy`
//! string.

use std::fmt;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::datetime::{decode_date, encode_date};
use crate::error::{CodecError, Result};
use crate::xml::{attribute, DocumentWriter, OpenElements};

pub const GEOLOC_XMLNS: &str = "urn:gsma:params:xml:ns:rcs:rcs:geolocation";
pub const RPID_XMLNS: &str = "urn:ietf:params:xml:ns:pidf:rpid";
pub const GEOPRIV_XMLNS: &str = "urn:ietf:params:xml:ns:pidf:geopriv10";
pub const GML_XMLNS: &str = "http://www.opengis.net/gml";
pub const PIDFLO_XMLNS: &str = "http://www.opengis.net/pidflo/1.0";

const SRS_NAME: &str = "urn:ogc:def:crs:EPSG::4326";
const RADIUS_UOM: &str = "urn:ogc:def:uom:EPSG::9001";

/// A shared location
#[derive(Debug, Clone, PartialEq)]
pub struct Geoloc {
    pub label: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the epoch
    pub expiration: i64,
    /// Radius in metres
    pub accuracy: f64,
}

impl Geoloc {
    pub fn new(label: Option<String>, latitude: f64, longitude: f64, expiration: i64, accuracy: f64) -> Self {
        Self {
            label,
            latitude,
            longitude,
            expiration,
            accuracy,
        }
    }
}

impl fmt::Display for Geoloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.label.as_deref().unwrap_or(""),
            self.latitude,
            self.longitude,
            self.expiration,
            self.accuracy
        )
    }
}

impl FromStr for Geoloc {
    type Err = CodecError;

    /// Parse the persisted form; the label may itself contain commas
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CodecError::malformed_document(format!("invalid persisted geolocation: {}", s));
        let mut fields = s.rsplitn(5, ',');
        let accuracy = fields.next().and_then(|v| v.trim().parse().ok()).ok_or_else(invalid)?;
        let expiration = fields.next().and_then(|v| v.trim().parse().ok()).ok_or_else(invalid)?;
        let longitude = fields.next().and_then(|v| v.trim().parse().ok()).ok_or_else(invalid)?;
        let latitude = fields.next().and_then(|v| v.trim().parse().ok()).ok_or_else(invalid)?;
        let label = fields.next().ok_or_else(invalid)?;
        Ok(Geoloc {
            label: Some(label.to_string()),
            latitude,
            longitude,
            expiration,
            accuracy,
        })
    }
}

/// Build the geolocation push document
pub fn build_geoloc_document(geoloc: &Geoloc, contact: &str, message_id: &str, timestamp: i64) -> Result<String> {
    let expire = encode_date(geoloc.expiration);
    let mut doc = DocumentWriter::new()?;

    let mut envelope = BytesStart::new("rcsenvelope");
    envelope.push_attribute(("xmlns", GEOLOC_XMLNS));
    envelope.push_attribute(("xmlns:rpid", RPID_XMLNS));
    envelope.push_attribute(("xmlns:gp", GEOPRIV_XMLNS));
    envelope.push_attribute(("xmlns:gml", GML_XMLNS));
    envelope.push_attribute(("xmlns:gs", PIDFLO_XMLNS));
    envelope.push_attribute(("entity", contact));
    doc.start(envelope)?;

    let mut location = BytesStart::new("rcspushlocation");
    location.push_attribute(("id", message_id));
    location.push_attribute(("label", geoloc.label.as_deref().unwrap_or("")));
    doc.start(location)?;

    for element in ["rpid:place-type", "rpid:time-offset"] {
        let mut until = BytesStart::new(element);
        until.push_attribute(("rpid:until", expire.as_str()));
        doc.start(until)?;
        doc.end(element)?;
    }

    doc.start(BytesStart::new("gp:geopriv"))?;
    doc.start(BytesStart::new("gp:location-info"))?;
    let mut circle = BytesStart::new("gs:Circle");
    circle.push_attribute(("srsName", SRS_NAME));
    doc.start(circle)?;
    doc.text_element("gml:pos", &format!("{} {}", geoloc.latitude, geoloc.longitude))?;
    let mut radius = BytesStart::new("gs:radius");
    radius.push_attribute(("uom", RADIUS_UOM));
    doc.start(radius)?;
    doc.text(&geoloc.accuracy.to_string())?;
    doc.end("gs:radius")?;
    doc.end("gs:Circle")?;
    doc.end("gp:location-info")?;
    doc.start(BytesStart::new("gp:usage-rules"))?;
    doc.text_element("gp:retention-expiry", &expire)?;
    doc.end("gp:usage-rules")?;
    doc.end("gp:geopriv")?;

    doc.text_element("timestamp", &encode_date(timestamp))?;
    doc.end("rcspushlocation")?;
    doc.end("rcsenvelope")?;
    doc.finish()
}

#[derive(PartialEq)]
enum Field {
    None,
    Pos,
    Radius,
    RetentionExpiry,
}

/// Parse a geolocation push document
pub fn parse_geoloc_document(xml: &str) -> Result<Geoloc> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut field = Field::None;
    let mut label = None;
    let mut position = None;
    let mut accuracy = None;
    let mut expiration = None;
    let mut until = None;
    let mut open = OpenElements::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| CodecError::malformed_document(format!("invalid geolocation document: {}", e)))?;
        open.track(&event);
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"rcspushlocation" => label = attribute(e, b"label"),
                b"pos" => field = Field::Pos,
                b"radius" => field = Field::Radius,
                b"retention-expiry" => field = Field::RetentionExpiry,
                b"place-type" | b"time-offset" => {
                    if until.is_none() {
                        until = attribute(e, b"until").and_then(|v| decode_date(&v));
                    }
                }
                _ => {}
            },
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| CodecError::malformed_document(err.to_string()))?
                    .trim()
                    .to_string();
                match field {
                    Field::Pos => position = Some(parse_position(&text)?),
                    Field::Radius => {
                        accuracy = Some(text.parse::<f64>().map_err(|_| {
                            CodecError::malformed_document(format!("invalid radius: {}", text))
                        })?)
                    }
                    Field::RetentionExpiry => expiration = decode_date(&text),
                    Field::None => {}
                }
                field = Field::None;
            }
            Event::End(_) => field = Field::None,
            Event::Eof if !open.is_empty() => {
                return Err(CodecError::malformed_document(format!(
                    "geolocation document ends with {} unclosed elements",
                    open.count()
                )));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let (latitude, longitude) =
        position.ok_or_else(|| CodecError::malformed_document("geolocation without position"))?;
    Ok(Geoloc {
        label,
        latitude,
        longitude,
        expiration: expiration.or(until).unwrap_or(0),
        accuracy: accuracy.unwrap_or(0.0),
    })
}

fn parse_position(text: &str) -> Result<(f64, f64)> {
    let mut coordinates = text.split_whitespace().map(str::parse::<f64>);
    match (coordinates.next(), coordinates.next()) {
        (Some(Ok(latitude)), Some(Ok(longitude))) => Ok((latitude, longitude)),
        _ => Err(CodecError::malformed_document(format!("invalid position: {}", text))),
    }
}

/// Convert a network geolocation document into its persisted form
pub fn network_geoloc_to_persisted(xml: &str) -> Result<String> {
    parse_geoloc_document(xml).map(|geoloc| geoloc.to_string())
}

/// Convert a persisted geolocation into the network document
pub fn persisted_geoloc_to_network(content: &str, contact: &str, message_id: &str, timestamp: i64) -> Result<String> {
    let geoloc = content.parse::<Geoloc>()?;
    build_geoloc_document(&geoloc, contact, message_id, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> Geoloc {
        Geoloc::new(Some("Home, sweet home".to_string()), 48.8566, 2.3522, 1_700_000_000_000, 15.5)
    }

    #[test]
    fn test_persisted_form() {
        let geoloc = paris();
        assert_eq!(geoloc.to_string(), "Home, sweet home,48.8566,2.3522,1700000000000,15.5");
        assert_eq!(geoloc.to_string().parse::<Geoloc>().unwrap(), geoloc);

        let unlabelled = Geoloc::new(None, 1.0, -2.5, 0, 0.0);
        assert_eq!(unlabelled.to_string(), ",1,-2.5,0,0");
        assert_eq!(unlabelled.to_string().parse::<Geoloc>().unwrap().label.as_deref(), Some(""));
        assert!("1,2".parse::<Geoloc>().is_err());
    }

    #[test]
    fn test_document_round_trip() {
        let xml = build_geoloc_document(&paris(), "tel:+33612345678", "msg-1", 1_700_000_000_000).unwrap();
        assert!(xml.contains("xmlns=\"urn:gsma:params:xml:ns:rcs:rcs:geolocation\""));
        assert!(xml.contains("<gml:pos>48.8566 2.3522</gml:pos>"));
        assert!(xml.contains("<gp:retention-expiry>2023-11-14T22:13:20Z</gp:retention-expiry>"));
        assert_eq!(parse_geoloc_document(&xml).unwrap(), paris());
    }

    #[test]
    fn test_label_escaping() {
        let geoloc = Geoloc::new(Some("Tom & Jerry <3".to_string()), 10.0, 20.0, 0, 1.0);
        let xml = build_geoloc_document(&geoloc, "tel:+33612345678", "id", 0).unwrap();
        assert!(xml.contains("Tom &amp; Jerry &lt;3"));
        assert_eq!(parse_geoloc_document(&xml).unwrap().label.as_deref(), Some("Tom & Jerry <3"));
    }

    #[test]
    fn test_missing_position() {
        let xml = "<rcsenvelope><rcspushlocation label=\"x\"/></rcsenvelope>";
        assert!(matches!(parse_geoloc_document(xml), Err(CodecError::MalformedDocument { .. })));
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        let xml = build_geoloc_document(&paris(), "tel:+33612345678", "msg-1", 0).unwrap();
        let cut = &xml[..xml.rfind("</").unwrap()];
        assert!(matches!(parse_geoloc_document(cut), Err(CodecError::MalformedDocument { .. })));
    }

    #[test]
    fn test_network_to_persisted() {
        let xml = build_geoloc_document(&paris(), "tel:+33612345678", "msg-1", 0).unwrap();
        assert_eq!(
            network_geoloc_to_persisted(&xml).unwrap(),
            "Home, sweet home,48.8566,2.3522,1700000000000,15.5"
        );
    }
}
