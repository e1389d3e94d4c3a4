//! Multipart invitation bodies
//!
//! Group and chat invitations carry SDP, a CPIM first message and a
//! resource list in one `multipart/mixed` body.

use tracing::trace;

/// A boundary-delimited body split into its parts
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    parts: Vec<(String, String)>,
}

impl Multipart {
    /// Split `content` on `boundary`
    ///
    /// A missing boundary or content yields an empty multipart.
    pub fn new(content: Option<&str>, boundary: Option<&str>) -> Self {
        let (content, boundary) = match (content, boundary) {
            (Some(content), Some(boundary)) if !boundary.is_empty() => (content, boundary),
            _ => return Self::default(),
        };

        let delimiter = format!("--{}", boundary);
        let mut parts = Vec::new();
        for section in content.split(delimiter.as_str()).skip(1) {
            if section.starts_with("--") {
                break;
            }
            let section = section
                .strip_prefix("\r\n")
                .or_else(|| section.strip_prefix('\n'))
                .unwrap_or(section);
            let (headers, body) = split_headers(section);
            let content_type = headers
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
                .map(|(_, value)| value.trim().to_string());
            match content_type {
                Some(content_type) => {
                    trace!("Multipart part {}", content_type);
                    let body = body
                        .strip_suffix("\r\n")
                        .or_else(|| body.strip_suffix('\n'))
                        .unwrap_or(body);
                    parts.push((content_type, body.to_string()));
                }
                None => trace!("Skipping multipart section without content type"),
            }
        }
        Self { parts }
    }

    /// Whether at least one part was found
    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Body of the first part whose content type starts with `mime_type`
    pub fn part(&self, mime_type: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(content_type, _)| {
                content_type
                    .get(..mime_type.len())
                    .map_or(false, |prefix| prefix.eq_ignore_ascii_case(mime_type))
            })
            .map(|(_, body)| body.as_str())
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }
}

fn split_headers(section: &str) -> (&str, &str) {
    if let Some(idx) = section.find("\r\n\r\n") {
        (&section[..idx], &section[idx + 4..])
    } else if let Some(idx) = section.find("\n\n") {
        (&section[..idx], &section[idx + 2..])
    } else {
        (section, "")
    }
}
