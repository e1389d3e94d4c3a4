//! Small helpers over quick-xml shared by the document codecs

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{CodecError, Result};

/// Event writer producing an XML document with a UTF-8 declaration
pub(crate) struct DocumentWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl DocumentWriter {
    pub(crate) fn new() -> Result<Self> {
        let mut doc = Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        };
        doc.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(doc)
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| CodecError::malformed_document(e.to_string()))
    }

    pub(crate) fn start(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.write(Event::Start(element))
    }

    pub(crate) fn empty(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.write(Event::Empty(element))
    }

    pub(crate) fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    pub(crate) fn text(&mut self, text: &str) -> Result<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    /// Write `<name>text</name>`, escaping the text
    pub(crate) fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(BytesStart::new(name))?;
        self.text(text)?;
        self.end(name)
    }

    pub(crate) fn finish(self) -> Result<String> {
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| CodecError::malformed_document(e.to_string()))
    }
}

/// Count of elements opened but not yet closed while reading a document
///
/// A reader reaching `Eof` with open elements has seen a cut-off document.
#[derive(Debug, Default)]
pub(crate) struct OpenElements(usize);

impl OpenElements {
    pub(crate) fn track(&mut self, event: &Event<'_>) {
        match event {
            Event::Start(_) => self.0 += 1,
            Event::End(_) => self.0 = self.0.saturating_sub(1),
            _ => {}
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub(crate) fn count(&self) -> usize {
        self.0
    }
}

/// Value of the attribute whose local name matches `name`
pub(crate) fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}
