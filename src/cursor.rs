//! Forward-only event cursor over GML markup.
//!
//! The parser never sees raw XML events. It drives an [`XmlCursor`], which
//! exposes the current event, the current element name and its attributes,
//! and a handful of StAX-like helpers (`next_tag`, `element_text`,
//! `skip_element`). [`XmlStreamCursor`] implements it on top of
//! `quick_xml::NsReader`, so element and attribute names arrive already
//! namespace-resolved.

use std::fmt;
use std::io::BufRead;

use quick_xml::encoding::Decoder;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::{ParseError, Result};
use crate::name::QName;

/// Kind of the event the cursor currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StartDocument,
    StartElement,
    EndElement,
    Characters,
    EndDocument,
}

/// A namespace-resolved attribute of the current start element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Location of the cursor, attached to every structural error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    /// Byte offset into the input.
    pub offset: u64,
    /// Element the cursor was on, if any.
    pub element: Option<QName>,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            Some(element) => write!(f, "byte {} (element '{}')", self.offset, element),
            None => write!(f, "byte {}", self.offset),
        }
    }
}

pub trait XmlCursor {
    /// Moves to the next start, end, text or end-of-document event.
    fn advance(&mut self) -> Result<EventKind>;

    fn event(&self) -> EventKind;

    /// Name of the current start or end element.
    fn name(&self) -> Option<&QName>;

    /// Attributes of the current start element; empty for any other event.
    fn attributes(&self) -> &[Attribute];

    /// Text of the current `Characters` event.
    fn text(&self) -> &str;

    fn position(&self) -> Position;

    fn attribute(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|a| a.name.matches(namespace, local_name))
            .map(|a| a.value.as_str())
    }

    fn is_start_element(&self) -> bool {
        self.event() == EventKind::StartElement
    }

    /// Skips whitespace up to the next start or end element. Any other text is
    /// an error.
    fn next_tag(&mut self) -> Result<EventKind> {
        loop {
            match self.advance()? {
                EventKind::Characters => {
                    if !self.text().trim().is_empty() {
                        return Err(ParseError::xml(
                            format!("unexpected text '{}'", self.text().trim()),
                            self.position(),
                        ));
                    }
                }
                EventKind::StartDocument => {}
                kind => return Ok(kind),
            }
        }
    }

    /// Reads the text content of the current (text-only) start element and
    /// leaves the cursor on its end element. Adjacent text and CDATA runs are
    /// joined as written; only the ends of the result are trimmed.
    fn element_text(&mut self) -> Result<String> {
        if !self.is_start_element() {
            return Err(ParseError::xml(
                "element text requested outside of a start element",
                self.position(),
            ));
        }
        let mut text = String::new();
        loop {
            match self.advance()? {
                EventKind::Characters => text.push_str(self.text()),
                EventKind::EndElement => return Ok(text.trim().to_string()),
                EventKind::StartElement => {
                    return Err(ParseError::xml(
                        "expected text content, found a child element",
                        self.position(),
                    ))
                }
                EventKind::EndDocument | EventKind::StartDocument => {
                    return Err(ParseError::xml("unexpected end of document", self.position()))
                }
            }
        }
    }

    fn element_text_as_f64(&mut self) -> Result<f64> {
        let text = self.element_text()?;
        let trimmed = text.trim();
        trimmed
            .parse::<f64>()
            .map_err(|_| ParseError::malformed_number(trimmed, self.position()))
    }

    /// Skips the current element including all its descendants and leaves the
    /// cursor on its end element.
    fn skip_element(&mut self) -> Result<()> {
        if !self.is_start_element() {
            return Err(ParseError::xml(
                "skip requested outside of a start element",
                self.position(),
            ));
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance()? {
                EventKind::StartElement => depth += 1,
                EventKind::EndElement => depth -= 1,
                EventKind::EndDocument => {
                    return Err(ParseError::xml("unexpected end of document", self.position()))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Owned copy of a reader event, detached from the reader's buffer.
enum RawEvent {
    Start(QName, Vec<Attribute>),
    End(QName),
    Text(String),
    Eof,
    Ignored,
}

/// [`XmlCursor`] over any buffered reader.
pub struct XmlStreamCursor<R> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    event: EventKind,
    name: Option<QName>,
    attributes: Vec<Attribute>,
    text: String,
}

impl<'a> XmlStreamCursor<&'a [u8]> {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(xml: &'a str) -> Self {
        Self::new(xml.as_bytes())
    }
}

impl<R: BufRead> XmlStreamCursor<R> {
    pub fn new(reader: R) -> Self {
        let mut reader = NsReader::from_reader(reader);
        // untrimmed: `element_text` joins text and CDATA runs, then trims the ends
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;

        Self {
            reader,
            buf: Vec::new(),
            event: EventKind::StartDocument,
            name: None,
            attributes: Vec::new(),
            text: String::new(),
        }
    }

    fn read_raw(reader: &mut NsReader<R>, buf: &mut Vec<u8>) -> quick_xml::Result<RawEvent> {
        buf.clear();
        let decoder = reader.decoder();
        let (resolved, event) = reader.read_resolved_event_into(buf)?;
        let namespace = namespace_of(decoder, &resolved)?;

        let raw = match event {
            Event::Start(start) => {
                let name = QName::from_parts(namespace, decode(decoder, start.local_name().as_ref())?);
                let mut attributes = Vec::new();
                for attr in start.attributes() {
                    let attr = attr?;
                    if attr.key.as_namespace_binding().is_some() {
                        continue;
                    }
                    let (resolved, local_name) = reader.resolve_attribute(attr.key);
                    let attr_name = QName::from_parts(
                        namespace_of(decoder, &resolved)?,
                        decode(decoder, local_name.as_ref())?,
                    );
                    let value = attr.unescape_value()?.into_owned();
                    attributes.push(Attribute {
                        name: attr_name,
                        value,
                    });
                }
                RawEvent::Start(name, attributes)
            }
            Event::End(end) => {
                RawEvent::End(QName::from_parts(namespace, decode(decoder, end.local_name().as_ref())?))
            }
            Event::Text(text) => RawEvent::Text(text.unescape()?.into_owned()),
            Event::CData(cdata) => RawEvent::Text(decode(decoder, &cdata)?),
            Event::Eof => RawEvent::Eof,
            _ => RawEvent::Ignored,
        };
        Ok(raw)
    }
}

impl<R: BufRead> XmlCursor for XmlStreamCursor<R> {
    fn advance(&mut self) -> Result<EventKind> {
        if self.event == EventKind::EndDocument {
            return Ok(EventKind::EndDocument);
        }
        loop {
            let raw = Self::read_raw(&mut self.reader, &mut self.buf)
                .map_err(|e| ParseError::xml(e.to_string(), self.position()))?;
            self.attributes.clear();
            self.text.clear();
            self.event = match raw {
                RawEvent::Start(name, attributes) => {
                    self.name = Some(name);
                    self.attributes = attributes;
                    EventKind::StartElement
                }
                RawEvent::End(name) => {
                    self.name = Some(name);
                    EventKind::EndElement
                }
                RawEvent::Text(text) => {
                    self.text = text;
                    EventKind::Characters
                }
                RawEvent::Eof => {
                    self.name = None;
                    EventKind::EndDocument
                }
                RawEvent::Ignored => continue,
            };
            return Ok(self.event);
        }
    }

    fn event(&self) -> EventKind {
        self.event
    }

    fn name(&self) -> Option<&QName> {
        match self.event {
            EventKind::StartElement | EventKind::EndElement => self.name.as_ref(),
            _ => None,
        }
    }

    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn position(&self) -> Position {
        Position {
            offset: self.reader.buffer_position() as u64,
            element: self.name.clone(),
        }
    }
}

fn namespace_of(decoder: Decoder, resolved: &ResolveResult<'_>) -> quick_xml::Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => decode(decoder, ns.as_ref()).map(Some),
        _ => Ok(None),
    }
}

/// Names and CDATA must decode cleanly; invalid bytes are an XML error.
fn decode(decoder: Decoder, bytes: &[u8]) -> quick_xml::Result<String> {
    Ok(decoder.decode(bytes)?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ns;

    const DOC: &str = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml" gml:id="r1" lanes="2">
        <app:name>  Main street </app:name>
        <app:empty/>
        <app:nested><a><b>x</b></a></app:nested>
        <app:width uom="m">12.5</app:width>
    </app:Road>"#;

    #[test]
    fn test_resolves_element_and_attribute_names() {
        let mut cursor = XmlStreamCursor::from_str(DOC);
        assert_eq!(cursor.next_tag().unwrap(), EventKind::StartElement);
        assert_eq!(cursor.name(), Some(&QName::new("urn:app", "Road")));
        assert_eq!(cursor.attribute(Some(ns::GML), "id"), Some("r1"));
        assert_eq!(cursor.attribute(None, "lanes"), Some("2"));
        // namespace declarations are not attributes
        assert_eq!(cursor.attributes().len(), 2);
    }

    #[test]
    fn test_element_text_is_read_up_to_the_end_tag() {
        let mut cursor = XmlStreamCursor::from_str(DOC);
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        assert_eq!(cursor.element_text().unwrap().trim(), "Main street");
        assert_eq!(cursor.event(), EventKind::EndElement);
        assert_eq!(cursor.name(), Some(&QName::new("urn:app", "name")));
    }

    #[test]
    fn test_empty_elements_are_expanded() {
        let mut cursor = XmlStreamCursor::from_str(DOC);
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        cursor.element_text().unwrap();
        assert_eq!(cursor.next_tag().unwrap(), EventKind::StartElement);
        assert_eq!(cursor.next_tag().unwrap(), EventKind::EndElement);
        assert_eq!(cursor.name(), Some(&QName::new("urn:app", "empty")));
    }

    #[test]
    fn test_skip_element_and_number_text() {
        let mut cursor = XmlStreamCursor::from_str(DOC);
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        cursor.element_text().unwrap();
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        assert_eq!(cursor.name(), Some(&QName::new("urn:app", "nested")));
        cursor.skip_element().unwrap();
        assert_eq!(cursor.name(), Some(&QName::new("urn:app", "nested")));
        assert_eq!(cursor.event(), EventKind::EndElement);

        cursor.next_tag().unwrap();
        assert_eq!(cursor.attribute(None, "uom"), Some("m"));
        assert_eq!(cursor.element_text_as_f64().unwrap(), 12.5);
        assert_eq!(cursor.next_tag().unwrap(), EventKind::EndElement);
        assert_eq!(cursor.next_tag().unwrap(), EventKind::EndDocument);
    }

    #[test]
    fn test_next_tag_rejects_text() {
        let mut cursor = XmlStreamCursor::from_str("<a>text<b/></a>");
        cursor.next_tag().unwrap();
        let err = cursor.next_tag().unwrap_err();
        assert!(matches!(err, ParseError::Xml { .. }));
    }

    #[test]
    fn test_cdata_keeps_surrounding_whitespace() {
        let mut cursor = XmlStreamCursor::from_str("<a>  foo <![CDATA[x < y]]> bar  </a>");
        cursor.next_tag().unwrap();
        assert_eq!(cursor.element_text().unwrap(), "foo x < y bar");
    }

    #[test]
    fn test_invalid_utf8_name_is_an_error() {
        let mut cursor = XmlStreamCursor::new(&b"<a\xff\xfe>text</a\xff\xfe>"[..]);
        let err = cursor.next_tag().unwrap_err();
        assert!(matches!(err, ParseError::Xml { .. }));
    }

    #[test]
    fn test_element_text_rejects_child_elements() {
        let mut cursor = XmlStreamCursor::from_str("<a><b/></a>");
        cursor.next_tag().unwrap();
        assert!(cursor.element_text().is_err());
    }
}
