//! Proto events and the structural parser.
//!
//! The structural parser turns raw markup into a flat, lazy sequence of
//! `ProtoEvent`s in document order. It has no semantic knowledge: it
//! tracks a tag stack for open/close matching and classifies names
//! purely lexically (`Owner.Member` is a property element, `_Name` is a
//! directive member element, anything else is an object element). Raw
//! tokenization is delegated to the `quick-xml` reader; everything it
//! rejects surfaces as a `ParseError` with position context.

use std::collections::VecDeque;

use memchr::memchr;
use quick_xml::errors::{Error as XmlError, IllFormedError};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use unicode_xid::UnicodeXID;

use crate::error::ParseError;
use crate::span::{Location, Span};

/// A purely syntactic parse event, one-to-one with markup tags,
/// attributes and text runs. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoEvent {
    /// `xmlns="uri"` or `xmlns:prefix="uri"`, emitted before the
    /// owning `ElementOpen`.
    NamespaceDecl { prefix: String, uri: String, span: Span },

    ElementOpen { name: TagName, empty: bool, span: Span },

    ElementClose { span: Span },

    /// A non-namespace attribute, emitted after its `ElementOpen`.
    Attribute { name: TagName, value: String, span: Span },

    /// A text run, whitespace preserved. Significance is decided by
    /// the normalizer, not here.
    Text { value: String, span: Span },
}

impl ProtoEvent {
    pub fn span(&self) -> Span {
        match self {
            ProtoEvent::NamespaceDecl { span, .. } => *span,
            ProtoEvent::ElementOpen { span, .. } => *span,
            ProtoEvent::ElementClose { span } => *span,
            ProtoEvent::Attribute { span, .. } => *span,
            ProtoEvent::Text { span, .. } => *span,
        }
    }
}

/// A possibly-prefixed tag or attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagName {
    pub prefix: Option<String>,
    pub local: String,
}

/// Lexical classification of a local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind<'n> {
    /// An object element: `Dummy`.
    Object(&'n str),
    /// A property element: `Dummy.Child`.
    Property { owner: &'n str, member: &'n str },
    /// A directive member: `_Arguments` (name without the underscore).
    Directive(&'n str),
}

impl TagName {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        }
    }

    /// Split a raw `prefix:local` name.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self::new(Some(prefix), local),
            None => Self::new(None, raw),
        }
    }

    /// Classify the local name. Purely lexical: the registry is never
    /// consulted here.
    pub fn kind(&self) -> NameKind<'_> {
        if let Some(stripped) = self.local.strip_prefix('_') {
            return NameKind::Directive(stripped);
        }
        match memchr(b'.', self.local.as_bytes()) {
            Some(dot) => NameKind::Property {
                owner: &self.local[..dot],
                member: &self.local[dot + 1..],
            },
            None => NameKind::Object(&self.local),
        }
    }

    /// Whether this names a member rather than an object.
    pub fn is_member(&self) -> bool {
        !matches!(self.kind(), NameKind::Object(_))
    }

    /// Validate that every dot segment starts like an identifier.
    fn is_well_formed(&self) -> bool {
        !self.local.is_empty()
            && self.local.split('.').all(|segment| {
                segment
                    .chars()
                    .next()
                    .is_some_and(|c| c == '_' || c.is_xid_start())
            })
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// The structural parser: a lazy, finite, non-restartable iterator of
/// proto events over one source text.
pub struct ProtoParser<'a> {
    reader: Reader<&'a [u8]>,
    source: &'a str,
    queue: VecDeque<ProtoEvent>,
    /// Open tags: (raw name, is member element).
    stack: Vec<(String, bool)>,
    finished: bool,
}

impl<'a> ProtoParser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            reader: Reader::from_str(source),
            source,
            queue: VecDeque::new(),
            stack: Vec::new(),
            finished: false,
        }
    }

    fn location(&self, offset: usize) -> Location {
        Location::of(self.source, offset)
    }

    fn malformed(&self, message: impl std::fmt::Display) -> ParseError {
        let offset = self.reader.buffer_position() as usize;
        ParseError::Malformed {
            message: message.to_string(),
            location: self.location(offset),
        }
    }

    /// Map tokenizer failures onto the parse error taxonomy. The
    /// tokenizer checks tag matching itself, so these arrive before
    /// our own tag stack notices.
    fn classify(&self, err: XmlError, at: usize) -> ParseError {
        match err {
            XmlError::IllFormed(IllFormedError::MissingEndTag(_)) => {
                ParseError::UnexpectedEof { open: self.stack.len() }
            }
            XmlError::IllFormed(IllFormedError::MismatchedEndTag { found, .. }) => {
                ParseError::UnmatchedClose { name: found, location: self.location(at) }
            }
            XmlError::IllFormed(IllFormedError::UnmatchedEndTag(name)) => {
                ParseError::UnmatchedClose { name, location: self.location(at) }
            }
            other => self.malformed(other),
        }
    }

    fn unescape(&self, raw: &[u8]) -> Result<String, ParseError> {
        let text = String::from_utf8_lossy(raw);
        match quick_xml::escape::unescape(&text) {
            Ok(unescaped) => Ok(unescaped.into_owned()),
            Err(err) => Err(self.malformed(err)),
        }
    }

    fn open(&mut self, tag: &BytesStart<'_>, empty: bool, start: usize) -> Result<(), ParseError> {
        let span = Span::new(start, self.reader.buffer_position() as usize);
        let raw = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
        let name = TagName::parse(&raw);
        if !name.is_well_formed() {
            return Err(ParseError::InvalidName {
                name: raw,
                location: self.location(start),
            });
        }

        let is_member = name.is_member();
        // A member element needs an enclosing object element.
        let parent_is_member = self.stack.last().is_some_and(|(_, member)| *member);
        if is_member && (self.stack.is_empty() || parent_is_member) {
            return Err(ParseError::MisplacedPropertyElement {
                name: raw,
                location: self.location(start),
            });
        }

        let mut attributes = Vec::new();
        for attr in tag.attributes() {
            let attr = attr.map_err(|err| self.malformed(err))?;
            let key = attr.key.as_ref().to_vec();
            let value = self.unescape(&attr.value)?;
            if key == b"xmlns" {
                self.queue.push_back(ProtoEvent::NamespaceDecl {
                    prefix: String::new(),
                    uri: value,
                    span,
                });
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                self.queue.push_back(ProtoEvent::NamespaceDecl {
                    prefix: String::from_utf8_lossy(prefix).into_owned(),
                    uri: value,
                    span,
                });
            } else {
                attributes.push(ProtoEvent::Attribute {
                    name: TagName::parse(&String::from_utf8_lossy(&key)),
                    value,
                    span,
                });
            }
        }

        self.queue.push_back(ProtoEvent::ElementOpen { name, empty, span });
        self.queue.extend(attributes);

        if !empty {
            self.stack.push((raw, is_member));
        }
        Ok(())
    }

    fn close(&mut self, raw: &str, start: usize) -> Result<(), ParseError> {
        let span = Span::new(start, self.reader.buffer_position() as usize);
        match self.stack.pop() {
            Some((open, _)) if open == raw => {
                self.queue.push_back(ProtoEvent::ElementClose { span });
                Ok(())
            }
            _ => Err(ParseError::UnmatchedClose {
                name: raw.to_string(),
                location: self.location(start),
            }),
        }
    }
}

impl Iterator for ProtoParser<'_> {
    type Item = Result<ProtoEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }

            let start = self.reader.buffer_position() as usize;
            let step = match self.reader.read_event() {
                Err(err) => Err(self.classify(err, start)),
                Ok(XmlEvent::Start(tag)) => self.open(&tag, false, start),
                Ok(XmlEvent::Empty(tag)) => self.open(&tag, true, start),
                Ok(XmlEvent::End(tag)) => {
                    let raw = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                    self.close(&raw, start)
                }
                Ok(XmlEvent::Text(text)) => match self.unescape(&text) {
                    Ok(value) => {
                        let span = Span::new(start, self.reader.buffer_position() as usize);
                        self.queue.push_back(ProtoEvent::Text { value, span });
                        Ok(())
                    }
                    Err(err) => Err(err),
                },
                Ok(XmlEvent::CData(data)) => {
                    let span = Span::new(start, self.reader.buffer_position() as usize);
                    self.queue.push_back(ProtoEvent::Text {
                        value: String::from_utf8_lossy(&data).into_owned(),
                        span,
                    });
                    Ok(())
                }
                Ok(XmlEvent::Eof) => {
                    self.finished = true;
                    if self.stack.is_empty() {
                        return None;
                    }
                    Err(ParseError::UnexpectedEof { open: self.stack.len() })
                }
                // Declarations, comments and processing instructions
                // carry no structure.
                Ok(_) => Ok(()),
            };

            if let Err(err) = step {
                self.finished = true;
                return Some(Err(err));
            }
        }
    }
}
