//! Error taxonomy for the ODML pipeline.
//!
//! One error type per stage: `ParseError` (structural parser),
//! `NormalizeError` (event normalizer), `AssemblyError` (object
//! assembler), `ConversionError` (conversion engine). All are
//! unrecoverable at the point raised; `LoadError` is the single
//! user-visible failure at the loader.

use thiserror::Error;

use crate::span::{Location, Span};

/// Malformed markup structure, raised by the structural parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Markup the tokenizer rejected (ill-formed tags, bad escapes).
    #[error("malformed markup at {location}: {message}")]
    Malformed { message: String, location: Location },

    /// A closing tag with no matching open tag.
    #[error("unmatched closing tag `{name}` at {location}")]
    UnmatchedClose { name: String, location: Location },

    /// A property element at the document root or directly inside
    /// another property element.
    #[error("misplaced property element `{name}` at {location}")]
    MisplacedPropertyElement { name: String, location: Location },

    /// An element or attribute name that does not lex as an identifier.
    #[error("invalid name `{name}` at {location}")]
    InvalidName { name: String, location: Location },

    /// Input ended with open elements remaining.
    #[error("unexpected end of document ({open} element(s) still open)")]
    UnexpectedEof { open: usize },
}

/// Unresolvable names or ambiguous implicit targets, raised by the
/// event normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("unknown type `{name}` in namespace `{namespace}` at {}..{}", .span.start, .span.end)]
    UnknownTypeName { namespace: String, name: String, span: Span },

    #[error("type `{type_name}` has no member `{member}` at {}..{}", .span.start, .span.end)]
    UnknownMemberName { type_name: String, member: String, span: Span },

    #[error("undeclared namespace prefix `{prefix}` at {}..{}", .span.start, .span.end)]
    UnknownPrefix { prefix: String, span: Span },

    #[error("unknown directive member `{name}` at {}..{}", .span.start, .span.end)]
    UnknownDirective { name: String, span: Span },

    /// Object children offered to a type that declares no content member.
    #[error("type `{type_name}` has no content member for bare children at {}..{}", .span.start, .span.end)]
    NoContentMember { type_name: String, span: Span },

    /// More than one child offered to a member that is not
    /// collection-valued.
    #[error("member `{member}` cannot take multiple children at {}..{}", .span.start, .span.end)]
    TooManyChildren { member: String, span: Span },

    /// A member reference with no enclosing object. The structural
    /// parser never produces this; it guards hand-built proto streams.
    #[error("member `{name}` outside any object at {}..{}", .span.start, .span.end)]
    MisplacedMember { name: String, span: Span },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Assembly-time failures, raised by the object assembler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("unknown member `{member}` on type `{type_name}`")]
    UnknownMember { type_name: String, member: String },

    #[error("type `{type_name}` is not constructible: {reason}")]
    NotConstructible { type_name: String, reason: String },

    /// The event stream violated the nesting contract. This is a
    /// programming error in the producer, not a user input error.
    #[error("malformed event stream: {0}")]
    MalformedEventStream(&'static str),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Value coercion failures, raised by the conversion engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("`{value}` is not a member of enumeration `{enum_name}`")]
    UnknownEnumMember { enum_name: String, value: String },

    #[error("no converter from `{value}` to {target}")]
    NoConverter { value: String, target: String },
}

/// The single failure surfaced by a top-level load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Normalize(NormalizeError),

    #[error(transparent)]
    Assembly(AssemblyError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl From<NormalizeError> for LoadError {
    fn from(err: NormalizeError) -> Self {
        // Parse failures travel through the normalizer; report them
        // under their own taxon.
        match err {
            NormalizeError::Parse(parse) => LoadError::Parse(parse),
            other => LoadError::Normalize(other),
        }
    }
}

impl From<AssemblyError> for LoadError {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::Conversion(conv) => LoadError::Conversion(conv),
            other => LoadError::Assembly(other),
        }
    }
}
