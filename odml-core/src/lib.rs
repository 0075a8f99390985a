//! ODML Core
//!
//! Compiles an ODML document - a declarative, markup-shaped description
//! of a tree of typed objects - into a live, fully wired object graph.
//! Two-stage event pipeline feeding a stack machine; no AST is built.
//!
//! # Architecture
//!
//! - **proto.rs** - Structural parser: markup text → proto events
//! - **normalize.rs** - Event normalizer: proto events → semantic events
//! - **assemble.rs** - Object assembler: semantic events → object graph
//! - **convert.rs** - Conversion engine and converter provider
//! - **registry.rs** - Type/member registry and descriptors
//! - **object.rs** - Materialized object model
//! - **span.rs** - Span/Location types

pub mod assemble;
pub mod convert;
pub mod error;
pub mod event;
pub mod loader;
pub mod normalize;
pub mod object;
pub mod proto;
pub mod registry;
pub mod span;

pub use assemble::Assembler;
pub use convert::{coerce, ConvertContext, Converter, ConverterProvider, Converters, FnConverter};
pub use error::{AssemblyError, ConversionError, LoadError, NormalizeError, ParseError};
pub use event::{Directive, Event, MemberRef};
pub use loader::{Loader, Wiring};
pub use normalize::Normalizer;
pub use object::{Object, Value};
pub use proto::{NameKind, ProtoEvent, ProtoParser, TagName};
pub use registry::{
    MemberDescriptor, MemberKey, ProvideContext, ProvideFn, Registry, TypeBuilder,
    TypeDescriptor, TypeKey, TypeRef,
};
pub use span::{Location, Span};
