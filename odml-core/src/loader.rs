//! The top-level document loader.
//!
//! Wires parser → normalizer → assembler for one source text. The
//! pipeline is demand-driven: consuming one semantic event pulls proto
//! events, which pull raw input; nothing is buffered beyond what the
//! normalizer's member reordering requires.

use tracing::debug;

use crate::assemble::Assembler;
use crate::convert::ConverterProvider;
use crate::error::LoadError;
use crate::normalize::Normalizer;
use crate::object::Object;
use crate::proto::ProtoParser;
use crate::registry::Registry;

/// The ambient collaborators of one assembly run, threaded explicitly
/// into the pipeline stages rather than held as globals.
#[derive(Clone, Copy)]
pub struct Wiring<'a> {
    pub registry: &'a Registry,
    pub converters: &'a dyn ConverterProvider,
}

/// Loads ODML documents against one wiring.
pub struct Loader<'a> {
    wiring: Wiring<'a>,
}

impl<'a> Loader<'a> {
    pub fn new(wiring: Wiring<'a>) -> Self {
        Self { wiring }
    }

    /// Compile one markup document into its root object, or fail with
    /// the single error for this load. A fresh assembler (fresh frame
    /// stack) is used per call; partial graphs are discarded on error.
    pub fn load(&self, source: &str) -> Result<Object, LoadError> {
        debug!(bytes = source.len(), "load document");
        let protos = ProtoParser::new(source);
        let events = Normalizer::new(protos, self.wiring.registry);
        let mut assembler = Assembler::new(self.wiring.registry, self.wiring.converters);
        for event in events {
            assembler.process(event?)?;
        }
        let root = assembler.finish()?;
        debug!("load complete");
        Ok(root)
    }
}
