//! The object assembler.
//!
//! A stack machine that folds the semantic event stream into object
//! instances. One frame per nesting level, held in a growable vector
//! indexed by depth; the stack starts with a single pre-raised empty
//! frame, so the root object's `EndObject` pops back to depth one and
//! publishes the result.
//!
//! Completed children are parked in the parent frame's `pending` slot
//! and associated at `EndMember`; frames reached via `GetObject` host a
//! collection instead and receive children the moment they close.
//! Deferred-value providers resolve at their own close boundary, and
//! the provider's returned value is what gets associated.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::convert::{coerce, ConverterProvider};
use crate::error::AssemblyError;
use crate::event::{Directive, Event, MemberRef};
use crate::object::{Object, Value};
use crate::registry::{ProvideContext, Registry, TypeKey, TypeRef};

/// One level of in-progress construction.
#[derive(Default)]
struct Frame {
    ty: Option<TypeKey>,
    instance: Option<Object>,
    member: Option<MemberRef>,
    /// A coerced literal or completed child awaiting association.
    pending: Option<Value>,
    /// The frame reuses a collection obtained via `GetObject`.
    hosting_collection: bool,
    /// Ordered constructor arguments gathered so far.
    ctor_args: Vec<Value>,
    recording_ctor_args: bool,
}

/// The assembler. One instance per load; the frame stack, prefix table
/// and result are exclusively owned by a single assembly run.
pub struct Assembler<'a> {
    registry: &'a Registry,
    converters: &'a dyn ConverterProvider,
    stack: Vec<Frame>,
    prefixes: HashMap<String, String>,
    result: Option<Object>,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a Registry, converters: &'a dyn ConverterProvider) -> Self {
        Self {
            registry,
            converters,
            // The base frame: depth 1 before the root object opens.
            stack: vec![Frame::default()],
            prefixes: HashMap::new(),
            result: None,
        }
    }

    /// Look up a recorded namespace declaration.
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Feed one semantic event through the state machine.
    pub fn process(&mut self, event: Event) -> Result<(), AssemblyError> {
        match event {
            Event::NamespaceDecl { prefix, uri } => {
                self.prefixes.insert(prefix, uri);
                Ok(())
            }
            Event::StartObject { ty } => {
                debug!(ty = self.registry.ty(ty).name.as_str(), "start object");
                self.stack.push(Frame { ty: Some(ty), ..Frame::default() });
                Ok(())
            }
            Event::StartMember { member } => self.start_member(member),
            Event::Value { literal } => self.value(literal),
            Event::GetObject => self.get_object(),
            Event::EndMember => self.end_member(),
            Event::EndObject => self.end_object(),
        }
    }

    /// Consume the assembler, checking the final stack shape.
    pub fn finish(mut self) -> Result<Object, AssemblyError> {
        if self.stack.len() != 1 {
            return Err(AssemblyError::MalformedEventStream(
                "event stream ended with unclosed objects",
            ));
        }
        self.result
            .take()
            .ok_or(AssemblyError::MalformedEventStream("no root object was produced"))
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.stack.last_mut().expect("base frame is never popped")
    }

    fn start_member(&mut self, member: MemberRef) -> Result<(), AssemblyError> {
        if self.stack.len() == 1 {
            return Err(AssemblyError::MalformedEventStream(
                "start member outside any object",
            ));
        }
        if let MemberRef::Unknown(name) = &member {
            let frame = self.stack.last().expect("base frame is never popped");
            if let Some(ty) = frame.ty {
                if !self.registry.ty(ty).dynamic {
                    return Err(AssemblyError::UnknownMember {
                        type_name: self.registry.ty(ty).name.clone(),
                        member: name.clone(),
                    });
                }
            }
        }

        let frame = self.top_mut();
        if matches!(member, MemberRef::Directive(Directive::Arguments)) {
            frame.recording_ctor_args = true;
            frame.ctor_args.clear();
        }
        frame.member = Some(member);
        Ok(())
    }

    fn value(&mut self, literal: String) -> Result<(), AssemblyError> {
        let frame = self.stack.last().expect("base frame is never popped");
        if frame.recording_ctor_args {
            let ty = frame
                .ty
                .ok_or(AssemblyError::MalformedEventStream("value before any object"))?;
            let slot = frame.ctor_args.len();
            let target = self.registry.ctor_slot_ty(ty, slot);
            let coerced = coerce(Value::String(literal), target, self.registry, self.converters)?;
            self.top_mut().ctor_args.push(coerced);
            return Ok(());
        }

        let member = frame
            .member
            .clone()
            .ok_or(AssemblyError::MalformedEventStream("value outside a member"))?;
        self.materialize_top()?;
        let target = member.declared_ty(self.registry);
        let coerced = coerce(Value::String(literal), target, self.registry, self.converters)?;

        let frame = self.top_mut();
        if frame.hosting_collection {
            frame
                .instance
                .as_mut()
                .expect("hosting frame is materialized")
                .push_item(coerced);
        } else {
            // Last assignment wins when a member is supplied twice.
            frame.pending = Some(coerced);
        }
        Ok(())
    }

    fn get_object(&mut self) -> Result<(), AssemblyError> {
        let member = self
            .stack
            .last()
            .and_then(|frame| frame.member.clone())
            .ok_or(AssemblyError::MalformedEventStream("get object outside a member"))?;
        self.materialize_top()?;

        let slot = member.slot_name(self.registry);
        let declared = member.declared_ty(self.registry);
        let frame = self.top_mut();
        let instance = frame.instance.as_mut().expect("owner is materialized");

        // Reuse the member's existing collection; it is taken off the
        // owner for the duration of the frame and restored at the
        // enclosing EndMember.
        let collection = match instance.take(&slot) {
            Some(Value::Object(collection)) => collection,
            Some(_) => {
                return Err(AssemblyError::MalformedEventStream(
                    "get object on a member not holding a collection",
                ))
            }
            None => match declared {
                TypeRef::Named(collection_ty) => Object::new(collection_ty),
                _ => {
                    return Err(AssemblyError::MalformedEventStream(
                        "get object on a member with no collection type",
                    ))
                }
            },
        };

        trace!(member = slot.as_str(), "hosting collection");
        self.stack.push(Frame {
            ty: Some(collection.ty()),
            instance: Some(collection),
            hosting_collection: true,
            ..Frame::default()
        });
        Ok(())
    }

    fn end_member(&mut self) -> Result<(), AssemblyError> {
        let frame = self.top_mut();
        if frame.recording_ctor_args
            && matches!(frame.member, Some(MemberRef::Directive(Directive::Arguments)))
        {
            frame.recording_ctor_args = false;
        }

        if let Some(value) = self.top_mut().pending.take() {
            let member = self
                .stack
                .last()
                .and_then(|frame| frame.member.clone())
                .ok_or(AssemblyError::MalformedEventStream("end member without start member"))?;
            self.materialize_top()?;
            let slot = member.slot_name(self.registry);

            let registry = self.registry;
            let frame = self.top_mut();
            let instance = frame.instance.as_mut().expect("owner is materialized");
            let value = resolve_provider(registry, value, instance, &slot)?;
            trace!(member = slot.as_str(), "associate member value");
            instance.set(slot, value);
        }

        self.top_mut().member = None;
        Ok(())
    }

    fn end_object(&mut self) -> Result<(), AssemblyError> {
        if self.stack.len() <= 1 {
            return Err(AssemblyError::MalformedEventStream(
                "end object with no open object",
            ));
        }
        // An object with no attributes or children materializes here.
        self.materialize_top()?;

        let frame = self.stack.pop().expect("guarded above");
        let instance = frame.instance.expect("materialized above");
        debug!(ty = self.registry.ty(instance.ty()).name.as_str(), "end object");

        if self.stack.len() == 1 {
            self.result = Some(instance);
            return Ok(());
        }

        let registry = self.registry;
        let parent = self.top_mut();
        if parent.recording_ctor_args {
            parent.ctor_args.push(Value::Object(instance));
        } else if parent.hosting_collection {
            let collection = parent
                .instance
                .as_mut()
                .expect("hosting frame is materialized");
            let value = resolve_provider(
                registry,
                Value::Object(instance),
                collection,
                Directive::Items.name(),
            )?;
            collection.push_item(value);
        } else {
            if parent.pending.is_some() {
                return Err(AssemblyError::MalformedEventStream(
                    "member already holds a pending value",
                ));
            }
            parent.pending = Some(Value::Object(instance));
        }
        Ok(())
    }

    /// Create the current frame's instance if it does not exist yet,
    /// passing any gathered constructor arguments.
    fn materialize_top(&mut self) -> Result<(), AssemblyError> {
        let frame = self.stack.last().expect("base frame is never popped");
        if frame.instance.is_some() {
            return Ok(());
        }
        let ty = frame
            .ty
            .ok_or(AssemblyError::MalformedEventStream("no type to materialize"))?;

        let args = std::mem::take(&mut self.top_mut().ctor_args);
        let instance = self.registry.instantiate(ty, args)?;
        trace!(ty = self.registry.ty(ty).name.as_str(), "materialize instance");
        self.top_mut().instance = Some(instance);
        Ok(())
    }
}

/// Swap a deferred-value-provider instance for the value it provides.
/// Anything else passes through untouched.
fn resolve_provider(
    registry: &Registry,
    value: Value,
    target: &Object,
    member: &str,
) -> Result<Value, AssemblyError> {
    if let Value::Object(object) = &value {
        if let Some(provide) = registry.ty(object.ty()).provider() {
            let ctx = ProvideContext { target, member, registry };
            trace!(ty = registry.ty(object.ty()).name.as_str(), "resolve deferred value");
            return provide(object, &ctx);
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Converters;

    #[test]
    fn test_end_object_on_empty_stack_is_malformed() {
        let registry = Registry::new();
        let converters = Converters::new();
        let mut assembler = Assembler::new(&registry, &converters);
        let err = assembler.process(Event::EndObject).unwrap_err();
        assert!(matches!(err, AssemblyError::MalformedEventStream(_)));
    }

    #[test]
    fn test_member_outside_object_is_malformed() {
        let registry = Registry::new();
        let converters = Converters::new();
        let mut assembler = Assembler::new(&registry, &converters);
        let err = assembler
            .process(Event::StartMember { member: MemberRef::Unknown("X".into()) })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::MalformedEventStream(_)));
    }

    #[test]
    fn test_unterminated_stream_is_malformed() {
        let mut registry = Registry::new();
        let dummy = registry.declare("root", "Dummy");
        let converters = Converters::new();
        let mut assembler = Assembler::new(&registry, &converters);
        assembler.process(Event::StartObject { ty: dummy }).unwrap();
        let err = assembler.finish().unwrap_err();
        assert!(matches!(err, AssemblyError::MalformedEventStream(_)));
    }

    #[test]
    fn test_namespace_declarations_are_recorded() {
        let registry = Registry::new();
        let converters = Converters::new();
        let mut assembler = Assembler::new(&registry, &converters);
        assembler
            .process(Event::NamespaceDecl {
                prefix: "x".into(),
                uri: "urn:odml:extensions".into(),
            })
            .unwrap();
        assert_eq!(assembler.namespace("x"), Some("urn:odml:extensions"));
    }
}
