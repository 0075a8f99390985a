//! The event normalizer.
//!
//! Consumes proto events and produces semantic events, resolving names
//! against the registry and applying the three structural rewrites:
//! implicit content property inference, implicit collection synthesis
//! (`GetObject` + `_Items` wrapper), and canonical member ordering.
//!
//! Ordering is resolved by buffering the member blocks of one object
//! and replaying them sorted when the object closes: constructor
//! argument blocks first in source order (they must be complete before
//! the instance can be materialized), then declared members by declared
//! rank, then attached/unknown members in source order. The sort is
//! stable throughout.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::error::{NormalizeError, ParseError};
use crate::event::{Directive, Event, MemberRef};
use crate::proto::{NameKind, ProtoEvent, TagName};
use crate::registry::{Registry, TypeKey};
use crate::span::Span;

/// One buffered member block: everything between a conceptual
/// `StartMember`/`EndMember` pair, wrapper not yet emitted.
struct Block {
    member: MemberRef,
    /// Inner events: values and completed child-object runs.
    events: Vec<Event>,
    /// Whether any child run is an object (drives collection wrapping).
    has_objects: bool,
}

impl Block {
    fn new(member: MemberRef) -> Self {
        Self { member, events: Vec::new(), has_objects: false }
    }
}

/// One open object element whose member blocks are being collected.
struct Scope {
    ty: TypeKey,
    span: Span,
    blocks: Vec<Block>,
    /// Index of the block owned by the currently open member element.
    open_block: Option<usize>,
    /// The element was self-closing; the scope closes once its
    /// attributes have been consumed.
    self_closing: bool,
}

/// The event normalizer: a lazy iterator of semantic events over a
/// proto event sequence.
pub struct Normalizer<'a, I> {
    protos: I,
    registry: &'a Registry,
    prefixes: HashMap<String, String>,
    scopes: Vec<Scope>,
    out: VecDeque<Event>,
    done: bool,
}

impl<'a, I> Normalizer<'a, I>
where
    I: Iterator<Item = Result<ProtoEvent, ParseError>>,
{
    pub fn new(protos: I, registry: &'a Registry) -> Self {
        Self {
            protos,
            registry,
            prefixes: HashMap::new(),
            scopes: Vec::new(),
            out: VecDeque::new(),
            done: false,
        }
    }

    fn resolve_prefix(&self, prefix: Option<&str>, span: Span) -> Result<String, NormalizeError> {
        let key = prefix.unwrap_or("");
        match self.prefixes.get(key) {
            Some(uri) => Ok(uri.clone()),
            // An undeclared default prefix maps to the empty namespace;
            // an undeclared named prefix is an error.
            None if key.is_empty() => Ok(String::new()),
            None => Err(NormalizeError::UnknownPrefix {
                prefix: key.to_string(),
                span,
            }),
        }
    }

    fn resolve_type(&self, name: &TagName, local: &str, span: Span) -> Result<TypeKey, NormalizeError> {
        let uri = self.resolve_prefix(name.prefix.as_deref(), span)?;
        self.registry
            .resolve(&uri, local)
            .ok_or_else(|| NormalizeError::UnknownTypeName {
                namespace: uri,
                name: local.to_string(),
                span,
            })
    }

    /// Resolve a member reference for the enclosing type `scope_ty`.
    fn resolve_member(
        &self,
        scope_ty: TypeKey,
        name: &TagName,
        span: Span,
    ) -> Result<MemberRef, NormalizeError> {
        match name.kind() {
            NameKind::Object(local) => match self.registry.resolve_member(scope_ty, local) {
                Some(member) => Ok(MemberRef::Declared { ty: scope_ty, member }),
                None if self.registry.ty(scope_ty).dynamic => {
                    Ok(MemberRef::Unknown(local.to_string()))
                }
                None => Err(NormalizeError::UnknownMemberName {
                    type_name: self.registry.ty(scope_ty).name.clone(),
                    member: local.to_string(),
                    span,
                }),
            },
            NameKind::Property { owner, member } => {
                let owner_ty = self.resolve_type(name, owner, span)?;
                match self.registry.resolve_member(owner_ty, member) {
                    Some(key) if owner_ty == scope_ty => {
                        Ok(MemberRef::Declared { ty: owner_ty, member: key })
                    }
                    Some(key) => Ok(MemberRef::Attached { owner: owner_ty, member: key }),
                    None if owner_ty == scope_ty && self.registry.ty(scope_ty).dynamic => {
                        Ok(MemberRef::Unknown(member.to_string()))
                    }
                    None => Err(NormalizeError::UnknownMemberName {
                        type_name: self.registry.ty(owner_ty).name.clone(),
                        member: member.to_string(),
                        span,
                    }),
                }
            }
            NameKind::Directive(directive) => Directive::lookup(directive)
                .map(MemberRef::Directive)
                .ok_or_else(|| NormalizeError::UnknownDirective {
                    name: name.local.clone(),
                    span,
                }),
        }
    }

    /// Find or start the block for `member` on the current scope.
    /// Repeated references to the same member share one block, which is
    /// how explicit collection elements and bare children merge.
    fn block_index(&mut self, member: MemberRef) -> usize {
        let scope = self.scopes.last_mut().expect("scope required");
        match scope.blocks.iter().position(|b| b.member == member) {
            Some(index) => index,
            None => {
                scope.blocks.push(Block::new(member));
                scope.blocks.len() - 1
            }
        }
    }

    /// Close a pending self-closing scope before structural progress.
    fn flush_self_closing(&mut self) -> Result<(), NormalizeError> {
        if self.scopes.last().is_some_and(|s| s.self_closing) {
            self.close_scope()?;
        }
        Ok(())
    }

    fn handle(&mut self, proto: ProtoEvent) -> Result<(), NormalizeError> {
        match proto {
            ProtoEvent::NamespaceDecl { prefix, uri, span: _ } => {
                self.flush_self_closing()?;
                // The prefix table is process-scoped: declarations are
                // never popped.
                self.prefixes.insert(prefix.clone(), uri.clone());
                // Only document-level declarations surface as events;
                // nested ones still update the table above.
                if self.scopes.is_empty() {
                    self.out.push_back(Event::NamespaceDecl { prefix, uri });
                }
                Ok(())
            }

            ProtoEvent::ElementOpen { name, empty, span } => {
                self.flush_self_closing()?;
                if name.is_member() {
                    self.open_member_element(&name, empty, span)
                } else {
                    self.open_object_element(&name, empty, span)
                }
            }

            ProtoEvent::Attribute { name, value, span } => {
                let scope_ty = match self.scopes.last() {
                    Some(scope) => scope.ty,
                    None => {
                        return Err(NormalizeError::MisplacedMember {
                            name: name.to_string(),
                            span,
                        })
                    }
                };
                let member = self.resolve_member(scope_ty, &name, span)?;
                let index = self.block_index(member);
                let scope = self.scopes.last_mut().expect("scope required");
                scope.blocks[index].events.push(Event::Value { literal: value });
                Ok(())
            }

            ProtoEvent::Text { value, span: _ } => {
                self.flush_self_closing()?;
                if value.trim().is_empty() {
                    return Ok(());
                }
                let Some(scope) = self.scopes.last() else {
                    // Stray text outside the root element.
                    return Ok(());
                };
                if let Some(index) = scope.open_block {
                    let scope = self.scopes.last_mut().expect("scope required");
                    scope.blocks[index].events.push(Event::Value { literal: value });
                    return Ok(());
                }
                // Bare inline text: route to the content member, or to
                // the initialization directive when none is declared.
                let member = match self.registry.content_member(scope.ty) {
                    Some(key) => MemberRef::Declared { ty: scope.ty, member: key },
                    None => MemberRef::Directive(Directive::Initialization),
                };
                let index = self.block_index(member);
                let scope = self.scopes.last_mut().expect("scope required");
                scope.blocks[index].events.push(Event::Value { literal: value });
                Ok(())
            }

            ProtoEvent::ElementClose { span: _ } => {
                self.flush_self_closing()?;
                let closing_member = self
                    .scopes
                    .last()
                    .is_some_and(|scope| scope.open_block.is_some());
                if closing_member {
                    let scope = self.scopes.last_mut().expect("scope required");
                    scope.open_block = None;
                    Ok(())
                } else {
                    self.close_scope()
                }
            }
        }
    }

    fn open_object_element(
        &mut self,
        name: &TagName,
        empty: bool,
        span: Span,
    ) -> Result<(), NormalizeError> {
        let NameKind::Object(local) = name.kind() else {
            unreachable!("member elements are routed to open_member_element");
        };
        let ty = self.resolve_type(name, local, span)?;
        self.scopes.push(Scope {
            ty,
            span,
            blocks: Vec::new(),
            open_block: None,
            self_closing: empty,
        });
        Ok(())
    }

    fn open_member_element(
        &mut self,
        name: &TagName,
        empty: bool,
        span: Span,
    ) -> Result<(), NormalizeError> {
        let scope_ty = match self.scopes.last() {
            Some(scope) => scope.ty,
            None => {
                return Err(NormalizeError::MisplacedMember {
                    name: name.to_string(),
                    span,
                })
            }
        };
        let member = self.resolve_member(scope_ty, name, span)?;
        let index = self.block_index(member);
        if !empty {
            let scope = self.scopes.last_mut().expect("scope required");
            scope.open_block = Some(index);
        }
        Ok(())
    }

    /// Close the innermost object scope: sort its member blocks, emit
    /// wrappers, and deliver the flattened run to the parent (or to the
    /// output queue for the root).
    fn close_scope(&mut self) -> Result<(), NormalizeError> {
        let scope = self.scopes.pop().expect("scope required");
        trace!(blocks = scope.blocks.len(), "object scope closed");

        let mut ordered: Vec<(usize, Block)> = scope.blocks.into_iter().enumerate().collect();
        ordered.sort_by_key(|(source_idx, block)| block_key(block, *source_idx));

        let mut events = Vec::new();
        events.push(Event::StartObject { ty: scope.ty });
        for (_, block) in ordered {
            self.flatten_block(&mut events, block);
        }
        events.push(Event::EndObject);

        self.deliver(events, scope.span)
    }

    /// Emit one member block, synthesizing the collection wrapper when
    /// the member is collection-valued and received object children.
    fn flatten_block(&self, out: &mut Vec<Event>, block: Block) {
        let wrap = block.has_objects && block.member.is_collection(self.registry);
        out.push(Event::StartMember { member: block.member });
        if wrap {
            out.push(Event::GetObject);
            out.push(Event::StartMember { member: MemberRef::Directive(Directive::Items) });
            out.extend(block.events);
            out.push(Event::EndMember);
            out.push(Event::EndObject);
        } else {
            out.extend(block.events);
        }
        out.push(Event::EndMember);
    }

    /// Hand a completed object run to its parent: the open member
    /// element if one exists, otherwise the content member.
    fn deliver(&mut self, events: Vec<Event>, span: Span) -> Result<(), NormalizeError> {
        let (parent_ty, open_block) = match self.scopes.last() {
            Some(parent) => (parent.ty, parent.open_block),
            None => {
                self.out.extend(events);
                return Ok(());
            }
        };

        let index = match open_block {
            Some(index) => index,
            None => match self.registry.content_member(parent_ty) {
                Some(key) => {
                    let member = MemberRef::Declared { ty: parent_ty, member: key };
                    self.block_index(member)
                }
                None => {
                    return Err(NormalizeError::NoContentMember {
                        type_name: self.registry.ty(parent_ty).name.clone(),
                        span,
                    })
                }
            },
        };

        let registry = self.registry;
        let parent = self.scopes.last_mut().expect("scope required");
        let block = &mut parent.blocks[index];
        if block.has_objects && !block.member.is_collection(registry) {
            return Err(NormalizeError::TooManyChildren {
                member: block.member.slot_name(registry),
                span,
            });
        }
        block.events.extend(events);
        block.has_objects = true;
        Ok(())
    }
}

/// Sort key for member blocks: constructor arguments first (source
/// order), declared members by declared rank, everything else after in
/// source order. `sort_by_key` is stable, so equal keys keep source
/// order.
fn block_key(block: &Block, source_idx: usize) -> (u8, usize, usize) {
    match &block.member {
        MemberRef::Directive(Directive::Arguments) => (0, 0, source_idx),
        MemberRef::Declared { member, .. } => (1, member.rank(), source_idx),
        _ => (2, 0, source_idx),
    }
}

impl<I> Iterator for Normalizer<'_, I>
where
    I: Iterator<Item = Result<ProtoEvent, ParseError>>,
{
    type Item = Result<Event, NormalizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.out.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.protos.next() {
                None => {
                    self.done = true;
                    if let Err(err) = self.flush_self_closing() {
                        return Some(Err(err));
                    }
                }
                Some(Err(parse)) => {
                    self.done = true;
                    return Some(Err(parse.into()));
                }
                Some(Ok(proto)) => {
                    if let Err(err) = self.handle(proto) {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}
