//! Semantic events - the normalizer's output and the assembler's input.
//!
//! A closed set of seven cases with a strict nesting invariant: every
//! `StartObject` is matched by exactly one `EndObject` and every
//! `StartMember` by exactly one `EndMember`. The assembler matches
//! exhaustively over this enum, so the whole transition table is
//! compiler-checked.

use phf::phf_map;

use crate::registry::{MemberKey, Registry, TypeKey, TypeRef};

/// Directive members: synthetic or framework-owned member slots that no
/// type declares. Spelled with a leading underscore in markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Synthetic wrapper for the repeated children of a collection.
    Items,
    /// Marks the constructor-argument list of the enclosing object.
    Arguments,
    /// Carries the initialization text of a text-constructed object.
    Initialization,
}

static DIRECTIVES: phf::Map<&'static str, Directive> = phf_map! {
    "Items" => Directive::Items,
    "Arguments" => Directive::Arguments,
    "Initialization" => Directive::Initialization,
};

impl Directive {
    /// Look up a directive by its markup name (without the underscore).
    pub fn lookup(name: &str) -> Option<Directive> {
        DIRECTIVES.get(name).copied()
    }

    /// The markup spelling, underscore included.
    pub fn name(self) -> &'static str {
        match self {
            Directive::Items => "_Items",
            Directive::Arguments => "_Arguments",
            Directive::Initialization => "_Initialization",
        }
    }
}

/// A resolved member reference carried by `StartMember`.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRef {
    /// A member declared by the owning type itself.
    Declared { ty: TypeKey, member: MemberKey },
    /// An attached member: declared by `owner`, set on some other type.
    Attached { owner: TypeKey, member: MemberKey },
    Directive(Directive),
    /// A member of a dynamic type, carried by name only.
    Unknown(String),
}

impl MemberRef {
    /// The name under which the member is stored on an instance.
    /// Attached members use their qualified `Owner.Member` spelling.
    pub fn slot_name(&self, registry: &Registry) -> String {
        match self {
            MemberRef::Declared { ty, member } => registry.member(*ty, *member).name.clone(),
            MemberRef::Attached { owner, member } => format!(
                "{}.{}",
                registry.ty(*owner).name,
                registry.member(*owner, *member).name
            ),
            MemberRef::Directive(directive) => directive.name().to_string(),
            MemberRef::Unknown(name) => name.clone(),
        }
    }

    /// The coercion target for values supplied to this member.
    pub fn declared_ty(&self, registry: &Registry) -> TypeRef {
        match self {
            MemberRef::Declared { ty, member } => registry.member(*ty, *member).ty,
            MemberRef::Attached { owner, member } => registry.member(*owner, *member).ty,
            MemberRef::Directive(Directive::Initialization) => TypeRef::String,
            MemberRef::Directive(_) => TypeRef::Any,
            MemberRef::Unknown(_) => TypeRef::Any,
        }
    }

    /// Whether children accumulate into this member rather than
    /// replace its value.
    pub fn is_collection(&self, registry: &Registry) -> bool {
        match self {
            MemberRef::Declared { ty, member } => registry.member(*ty, *member).collection,
            MemberRef::Attached { owner, member } => registry.member(*owner, *member).collection,
            MemberRef::Directive(_) | MemberRef::Unknown(_) => false,
        }
    }
}

/// A type/member-resolved event consumed by the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    NamespaceDecl { prefix: String, uri: String },
    StartObject { ty: TypeKey },
    EndObject,
    StartMember { member: MemberRef },
    EndMember,
    /// Reuse the existing collection instance held by the current
    /// member rather than creating a new value.
    GetObject,
    Value { literal: String },
}

impl Event {
    /// Check if this event opens a scope (has a matching end event).
    pub fn is_structure_start(&self) -> bool {
        matches!(
            self,
            Event::StartObject { .. } | Event::StartMember { .. } | Event::GetObject
        )
    }

    /// Check if this event closes a scope.
    pub fn is_structure_end(&self) -> bool {
        matches!(self, Event::EndObject | Event::EndMember)
    }
}
