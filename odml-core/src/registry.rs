//! The static type/member registry.
//!
//! Types are stored in an index-based arena: `TypeKey` and `MemberKey`
//! are small copy indices, so descriptors can reference each other
//! (including cyclically) without pointer churn. The registry resolves
//! namespace-qualified names, answers member/content-member queries, and
//! materializes instances from ordered constructor arguments.

use std::collections::HashMap;

use crate::error::AssemblyError;
use crate::object::{Object, Value};

/// Index into the registry's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey(u32);

impl TypeKey {
    pub(crate) fn from_index(index: usize) -> Self {
        TypeKey(index as u32)
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a member within its declaring type. The index order is the
/// type's declared member order, so it doubles as the sorting rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey(u32);

impl MemberKey {
    #[inline]
    pub fn rank(self) -> usize {
        self.0 as usize
    }
}

/// The declared type of a member or constructor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// The universal type: accepts any value unchanged.
    Any,
    String,
    Integer,
    Float,
    Bool,
    /// A registry type (object, collection, or enumeration).
    Named(TypeKey),
}

/// A declared property of a type.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    pub name: String,
    pub ty: TypeRef,
    /// Whether the member holds a collection that children accumulate
    /// into rather than replace.
    pub collection: bool,
}

/// Resolution context handed to a deferred-value provider.
pub struct ProvideContext<'a> {
    /// The object requesting the value.
    pub target: &'a Object,
    /// The member the value is destined for.
    pub member: &'a str,
    pub registry: &'a Registry,
}

/// Hook invoked for deferred-value-provider types once the provider
/// instance is fully populated. The returned value is associated in
/// place of the provider instance.
pub type ProvideFn = fn(&Object, &ProvideContext<'_>) -> Result<Value, AssemblyError>;

/// A constructible type known to the registry.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub namespace: String,
    pub constructible: bool,
    /// Whether instances behave as collections (support an add operation).
    pub collection: bool,
    /// Whether unknown member names are accepted rather than rejected.
    pub dynamic: bool,
    /// Non-empty for enumerations; members are matched case-sensitively.
    pub variants: Vec<String>,
    members: Vec<MemberDescriptor>,
    content_member: Option<MemberKey>,
    /// Ordered constructor parameter names.
    ctor_params: Vec<String>,
    provider: Option<ProvideFn>,
}

impl TypeDescriptor {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            constructible: true,
            collection: false,
            dynamic: false,
            variants: Vec::new(),
            members: Vec::new(),
            content_member: None,
            ctor_params: Vec::new(),
            provider: None,
        }
    }

    #[inline]
    pub fn is_enum(&self) -> bool {
        !self.variants.is_empty()
    }

    #[inline]
    pub fn provider(&self) -> Option<ProvideFn> {
        self.provider
    }

    #[inline]
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    #[inline]
    pub fn ctor_params(&self) -> &[String] {
        &self.ctor_params
    }
}

/// The type registry, passed as explicit context into the normalizer
/// and assembler (never a process-wide global).
#[derive(Debug, Default)]
pub struct Registry {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<(String, String), TypeKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty type and return its key. Use [`Registry::define`]
    /// to add members; the two-step shape allows self-referential types.
    pub fn declare(&mut self, namespace: &str, name: &str) -> TypeKey {
        let key = TypeKey::from_index(self.types.len());
        self.types.push(TypeDescriptor::new(namespace, name));
        self.by_name
            .insert((namespace.to_string(), name.to_string()), key);
        key
    }

    /// Open a declaration builder for an already-declared type.
    pub fn define(&mut self, key: TypeKey) -> TypeBuilder<'_> {
        TypeBuilder { registry: self, key }
    }

    /// Resolve a namespace-qualified type name.
    pub fn resolve(&self, namespace: &str, name: &str) -> Option<TypeKey> {
        self.by_name
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    #[inline]
    pub fn ty(&self, key: TypeKey) -> &TypeDescriptor {
        &self.types[key.index()]
    }

    pub fn resolve_member(&self, ty: TypeKey, name: &str) -> Option<MemberKey> {
        self.ty(ty)
            .members
            .iter()
            .position(|m| m.name == name)
            .map(|i| MemberKey(i as u32))
    }

    pub fn content_member(&self, ty: TypeKey) -> Option<MemberKey> {
        self.ty(ty).content_member
    }

    #[inline]
    pub fn member(&self, ty: TypeKey, member: MemberKey) -> &MemberDescriptor {
        &self.ty(ty).members[member.0 as usize]
    }

    /// The declared type of a constructor slot, by position. Slots whose
    /// parameter name matches a declared member borrow that member's
    /// type; anything else coerces as the universal type.
    pub fn ctor_slot_ty(&self, ty: TypeKey, slot: usize) -> TypeRef {
        let descriptor = self.ty(ty);
        descriptor
            .ctor_params
            .get(slot)
            .and_then(|param| {
                descriptor.members.iter().find(|m| m.name == *param)
            })
            .map(|m| m.ty)
            .unwrap_or(TypeRef::Any)
    }

    /// Materialize an instance from ordered constructor arguments.
    ///
    /// Collection-valued members start out as empty collections, so
    /// `GetObject` always finds an instance to reuse.
    pub fn instantiate(
        &self,
        ty: TypeKey,
        args: Vec<Value>,
    ) -> Result<Object, AssemblyError> {
        let descriptor = self.ty(ty);
        if !descriptor.constructible {
            return Err(AssemblyError::NotConstructible {
                type_name: descriptor.name.clone(),
                reason: if descriptor.is_enum() {
                    "enumerations are produced by conversion".to_string()
                } else {
                    "type is declared non-constructible".to_string()
                },
            });
        }
        if !args.is_empty() && args.len() != descriptor.ctor_params.len() {
            return Err(AssemblyError::NotConstructible {
                type_name: descriptor.name.clone(),
                reason: format!(
                    "constructor takes {} argument(s), got {}",
                    descriptor.ctor_params.len(),
                    args.len()
                ),
            });
        }

        let mut instance = Object::new(ty);
        for (param, arg) in descriptor.ctor_params.iter().zip(args) {
            instance.set(param.clone(), arg);
        }
        for member in &descriptor.members {
            if member.collection && instance.get(&member.name).is_none() {
                if let TypeRef::Named(collection_ty) = member.ty {
                    instance.set(member.name.clone(), Value::Object(Object::new(collection_ty)));
                }
            }
        }
        Ok(instance)
    }
}

/// Chained declaration of a type's shape.
pub struct TypeBuilder<'r> {
    registry: &'r mut Registry,
    key: TypeKey,
}

impl TypeBuilder<'_> {
    fn descriptor(&mut self) -> &mut TypeDescriptor {
        &mut self.registry.types[self.key.index()]
    }

    /// Declare a member. Declaration order is the canonical member order.
    pub fn member(mut self, name: &str, ty: TypeRef) -> Self {
        self.descriptor().members.push(MemberDescriptor {
            name: name.to_string(),
            ty,
            collection: false,
        });
        self
    }

    /// Declare a collection-valued member.
    pub fn collection_member(mut self, name: &str, ty: TypeRef) -> Self {
        self.descriptor().members.push(MemberDescriptor {
            name: name.to_string(),
            ty,
            collection: true,
        });
        self
    }

    /// Declare a member and mark it as the implicit content member.
    pub fn content_member(mut self, name: &str, ty: TypeRef) -> Self {
        let rank = self.descriptor().members.len() as u32;
        self.descriptor().content_member = Some(MemberKey(rank));
        self.member(name, ty)
    }

    /// Declare a collection-valued content member.
    pub fn content_collection(mut self, name: &str, ty: TypeRef) -> Self {
        let rank = self.descriptor().members.len() as u32;
        self.descriptor().content_member = Some(MemberKey(rank));
        self.collection_member(name, ty)
    }

    /// Declare the ordered constructor parameter names.
    pub fn ctor_params(mut self, names: &[&str]) -> Self {
        self.descriptor().ctor_params = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Instances behave as collections (children accumulate as items).
    pub fn as_collection(mut self) -> Self {
        self.descriptor().collection = true;
        self
    }

    /// Unknown member names are accepted instead of rejected.
    pub fn dynamic(mut self) -> Self {
        self.descriptor().dynamic = true;
        self
    }

    pub fn not_constructible(mut self) -> Self {
        self.descriptor().constructible = false;
        self
    }

    /// Declare an enumeration by its variant names.
    pub fn variants(mut self, names: &[&str]) -> Self {
        self.descriptor().variants = names.iter().map(|n| n.to_string()).collect();
        self.descriptor().constructible = false;
        self
    }

    /// Mark the type as a deferred-value provider.
    pub fn provider(mut self, provide: ProvideFn) -> Self {
        self.descriptor().provider = Some(provide);
        self
    }

    pub fn key(self) -> TypeKey {
        self.key
    }
}
