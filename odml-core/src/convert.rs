//! The conversion engine.
//!
//! Coerces a produced value to the type a member or constructor slot
//! declares. The attempt order is fixed: identity, then the small
//! special-cased literal coercions (string, universal, enumeration),
//! then a registered converter, then failure. Converters are a fallback
//! and may be expensive; identity and the structural cases are cheap
//! and unambiguous.

use crate::error::ConversionError;
use crate::object::Value;
use crate::registry::{Registry, TypeRef};

/// Ambient type-resolution context handed to converters.
pub struct ConvertContext<'a> {
    pub registry: &'a Registry,
}

/// Turns a string literal into an instance of one target type.
pub trait Converter {
    fn convert(
        &self,
        literal: &str,
        ctx: &ConvertContext<'_>,
    ) -> Result<Value, ConversionError>;
}

/// Answers "is there a converter for this target type".
pub trait ConverterProvider {
    fn converter_for(&self, target: TypeRef) -> Option<&dyn Converter>;
}

/// Coerce `value` to `target`, stopping at the first successful route.
pub fn coerce(
    value: Value,
    target: TypeRef,
    registry: &Registry,
    converters: &dyn ConverterProvider,
) -> Result<Value, ConversionError> {
    if satisfies(&value, target) {
        return Ok(value);
    }

    if let Value::String(literal) = &value {
        if let TypeRef::Named(key) = target {
            let descriptor = registry.ty(key);
            if descriptor.is_enum() {
                // Exact, case-sensitive member match; no converter fallback.
                return match descriptor.variants.iter().position(|v| v == literal) {
                    Some(variant) => Ok(Value::Enum { ty: key, variant }),
                    None => Err(ConversionError::UnknownEnumMember {
                        enum_name: descriptor.name.clone(),
                        value: literal.clone(),
                    }),
                };
            }
        }

        if let Some(converter) = converters.converter_for(target) {
            let ctx = ConvertContext { registry };
            // The converter's result is returned verbatim.
            return converter.convert(literal, &ctx);
        }
    }

    Err(ConversionError::NoConverter {
        value: brief(&value),
        target: describe(target, registry),
    })
}

/// Whether the value's runtime type already satisfies the target.
pub fn satisfies(value: &Value, target: TypeRef) -> bool {
    match (value, target) {
        (_, TypeRef::Any) => true,
        (Value::String(_), TypeRef::String) => true,
        (Value::Integer(_), TypeRef::Integer) => true,
        (Value::Float(_), TypeRef::Float) => true,
        (Value::Bool(_), TypeRef::Bool) => true,
        (Value::Object(obj), TypeRef::Named(key)) => obj.ty() == key,
        (Value::Enum { ty, .. }, TypeRef::Named(key)) => *ty == key,
        _ => false,
    }
}

/// Human-readable name of a target type for diagnostics.
pub fn describe(target: TypeRef, registry: &Registry) -> String {
    match target {
        TypeRef::Any => "Any".to_string(),
        TypeRef::String => "String".to_string(),
        TypeRef::Integer => "Integer".to_string(),
        TypeRef::Float => "Float".to_string(),
        TypeRef::Bool => "Bool".to_string(),
        TypeRef::Named(key) => registry.ty(key).name.clone(),
    }
}

fn brief(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

/// A converter backed by a plain function.
pub struct FnConverter(pub fn(&str, &ConvertContext<'_>) -> Result<Value, ConversionError>);

impl Converter for FnConverter {
    fn convert(
        &self,
        literal: &str,
        ctx: &ConvertContext<'_>,
    ) -> Result<Value, ConversionError> {
        (self.0)(literal, ctx)
    }
}

/// The crate's converter registry, keyed by target type.
#[derive(Default)]
pub struct Converters {
    table: std::collections::HashMap<TypeRef, Box<dyn Converter>>,
}

impl Converters {
    /// An empty registry: only identity and the special cases apply.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with stock converters for the primitive targets.
    pub fn with_defaults() -> Self {
        let mut converters = Self::new();
        converters.register(TypeRef::Integer, Box::new(FnConverter(convert_integer)));
        converters.register(TypeRef::Float, Box::new(FnConverter(convert_float)));
        converters.register(TypeRef::Bool, Box::new(FnConverter(convert_bool)));
        converters
    }

    pub fn register(&mut self, target: TypeRef, converter: Box<dyn Converter>) {
        self.table.insert(target, converter);
    }

    pub fn register_fn(
        &mut self,
        target: TypeRef,
        convert: fn(&str, &ConvertContext<'_>) -> Result<Value, ConversionError>,
    ) {
        self.register(target, Box::new(FnConverter(convert)));
    }
}

impl ConverterProvider for Converters {
    fn converter_for(&self, target: TypeRef) -> Option<&dyn Converter> {
        self.table.get(&target).map(|c| c.as_ref())
    }
}

fn convert_integer(literal: &str, _ctx: &ConvertContext<'_>) -> Result<Value, ConversionError> {
    literal
        .trim()
        .parse::<i64>()
        .map(Value::Integer)
        .map_err(|_| ConversionError::NoConverter {
            value: literal.to_string(),
            target: "Integer".to_string(),
        })
}

fn convert_float(literal: &str, _ctx: &ConvertContext<'_>) -> Result<Value, ConversionError> {
    literal
        .trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| ConversionError::NoConverter {
            value: literal.to_string(),
            target: "Float".to_string(),
        })
}

fn convert_bool(literal: &str, _ctx: &ConvertContext<'_>) -> Result<Value, ConversionError> {
    match literal.trim() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        other => Err(ConversionError::NoConverter {
            value: other.to_string(),
            target: "Bool".to_string(),
        }),
    }
}
