//! End-to-end loader tests: markup text in, object graph out.

use pretty_assertions::assert_eq;

use odml_core::{
    AssemblyError, Converters, LoadError, Loader, Object, ProvideContext, Registry, TypeRef,
    Value, Wiring,
};

// =============================================================================
// Test Helpers
// =============================================================================

fn provide_reference(instance: &Object, ctx: &ProvideContext<'_>) -> Result<Value, AssemblyError> {
    let path = instance.get("Path").and_then(Value::as_str).unwrap_or_default();
    // Providers see the member they are being assigned to.
    Ok(Value::String(format!("{}<-{path}", ctx.member)))
}

fn registry() -> Registry {
    let mut registry = Registry::new();

    let item_collection = registry.declare("root", "ItemCollection");
    registry.define(item_collection).as_collection();

    let item = registry.declare("root", "Item");
    registry.define(item).member("Title", TypeRef::String);

    let visibility = registry.declare("root", "Visibility");
    registry.define(visibility).variants(&["Visible", "Hidden", "Collapsed"]);

    let child = registry.declare("root", "Child");
    registry
        .define(child)
        .content_member("Content", TypeRef::Named(item));

    let reference = registry.declare("root", "Reference");
    registry
        .define(reference)
        .member("Path", TypeRef::String)
        .ctor_params(&["Path"])
        .provider(provide_reference);

    let dummy = registry.declare("root", "Dummy");
    registry
        .define(dummy)
        .member("SampleProperty", TypeRef::String)
        .member("AnotherProperty", TypeRef::String)
        .member("Count", TypeRef::Integer)
        .member("Visibility", TypeRef::Named(visibility))
        .content_collection("Items", TypeRef::Named(item_collection))
        .member("Child", TypeRef::Named(child));

    let setter = registry.declare("root", "Setter");
    registry
        .define(setter)
        .member("Property", TypeRef::String)
        .member("Value", TypeRef::Any);

    registry.declare("root", "Label");

    let sealed = registry.declare("root", "Sealed");
    registry.define(sealed).not_constructible();

    let container = registry.declare("root", "Container");
    registry.define(container).member("Property", TypeRef::String);

    registry
}

fn load(source: &str) -> Result<Object, LoadError> {
    let registry = registry();
    let converters = Converters::with_defaults();
    let loader = Loader::new(Wiring { registry: &registry, converters: &converters });
    loader.load(source)
}

fn item_titles(object: &Object) -> Vec<String> {
    object
        .get("Items")
        .and_then(Value::as_object)
        .map(|items| {
            items
                .items()
                .iter()
                .filter_map(|item| {
                    item.as_object()
                        .and_then(|o| o.get("Title"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// Happy paths
// =============================================================================

#[test]
fn dummy_with_string_property_attribute() {
    let result = load(r#"<Dummy xmlns="root" SampleProperty="Property!"/>"#).unwrap();
    assert_eq!(
        result.get("SampleProperty").and_then(Value::as_str),
        Some("Property!")
    );
}

#[test]
fn three_bare_items_fill_the_content_collection_in_source_order() {
    let result = load(
        r#"<Dummy xmlns="root"><Item Title="1"/><Item Title="2"/><Item Title="3"/></Dummy>"#,
    )
    .unwrap();
    assert_eq!(item_titles(&result), vec!["1", "2", "3"]);
}

#[test]
fn implicit_and_explicit_collection_forms_assemble_identically() {
    let bare = load(
        r#"<Dummy xmlns="root"><Item Title="a"/><Item Title="b"/><Item Title="c"/></Dummy>"#,
    )
    .unwrap();
    let explicit = load(
        r#"<Dummy xmlns="root"><Dummy.Items><Item Title="a"/><Item Title="b"/><Item Title="c"/></Dummy.Items></Dummy>"#,
    )
    .unwrap();
    assert_eq!(bare, explicit);
}

#[test]
fn nested_child_through_property_element() {
    let result = load(
        r#"<Dummy xmlns="root"><Dummy.Child><Child><Item Title="deep"/></Child></Dummy.Child></Dummy>"#,
    )
    .unwrap();
    let child = result.get("Child").and_then(Value::as_object).unwrap();
    let content = child.get("Content").and_then(Value::as_object).unwrap();
    assert_eq!(content.get("Title").and_then(Value::as_str), Some("deep"));
}

#[test]
fn source_member_order_does_not_affect_the_assembled_object() {
    let forwards = load(
        r#"<Setter xmlns="root"><Setter.Property>Width</Setter.Property><Setter.Value>10</Setter.Value></Setter>"#,
    )
    .unwrap();
    let backwards = load(
        r#"<Setter xmlns="root"><Setter.Value>10</Setter.Value><Setter.Property>Width</Setter.Property></Setter>"#,
    )
    .unwrap();
    assert_eq!(forwards, backwards);
}

#[test]
fn attribute_literals_coerce_to_declared_types() {
    let result = load(r#"<Dummy xmlns="root" Count="42" Visibility="Collapsed"/>"#).unwrap();
    assert_eq!(result.get("Count"), Some(&Value::Integer(42)));
    assert!(matches!(
        result.get("Visibility"),
        Some(Value::Enum { variant: 2, .. })
    ));
}

#[test]
fn markup_extension_provides_the_member_value() {
    let result = load(
        r#"<Dummy xmlns="root"><Dummy.SampleProperty><Reference><_Arguments>Some.Path</_Arguments></Reference></Dummy.SampleProperty></Dummy>"#,
    )
    .unwrap();
    assert_eq!(
        result.get("SampleProperty").and_then(Value::as_str),
        Some("SampleProperty<-Some.Path")
    );
}

#[test]
fn attached_property_is_stored_under_its_qualified_name() {
    let result = load(r#"<Dummy xmlns="root" Container.Property="Value"/>"#).unwrap();
    assert_eq!(
        result.get("Container.Property").and_then(Value::as_str),
        Some("Value")
    );
}

#[test]
fn bare_text_initializes_a_type_without_content_member() {
    let result = load(r#"<Label xmlns="root">Hello</Label>"#).unwrap();
    assert_eq!(
        result.get("_Initialization").and_then(Value::as_str),
        Some("Hello")
    );
}

#[test]
fn prefixed_namespaces_resolve_end_to_end() {
    let result = load(r#"<r:Dummy xmlns:r="root" SampleProperty="x"/>"#).unwrap();
    assert_eq!(result.get("SampleProperty").and_then(Value::as_str), Some("x"));
}

// =============================================================================
// Failure surfaces
// =============================================================================

#[test]
fn malformed_markup_fails_with_a_parse_error() {
    let err = load(r#"<Dummy xmlns="root">"#).unwrap_err();
    assert!(matches!(err, LoadError::Parse(_)), "{err:?}");
}

#[test]
fn unknown_type_fails_with_a_normalize_error() {
    let err = load(r#"<Nope xmlns="root"/>"#).unwrap_err();
    assert!(matches!(err, LoadError::Normalize(_)), "{err:?}");
}

#[test]
fn unknown_enum_member_fails_with_a_conversion_error() {
    let err = load(r#"<Dummy xmlns="root" Visibility="Translucent"/>"#).unwrap_err();
    assert!(matches!(err, LoadError::Conversion(_)), "{err:?}");
}

#[test]
fn non_constructible_root_fails_with_an_assembly_error() {
    let err = load(r#"<Sealed xmlns="root"/>"#).unwrap_err();
    assert!(matches!(err, LoadError::Assembly(AssemblyError::NotConstructible { .. })), "{err:?}");
}

#[test]
fn each_load_is_independent() {
    // Same loader wiring, two loads: no state leaks between runs.
    let registry = registry();
    let converters = Converters::with_defaults();
    let loader = Loader::new(Wiring { registry: &registry, converters: &converters });

    let first = loader
        .load(r#"<Dummy xmlns="root"><Item Title="only"/></Dummy>"#)
        .unwrap();
    let second = loader.load(r#"<Dummy xmlns="root"/>"#).unwrap();

    assert_eq!(item_titles(&first), vec!["only"]);
    assert_eq!(item_titles(&second), Vec::<String>::new());
}
