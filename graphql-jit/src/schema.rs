//! GraphQL schema, together with the resolvers that back its fields.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use apollo_compiler::Name;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use derivative::Derivative;
use futures::FutureExt;

use crate::error::FieldError;
use crate::error::SchemaError;
use crate::json_ext::Value;
use crate::resolver::Accessor;
use crate::resolver::ResolveInfo;
use crate::resolver::Resolved;
use crate::resolver::ScalarSerializerFn;

/// A GraphQL schema.
///
/// Fields without a registered resolver read the attribute (or JSON key) of the same name on
/// their parent value.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Schema {
    definitions: Arc<Valid<apollo_compiler::Schema>>,
    /// Concrete object types of every interface and union, in definition order.
    possible_types: HashMap<Name, Vec<Name>>,
    #[derivative(Debug = "ignore")]
    resolvers: HashMap<String, HashMap<String, Accessor>>,
    #[derivative(Debug = "ignore")]
    scalar_serializers: HashMap<String, ScalarSerializerFn>,
}

impl Schema {
    pub fn parse(sdl: &str) -> Result<Self, SchemaError> {
        let start = Instant::now();
        let definitions = apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")?;
        tracing::debug!(elapsed = ?start.elapsed(), "parsed schema");
        Ok(Self::new(definitions))
    }

    pub fn new(definitions: Valid<apollo_compiler::Schema>) -> Self {
        let mut possible_types: HashMap<Name, Vec<Name>> = HashMap::new();
        for (name, ty) in &definitions.types {
            if !matches!(ty, ExtendedType::Interface(_) | ExtendedType::Union(_)) {
                continue;
            }
            let objects = definitions
                .types
                .iter()
                .filter(|(_, candidate)| candidate.is_object())
                .filter(|(object_name, _)| definitions.is_subtype(name, object_name))
                .map(|(object_name, _)| object_name.clone())
                .collect();
            possible_types.insert(name.clone(), objects);
        }
        Self {
            definitions: Arc::new(definitions),
            possible_types,
            resolvers: HashMap::new(),
            scalar_serializers: HashMap::new(),
        }
    }

    /// Registers a resolver for `type_name.field_name`.
    pub fn resolve<F>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Result<Resolved, FieldError> + Send + Sync + 'static,
    {
        self.register(type_name, field_name, Accessor::Resolver(Arc::new(resolver)));
        self
    }

    /// Registers an asynchronous resolver for `type_name.field_name`.
    ///
    /// Sibling asynchronous fields are resolved concurrently.
    pub fn resolve_async<F, Fut>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolved, FieldError>> + Send + 'static,
    {
        self.register(
            type_name,
            field_name,
            Accessor::AsyncResolver(Arc::new(move |info: &ResolveInfo<'_>| resolver(info).boxed())),
        );
        self
    }

    /// Registers how values of the custom scalar `scalar_name` are written in responses.
    pub fn serialize_scalar<F>(mut self, scalar_name: &str, serializer: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        match self.definitions.types.get(scalar_name) {
            Some(ty @ ExtendedType::Scalar(_)) if !ty.is_built_in() => {}
            _ => {
                tracing::warn!(scalar_name, "serializer registered for an unknown custom scalar");
            }
        }
        self.scalar_serializers
            .insert(scalar_name.to_string(), Arc::new(serializer));
        self
    }

    fn register(&mut self, type_name: &str, field_name: &str, accessor: Accessor) {
        if self
            .definitions
            .type_field(type_name, field_name)
            .is_err()
        {
            tracing::warn!(
                type_name,
                field_name,
                "resolver registered for a field the schema does not define"
            );
        }
        self.resolvers
            .entry(type_name.to_string())
            .or_default()
            .insert(field_name.to_string(), accessor);
    }

    /// The validated type system definitions.
    pub fn definitions(&self) -> &Valid<apollo_compiler::Schema> {
        &self.definitions
    }

    pub(crate) fn shared_definitions(&self) -> Arc<Valid<apollo_compiler::Schema>> {
        self.definitions.clone()
    }

    /// Concrete object types an interface or union can resolve to.
    pub fn possible_types(&self, abstract_type: &str) -> &[Name] {
        self.possible_types
            .get(abstract_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_abstract(&self, type_name: &str) -> bool {
        self.possible_types.contains_key(type_name)
    }

    /// Returns true when fragments conditioned on `type_condition` apply to `object_type`.
    pub(crate) fn fragment_applies(&self, object_type: &str, type_condition: &str) -> bool {
        object_type == type_condition || self.definitions.is_subtype(type_condition, object_type)
    }

    /// The accessor for `type_name.field_name`.
    ///
    /// A resolver registered on an interface field serves every implementation that does not
    /// register its own.
    pub(crate) fn accessor(&self, type_name: &str, field_name: &Name) -> Accessor {
        if let Some(accessor) = self.registered(type_name, field_name) {
            return accessor.clone();
        }
        if let Some(ExtendedType::Object(object)) = self.definitions.types.get(type_name) {
            for interface in &object.implements_interfaces {
                if let Some(accessor) = self.registered(interface.as_str(), field_name) {
                    return accessor.clone();
                }
            }
        }
        Accessor::Property(field_name.clone())
    }

    fn registered(&self, type_name: &str, field_name: &str) -> Option<&Accessor> {
        self.resolvers
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
    }

    pub(crate) fn scalar_serializer(&self, scalar_name: &str) -> Option<ScalarSerializerFn> {
        self.scalar_serializers.get(scalar_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;

    use super::*;

    const SDL: &str = r#"
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String }
        type Post implements Node { id: ID! title: String }
        type Comment { text: String }
        union SearchResult = User | Post
        type Query { node: Node search: [SearchResult] }
    "#;

    #[test]
    fn possible_types_of_abstract_types() {
        let schema = Schema::parse(SDL).unwrap();
        let names = |abstract_type| {
            schema
                .possible_types(abstract_type)
                .iter()
                .map(|name| name.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names("Node"), vec!["User", "Post"]);
        assert_eq!(names("SearchResult"), vec!["User", "Post"]);
        assert!(names("Comment").is_empty());
        assert!(schema.is_abstract("Node"));
        assert!(!schema.is_abstract("User"));
    }

    #[test]
    fn fragment_application() {
        let schema = Schema::parse(SDL).unwrap();
        assert!(schema.fragment_applies("User", "User"));
        assert!(schema.fragment_applies("User", "Node"));
        assert!(schema.fragment_applies("Post", "SearchResult"));
        assert!(!schema.fragment_applies("Comment", "Node"));
    }

    #[test]
    fn interface_resolver_serves_implementations() {
        let schema = Schema::parse(SDL)
            .unwrap()
            .resolve("Node", "id", |_| Ok(Resolved::value("node-id")))
            .resolve("Post", "id", |_| Ok(Resolved::value("post-id")));
        assert!(matches!(schema.accessor("User", &name!("id")), Accessor::Resolver(_)));
        assert!(matches!(schema.accessor("Post", &name!("id")), Accessor::Resolver(_)));
        assert!(matches!(
            schema.accessor("User", &name!("name")),
            Accessor::Property(name) if name == "name"
        ));
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let error = Schema::parse("type Query { broken: Missing }").unwrap_err();
        assert!(matches!(error, SchemaError::Validate(_)));
    }
}
