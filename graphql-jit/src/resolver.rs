//! The values resolvers produce and the accessors the engine uses to reach them.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use derivative::Derivative;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::FieldError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// A GraphQL object whose fields can be read without a registered resolver.
pub trait ObjectValue: Send + Sync {
    /// Returns the name of the concrete object type this value represents.
    ///
    /// This is called when the schema indicates an abstract (interface or union) type.
    /// Returning `None`, or a name the schema does not list as a possible type, executes
    /// only the selections shared by every possible type.
    fn type_name(&self) -> Option<&str> {
        None
    }

    /// Reads a field of this object. `None` resolves to `null`.
    fn attribute(&self, name: &str) -> Option<Resolved>;
}

/// The value of a resolved field.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum Resolved {
    /// * JSON null represents GraphQL null
    /// * A GraphQL enum value is represented as a JSON string
    /// * JSON objects can stand for GraphQL objects: fields are read by key and a
    ///   `__typename` key discriminates abstract types
    /// * JSON arrays stand for GraphQL lists
    Value(Value),

    /// Expected where the GraphQL type is an object, interface, or union type
    Object(#[derivative(Debug = "ignore")] Arc<dyn ObjectValue>),

    /// Expected for GraphQL list types
    List(Vec<Resolved>),
}

impl Resolved {
    /// Construct a null resolved value
    pub fn null() -> Self {
        Resolved::Value(Value::Null)
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Resolved::Value(value.into())
    }

    pub fn object(object: impl ObjectValue + 'static) -> Self {
        Resolved::Object(Arc::new(object))
    }

    pub fn list(items: impl IntoIterator<Item = Resolved>) -> Self {
        Resolved::List(items.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Value(Value::Null))
    }

    /// The runtime type discriminator, used to dispatch abstract selections.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Resolved::Object(object) => object.type_name(),
            Resolved::Value(Value::Object(object)) => object
                .get("__typename")
                .and_then(|type_name| type_name.as_str()),
            Resolved::Value(_) | Resolved::List(_) => None,
        }
    }

    /// Plain attribute or key lookup, used by fields that have no registered resolver.
    pub fn property(&self, name: &str) -> Resolved {
        match self {
            Resolved::Object(object) => object.attribute(name).unwrap_or_else(Resolved::null),
            Resolved::Value(Value::Object(object)) => object
                .get(name)
                .cloned()
                .map(Resolved::Value)
                .unwrap_or_else(Resolved::null),
            Resolved::Value(_) | Resolved::List(_) => Resolved::null(),
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Resolved::Value(value)
    }
}

impl From<Arc<dyn ObjectValue>> for Resolved {
    fn from(object: Arc<dyn ObjectValue>) -> Self {
        Resolved::Object(object)
    }
}

impl From<Vec<Resolved>> for Resolved {
    fn from(items: Vec<Resolved>) -> Self {
        Resolved::List(items)
    }
}

/// What a resolver gets to know about the field it resolves.
#[non_exhaustive]
pub struct ResolveInfo<'a> {
    /// The parent value the field is read from.
    pub source: &'a Resolved,
    /// Arguments, with variables substituted and defaults applied.
    pub arguments: &'a Object,
    pub context: &'a Context,
    pub variables: &'a Object,
    pub field_name: &'a str,
    pub parent_type: &'a str,
    /// Response path of the field being resolved.
    pub path: &'a Path,
}

impl ResolveInfo<'_> {
    /// Returns a field argument.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

impl fmt::Debug for ResolveInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveInfo")
            .field("arguments", &self.arguments)
            .field("field_name", &self.field_name)
            .field("parent_type", &self.parent_type)
            .field("path", &self.path)
            .finish()
    }
}

pub type ResolverFn = Arc<dyn Fn(&ResolveInfo<'_>) -> Result<Resolved, FieldError> + Send + Sync>;

/// An asynchronous resolver. The returned future may not borrow from the [`ResolveInfo`].
pub type AsyncResolverFn = Arc<
    dyn Fn(&ResolveInfo<'_>) -> BoxFuture<'static, Result<Resolved, FieldError>> + Send + Sync,
>;

/// Serializes the values of a custom scalar for the response.
pub type ScalarSerializerFn = Arc<dyn Fn(&Value) -> Result<Value, FieldError> + Send + Sync>;

/// How a field obtains its raw value from the parent value.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub(crate) enum Accessor {
    Resolver(#[derivative(Debug = "ignore")] ResolverFn),
    AsyncResolver(#[derivative(Debug = "ignore")] AsyncResolverFn),
    Property(Name),
}

impl Accessor {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Accessor::AsyncResolver(_))
    }

    pub(crate) async fn resolve(&self, info: &ResolveInfo<'_>) -> Result<Resolved, FieldError> {
        match self {
            Accessor::Resolver(resolver) => resolver(info),
            Accessor::AsyncResolver(resolver) => resolver(info).await,
            Accessor::Property(name) => Ok(info.source.property(name)),
        }
    }
}
