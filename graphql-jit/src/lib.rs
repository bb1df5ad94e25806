//! Compiles GraphQL operations into reusable execution plans.
//!
//! An operation is validated and compiled once against a [`Schema`]: fragments are inlined,
//! fields are grouped by response key and `@skip`/`@include` directives become guards. The
//! resulting [`Plan`] is immutable and can be executed any number of times, concurrently,
//! against in-memory data and resolvers.
//!
//! ```ignore
//! let schema = Schema::parse("type Query { hello(name: String = \"world\"): String! }")?
//!     .resolve("Query", "hello", |info| {
//!         let name = info.argument("name").and_then(|name| name.as_str()).unwrap_or_default();
//!         Ok(Resolved::value(format!("Hello {name}")))
//!     });
//! let plan = graphql_jit::compile(&schema, "{ hello }", None)?;
//! let response = plan.execute(Value::Null, &Context::new(), Object::new()).await;
//! ```
//!
//! [`PlanCache`] keeps compiled plans keyed by the hash of the operation text.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

mod argument;
mod cache;
mod compiler;
mod configuration;
mod context;
mod directives;
pub mod error;
mod execution;
pub mod graphql;
mod input;
pub mod json_ext;
mod plan;
mod resolver;
mod schema;
mod value;

pub use cache::CacheStats;
pub use cache::PlanCache;
pub use compiler::compile;
pub use compiler::compile_with_config;
pub use configuration::Cache as CacheConfiguration;
pub use configuration::Configuration;
pub use configuration::Execution as ExecutionConfiguration;
pub use context::BoxError;
pub use context::Context;
pub use error::CompileError;
pub use error::FieldError;
pub use error::QueryValidationError;
pub use error::SchemaError;
pub use json_ext::Object;
pub use json_ext::Path;
pub use json_ext::PathElement;
pub use json_ext::Value;
pub use plan::Plan;
pub use resolver::AsyncResolverFn;
pub use resolver::ObjectValue;
pub use resolver::ResolveInfo;
pub use resolver::Resolved;
pub use resolver::ResolverFn;
pub use resolver::ScalarSerializerFn;
pub use schema::Schema;
pub use value::ResultValue;
