//! Plan execution.
//!
//! Execution walks the plan tree level by level. Asynchronous siblings of a level are awaited
//! together and their results are written back in the order the plan declares them, so the
//! response shape never depends on resolver timing.
//!
//! Field errors bubble up as [`PropagateNull`] until they reach a nullable position, which then
//! becomes `null`. The error itself is recorded once, where it happened.

use std::sync::Arc;

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::Instrument;

use crate::context::Context;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::input::coerce_variables;
use crate::json_ext::ByteString;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::plan::FieldKind;
use crate::plan::FieldList;
use crate::plan::FieldPlan;
use crate::plan::LeafType;
use crate::plan::Plan;
use crate::resolver::ResolveInfo;
use crate::resolver::Resolved;
use crate::value::ResultValue;

/// A field error is being propagated upwards to find a nullable place.
///
/// The error was already recorded where it happened.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PropagateNull;

impl Plan {
    /// Executes the plan against `root`, the value of the root operation type.
    ///
    /// Never fails: errors are reported in the response, next to whatever data could be
    /// completed.
    pub async fn execute(
        &self,
        root: impl Into<Resolved>,
        context: &Context,
        variables: Object,
    ) -> Response {
        let span = tracing::info_span!(
            "execute",
            "otel.kind" = "INTERNAL",
            "graphql.operation.name" = self.operation_name().unwrap_or_default(),
            "graphql.operation.type" = %self.operation_type,
        );
        self.execute_root(root.into(), context.clone(), variables)
            .instrument(span)
            .await
    }

    /// Executes a plan that has no asynchronous resolvers without an async runtime.
    ///
    /// Plans with asynchronous resolvers must go through [`Plan::execute`]; for them this
    /// returns an error response without running any resolver.
    pub fn execute_sync(
        &self,
        root: impl Into<Resolved>,
        context: &Context,
        variables: Object,
    ) -> Response {
        if self.has_async {
            return Response::builder()
                .error(
                    Error::builder()
                        .message(
                            "operation has asynchronous resolvers and must be executed with Plan::execute",
                        )
                        .extension("code", "ASYNC_RESOLVERS_IN_SYNC_EXECUTION")
                        .build(),
                )
                .build();
        }
        futures::executor::block_on(self.execute(root, context, variables))
    }

    async fn execute_root(&self, root: Resolved, context: Context, variables: Object) -> Response {
        let variables = match coerce_variables(&self.variables, &self.schema, variables) {
            Ok(variables) => variables,
            Err(errors) => {
                tracing::debug!(errors = errors.len(), "invalid variables");
                return Response::builder().errors(errors).build();
            }
        };
        let execution = ExecutionContext {
            context,
            variables,
            schema: self.schema.clone(),
            parallel: self.parallel,
            errors: Mutex::new(Vec::new()),
        };
        let data = execute_fields(
            &execution,
            &self.root,
            &root,
            &Path::empty(),
            self.is_mutation(),
        )
        .await
        .ok();

        let errors = execution.errors.into_inner();
        if !errors.is_empty() {
            tracing::debug!(
                errors = errors.len(),
                data_is_null = data.is_none(),
                "execution finished with errors"
            );
        }
        Response::builder().and_data(data).errors(errors).build()
    }
}

/// State shared by every field of one execution.
struct ExecutionContext {
    context: Context,
    variables: Object,
    schema: Arc<Valid<apollo_compiler::Schema>>,
    parallel: bool,
    errors: Mutex<Vec<Error>>,
}

impl ExecutionContext {
    /// Records an error, unless one with the same message was already recorded.
    fn record(&self, error: Error) {
        let mut errors = self.errors.lock();
        if errors.iter().all(|recorded| recorded.message != error.message) {
            errors.push(error);
        }
    }

    fn field_error(&self, message: String, path: Path) -> PropagateNull {
        self.record(Error::builder().message(message).path(path).build());
        PropagateNull
    }
}

/// Stops null propagation at a nullable type.
fn try_nullify(
    ty: &Type,
    result: Result<ResultValue, PropagateNull>,
) -> Result<ResultValue, PropagateNull> {
    match result {
        Ok(value) => Ok(value),
        Err(PropagateNull) if ty.is_non_null() => Err(PropagateNull),
        Err(PropagateNull) => Ok(ResultValue::Null),
    }
}

/// <https://spec.graphql.org/October2021/#ExecuteSelectionSet()>
///
/// `serially` is set for the root fields of a mutation.
fn execute_fields<'a>(
    execution: &'a ExecutionContext,
    fields: &'a FieldList,
    source: &'a Resolved,
    path: &'a Path,
    serially: bool,
) -> BoxFuture<'a, Result<ResultValue, PropagateNull>> {
    async move {
        let active: Vec<&FieldPlan> = fields
            .iter()
            .filter(|field| field.guard.allows(&execution.variables))
            .collect();
        let mut object = IndexMap::with_capacity(active.len());

        if fields.fans_out() && execution.parallel && !serially {
            let results = join_all(active.iter().map(|&field| {
                execute_field(
                    execution,
                    field,
                    source,
                    path.join_key(field.response_key.as_str()),
                )
            }))
            .await;
            for (field, result) in active.iter().zip(results) {
                object.insert(ByteString::from(field.response_key.as_str()), result?);
            }
        } else {
            for field in active {
                let value = execute_field(
                    execution,
                    field,
                    source,
                    path.join_key(field.response_key.as_str()),
                )
                .await?;
                object.insert(ByteString::from(field.response_key.as_str()), value);
            }
        }
        Ok(ResultValue::Object(object))
    }
    .boxed()
}

/// <https://spec.graphql.org/October2021/#ExecuteField()>
fn execute_field<'a>(
    execution: &'a ExecutionContext,
    field: &'a FieldPlan,
    source: &'a Resolved,
    path: Path,
) -> BoxFuture<'a, Result<ResultValue, PropagateNull>> {
    async move {
        let accessor = match &field.kind {
            FieldKind::Typename(Some(type_name)) => {
                return Ok(ResultValue::Scalar(type_name.as_str().into()));
            }
            FieldKind::Typename(None) => {
                let type_name = source
                    .type_name()
                    .unwrap_or_else(|| field.parent_type.as_str());
                return Ok(ResultValue::Scalar(type_name.into()));
            }
            FieldKind::Resolve(accessor) => accessor,
        };

        let arguments = field.arguments.materialize(&execution.variables);
        let info = ResolveInfo {
            source,
            arguments: &arguments,
            context: &execution.context,
            variables: &execution.variables,
            field_name: field.field_name.as_str(),
            parent_type: field.parent_type.as_str(),
            path: &path,
        };
        let resolved = accessor.resolve(&info).await;
        let result = match resolved {
            Ok(resolved) => complete_value(execution, field, &field.ty, resolved, path).await,
            Err(error) => {
                execution.record(
                    Error::builder()
                        .message(error.message)
                        .path(path)
                        .extensions(error.extensions)
                        .build(),
                );
                Err(PropagateNull)
            }
        };
        try_nullify(&field.ty, result)
    }
    .boxed()
}

/// <https://spec.graphql.org/October2021/#CompleteValue()>
///
/// `ty` is the type of the value being completed: the field type, or the item type of one of
/// its lists.
fn complete_value<'a>(
    execution: &'a ExecutionContext,
    field: &'a FieldPlan,
    ty: &'a Type,
    resolved: Resolved,
    path: Path,
) -> BoxFuture<'a, Result<ResultValue, PropagateNull>> {
    async move {
        if resolved.is_null() {
            if ty.is_non_null() {
                return Err(execution.field_error(
                    format!(
                        "Cannot return null for non-nullable field {}.{}.",
                        field.parent_type, field.field_name
                    ),
                    path,
                ));
            }
            return Ok(ResultValue::Null);
        }

        if let Type::List(item_type) | Type::NonNullList(item_type) = ty {
            let items = match resolved {
                Resolved::List(items) => items,
                Resolved::Value(Value::Array(items)) => {
                    items.into_iter().map(Resolved::Value).collect()
                }
                _ => {
                    return Err(execution.field_error(
                        format!(
                            "Expected a list for field {}.{} of type {ty}",
                            field.parent_type, field.field_name
                        ),
                        path,
                    ));
                }
            };
            let mut completed = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let item =
                    complete_value(execution, field, item_type, item, path.join_index(index)).await;
                // On field error, try to nullify that item
                match try_nullify(item_type, item) {
                    Ok(item) => completed.push(item),
                    // If the item is non-null, try to nullify the list
                    Err(PropagateNull) => return try_nullify(ty, Err(PropagateNull)),
                }
            }
            return Ok(ResultValue::List(completed));
        }

        let resolved_to_list = match &resolved {
            Resolved::List(_) => true,
            // Custom scalars may serialize to arrays
            Resolved::Value(Value::Array(_)) => {
                !matches!(field.leaf, Some(LeafType::Custom { .. }))
            }
            _ => false,
        };
        if resolved_to_list {
            return Err(
                execution.field_error(format!("Non-list type {ty} resolved to a list"), path)
            );
        }

        match (&field.leaf, &field.selection) {
            (Some(leaf), _) => {
                let Resolved::Value(value) = resolved else {
                    return Err(execution.field_error(
                        format!("Resolver returned an object, expected {}", ty.inner_named_type()),
                        path,
                    ));
                };
                coerce_leaf(&execution.schema, leaf, value)
                    .map(ResultValue::Scalar)
                    .map_err(|message| execution.field_error(message, path))
            }
            (None, Some(selection)) => {
                if let Resolved::Value(value) = &resolved {
                    if !value.is_object() {
                        return Err(execution.field_error(
                            format!(
                                "Resolver returned a leaf value but expected an object for type {}",
                                ty.inner_named_type()
                            ),
                            path,
                        ));
                    }
                }
                let fields = selection.for_type(resolved.type_name());
                execute_fields(execution, fields, &resolved, &path, false).await
            }
            (None, None) => {
                failfast_error!(
                    field = %field.field_name,
                    parent_type = %field.parent_type,
                    "field plan has neither a leaf type nor a selection"
                );
                Err(execution.field_error(
                    format!(
                        "Internal error: cannot complete field {}.{}",
                        field.parent_type, field.field_name
                    ),
                    path,
                ))
            }
        }
    }
    .boxed()
}

/// Result coercion of leaf values.
///
/// Returns the message of the field error for values the type cannot represent.
#[tracing::instrument(skip_all, level = "trace")]
fn coerce_leaf(
    schema: &Valid<apollo_compiler::Schema>,
    leaf: &LeafType,
    value: Value,
) -> Result<Value, String> {
    let valid = match leaf {
        // https://spec.graphql.org/October2021/#sec-Int.Result-Coercion
        LeafType::Int => match value.as_i64() {
            Some(int) if i32::try_from(int).is_err() => {
                return Err(format!("Resolver returned {value} which overflows Int"));
            }
            Some(_) => true,
            None => false,
        },
        // https://spec.graphql.org/October2021/#sec-Float.Result-Coercion
        LeafType::Float => value.is_number(),
        LeafType::String => value.is_string(),
        LeafType::Boolean => value.is_boolean(),
        // https://spec.graphql.org/October2021/#sec-ID.Result-Coercion
        LeafType::Id => value.is_string() || value.is_i64() || value.is_u64(),
        // https://spec.graphql.org/October2021/#sec-Enums.Result-Coercion
        LeafType::Enum(name) => match schema.types.get(name) {
            Some(ExtendedType::Enum(enum_type)) => value
                .as_str()
                .is_some_and(|value| enum_type.values.contains_key(value)),
            _ => false,
        },
        LeafType::Custom { serializer, .. } => {
            return match serializer {
                Some(serializer) => serializer(&value).map_err(|error| error.message),
                // Custom scalar: accept any JSON value
                None => Ok(value),
            };
        }
    };
    if valid {
        Ok(value)
    } else {
        Err(format!("Resolver returned {value}, expected {}", leaf.name()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::compiler::compile;
    use crate::error::FieldError;
    use crate::schema::Schema;

    const SDL: &str = r#"
        enum Mood { HAPPY SAD }
        scalar Upper
        type Query {
            count: Int
            ratio: Float
            mood: Mood
            name: Upper
            id: ID
            big: Int
            strict: String!
            tags: [String]
            user: User
        }
        type User { name: String }
    "#;

    fn run(schema: &Schema, query: &str, root: Value) -> Value {
        let plan = compile(schema, query, None).unwrap();
        plan.execute_sync(root, &Context::new(), Object::new())
            .into_json()
    }

    #[test]
    fn leaf_coercion() {
        let schema = Schema::parse(SDL).unwrap().serialize_scalar("Upper", |value| {
            value
                .as_str()
                .map(|value| Value::from(value.to_uppercase()))
                .ok_or_else(|| FieldError::new("Upper must be a string"))
        });
        let response = run(
            &schema,
            "{ count ratio mood name id big }",
            json!({
                "count": 3,
                "ratio": 1,
                "mood": "HAPPY",
                "name": "ada",
                "id": 7,
                "big": 3_000_000_000_i64,
            }),
        );
        assert_eq!(
            response,
            json!({
                "data": {
                    "count": 3,
                    "ratio": 1,
                    "mood": "HAPPY",
                    "name": "ADA",
                    "id": 7,
                    "big": null,
                },
                "errors": [{
                    "message": "Resolver returned 3000000000 which overflows Int",
                    "path": ["big"],
                }],
            })
        );
    }

    #[test]
    fn invalid_leaves_are_field_errors() {
        let schema = Schema::parse(SDL).unwrap();
        let response = run(
            &schema,
            "{ mood count }",
            json!({ "mood": "ANGRY", "count": "three" }),
        );
        assert_eq!(
            response,
            json!({
                "data": { "mood": null, "count": null },
                "errors": [
                    { "message": "Resolver returned \"ANGRY\", expected Mood", "path": ["mood"] },
                    { "message": "Resolver returned \"three\", expected Int", "path": ["count"] },
                ],
            })
        );
    }

    #[test]
    fn shape_mismatches() {
        let schema = Schema::parse(SDL).unwrap();
        let response = run(
            &schema,
            "{ tags user { name } }",
            json!({ "tags": "single", "user": 5 }),
        );
        assert_eq!(
            response,
            json!({
                "data": { "tags": null, "user": null },
                "errors": [
                    {
                        "message": "Expected a list for field Query.tags of type [String]",
                        "path": ["tags"],
                    },
                    {
                        "message": "Resolver returned a leaf value but expected an object for type User",
                        "path": ["user"],
                    },
                ],
            })
        );
    }

    #[test]
    fn non_null_root_field_nullifies_data() {
        let schema = Schema::parse(SDL).unwrap();
        let response = run(&schema, "{ count strict }", json!({ "count": 1 }));
        assert_eq!(
            response,
            json!({
                "data": null,
                "errors": [{
                    "message": "Cannot return null for non-nullable field Query.strict.",
                    "path": ["strict"],
                }],
            })
        );
    }

    #[test]
    fn sync_execution_refuses_async_plans() {
        let schema = Schema::parse(SDL)
            .unwrap()
            .resolve_async("Query", "count", |_| async { Ok(Resolved::value(1)) });
        let plan = compile(&schema, "{ count }", None).unwrap();
        let response = plan.execute_sync(Value::Null, &Context::new(), Object::new());
        assert!(response.data.is_none());
        assert_eq!(
            response.errors[0].extensions.get("code"),
            Some(&json!("ASYNC_RESOLVERS_IN_SYNC_EXECUTION"))
        );
    }
}
