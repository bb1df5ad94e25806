//! Turns a validated operation into a [`Plan`].
//!
//! Fragments are inlined, fields are grouped by response key and selections on interfaces and
//! unions are partitioned per possible type, so execution never looks at the document again.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable;
use apollo_compiler::executable::OperationType;
use apollo_compiler::executable::Selection;
use apollo_compiler::name;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;

use crate::argument::ArgumentsPlan;
use crate::argument::literal_to_json;
use crate::configuration::Execution;
use crate::directives::DirectiveGuard;
use crate::directives::IncludeSkip;
use crate::error::CompileError;
use crate::error::QueryValidationError;
use crate::plan::FieldKind;
use crate::plan::FieldList;
use crate::plan::FieldPlan;
use crate::plan::LeafType;
use crate::plan::Plan;
use crate::plan::SelectionPlan;
use crate::plan::VariablePlan;
use crate::schema::Schema;

/// Validates `query` against `schema` and compiles one of its operations.
///
/// `operation_name` selects the operation; without it the first operation of the document is
/// compiled.
pub fn compile(
    schema: &Schema,
    query: &str,
    operation_name: Option<&str>,
) -> Result<Plan, CompileError> {
    compile_with_config(schema, query, operation_name, &Execution::default())
}

/// Like [`compile`], with explicit execution options.
pub fn compile_with_config(
    schema: &Schema,
    query: &str,
    operation_name: Option<&str>,
    config: &Execution,
) -> Result<Plan, CompileError> {
    let span = tracing::info_span!(
        "compile",
        "otel.kind" = "INTERNAL",
        "graphql.operation.name" = operation_name.unwrap_or_default(),
    );
    let _guard = span.enter();
    let start = Instant::now();

    let document =
        ExecutableDocument::parse_and_validate(schema.definitions(), query, "query.graphql")
            .map_err(QueryValidationError::from)?;
    let plan = PlanCompiler {
        schema,
        document: &document,
        recursion_limit: config.recursion_limit,
        compiled: RefCell::default(),
    }
    .compile_operation(operation_name, config.parallel)?;

    tracing::debug!(
        elapsed = ?start.elapsed(),
        fields = plan.root.len(),
        has_async = plan.has_async,
        "compiled plan"
    );
    Ok(plan)
}

/// The type a selection set is collected for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    /// A concrete object type.
    Object(Name),
    /// The selections every possible type of an interface or union shares.
    Shared(Name),
}

impl Target {
    fn name(&self) -> &Name {
        match self {
            Target::Object(name) | Target::Shared(name) => name,
        }
    }
}

/// A selection set to collect, with the directive conditions enclosing it.
struct Occurrence<'d> {
    selection_set: &'d executable::SelectionSet,
    conditions: Vec<IncludeSkip>,
}

/// One appearance of a field under its response key.
struct FieldOccurrence<'d> {
    field: &'d Node<executable::Field>,
    conditions: Vec<IncludeSkip>,
}

/// Identifies a selection to compile: the target type, the selection sets merged into it with
/// their enclosing conditions, and the depth it sits at.
#[derive(PartialEq, Eq, Hash)]
struct SelectionKey {
    target: Target,
    occurrences: Vec<(*const executable::SelectionSet, Vec<IncludeSkip>)>,
    depth: usize,
}

struct PlanCompiler<'a> {
    schema: &'a Schema,
    document: &'a Valid<ExecutableDocument>,
    recursion_limit: usize,
    /// Sub-selections compiled so far. The per-type lists of an abstract field all reach the
    /// same nested selections and share them.
    compiled: RefCell<HashMap<SelectionKey, Arc<FieldList>>>,
}

impl<'a> PlanCompiler<'a> {
    fn compile_operation(
        &self,
        operation_name: Option<&str>,
        parallel: bool,
    ) -> Result<Plan, CompileError> {
        let document: &'a Valid<ExecutableDocument> = self.document;
        let operation = match operation_name {
            Some(name) => document
                .operations
                .get(Some(name))
                .map_err(|_| CompileError::UnknownOperation(name.to_string()))?,
            None => document
                .operations
                .iter()
                .next()
                .ok_or(CompileError::NoOperation)?,
        };
        if operation.operation_type == OperationType::Subscription {
            return Err(CompileError::SubscriptionNotSupported);
        }
        let root_type = self
            .schema
            .definitions()
            .root_operation(operation.operation_type)
            .ok_or_else(|| CompileError::MissingRootType(operation.operation_type.to_string()))?
            .clone();

        let root = self.compile_fields(
            &Target::Object(root_type.clone()),
            &[Occurrence {
                selection_set: &operation.selection_set,
                conditions: Vec::new(),
            }],
            0,
        )?;
        let variables = operation
            .variables
            .iter()
            .map(|variable| VariablePlan {
                name: variable.name.clone(),
                ty: variable.ty.clone(),
                default: variable.default_value.as_deref().map(literal_to_json),
            })
            .collect();
        let has_async = root.iter().any(FieldPlan::has_async);

        Ok(Plan {
            operation_name: operation.name.as_ref().map(|name| name.to_string()),
            operation_type: operation.operation_type,
            root_type,
            root,
            variables,
            has_async,
            parallel,
            schema: self.schema.shared_definitions(),
        })
    }

    /// <https://spec.graphql.org/October2021/#CollectFields()>, done once at compile time.
    fn compile_fields(
        &self,
        target: &Target,
        occurrences: &[Occurrence<'a>],
        depth: usize,
    ) -> Result<FieldList, CompileError> {
        if depth > self.recursion_limit {
            return Err(CompileError::RecursionLimitExceeded(self.recursion_limit));
        }
        let mut grouped: IndexMap<Name, Vec<FieldOccurrence<'a>>> = IndexMap::new();
        for occurrence in occurrences {
            self.collect(
                target,
                occurrence.selection_set,
                &occurrence.conditions,
                &mut grouped,
                depth,
            )?;
        }

        let mut fields = FieldList::default();
        for (response_key, field_occurrences) in grouped {
            fields.push(self.compile_field(target, response_key, field_occurrences, depth)?);
        }
        Ok(fields)
    }

    /// [`Self::compile_fields`] for a sub-selection, reusing an identical one compiled earlier.
    fn compile_selection(
        &self,
        target: Target,
        occurrences: &[Occurrence<'a>],
        depth: usize,
    ) -> Result<Arc<FieldList>, CompileError> {
        let key = SelectionKey {
            target,
            occurrences: occurrences
                .iter()
                .map(|occurrence| {
                    (
                        occurrence.selection_set as *const executable::SelectionSet,
                        occurrence.conditions.clone(),
                    )
                })
                .collect(),
            depth,
        };
        if let Some(fields) = self.compiled.borrow().get(&key) {
            return Ok(fields.clone());
        }
        let fields = Arc::new(self.compile_fields(&key.target, occurrences, depth)?);
        self.compiled.borrow_mut().insert(key, fields.clone());
        Ok(fields)
    }

    fn collect(
        &self,
        target: &Target,
        selection_set: &'a executable::SelectionSet,
        conditions: &[IncludeSkip],
        grouped: &mut IndexMap<Name, Vec<FieldOccurrence<'a>>>,
        depth: usize,
    ) -> Result<(), CompileError> {
        if depth > self.recursion_limit {
            return Err(CompileError::RecursionLimitExceeded(self.recursion_limit));
        }
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let Some(conditions) = enter(conditions, &field.directives) else {
                        continue;
                    };
                    grouped
                        .entry(field.response_key().clone())
                        .or_default()
                        .push(FieldOccurrence { field, conditions });
                }
                Selection::InlineFragment(inline_fragment) => {
                    if let Some(type_condition) = &inline_fragment.type_condition {
                        if !self.applies(target, type_condition)? {
                            continue;
                        }
                    }
                    let Some(conditions) = enter(conditions, &inline_fragment.directives) else {
                        continue;
                    };
                    self.collect(
                        target,
                        &inline_fragment.selection_set,
                        &conditions,
                        grouped,
                        depth + 1,
                    )?;
                }
                Selection::FragmentSpread(fragment_spread) => {
                    let document: &'a Valid<ExecutableDocument> = self.document;
                    let fragment = document
                        .fragments
                        .get(&fragment_spread.fragment_name)
                        .ok_or_else(|| {
                            CompileError::UnknownFragment(fragment_spread.fragment_name.to_string())
                        })?;
                    if !self.applies(target, &fragment.selection_set.ty)? {
                        continue;
                    }
                    let Some(conditions) = enter(conditions, &fragment_spread.directives) else {
                        continue;
                    };
                    self.collect(
                        target,
                        &fragment.selection_set,
                        &conditions,
                        grouped,
                        depth + 1,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn applies(&self, target: &Target, type_condition: &Name) -> Result<bool, CompileError> {
        if !self.schema.definitions().types.contains_key(type_condition) {
            return Err(CompileError::UnknownType(type_condition.to_string()));
        }
        // Under `Target::Shared`, selections conditioned on a narrower type belong to the
        // per-type lists. The abstract type itself or an interface it implements applies to
        // every possible type.
        Ok(self.schema.fragment_applies(target.name(), type_condition))
    }

    fn compile_field(
        &self,
        target: &Target,
        response_key: Name,
        occurrences: Vec<FieldOccurrence<'a>>,
        depth: usize,
    ) -> Result<FieldPlan, CompileError> {
        let guard = occurrences
            .iter()
            .map(|occurrence| DirectiveGuard::all(&occurrence.conditions))
            .reduce(DirectiveGuard::or)
            .unwrap_or_default();
        let first = &occurrences[0].field;
        let parent_type = target.name().clone();

        if first.name == "__typename" {
            return Ok(FieldPlan {
                response_key,
                field_name: first.name.clone(),
                parent_type,
                ty: Type::NonNullNamed(name!("String")),
                arguments: ArgumentsPlan::default(),
                guard,
                kind: FieldKind::Typename(match target {
                    Target::Object(object_type) => Some(object_type.clone()),
                    Target::Shared(_) => None,
                }),
                leaf: Some(LeafType::String),
                selection: None,
            });
        }

        let definition = self
            .schema
            .definitions()
            .type_field(&parent_type, &first.name)
            .map_err(|_| CompileError::UnknownField {
                field: first.name.to_string(),
                type_name: parent_type.to_string(),
            })?;
        let accessor = self.schema.accessor(&parent_type, &first.name);
        let arguments = ArgumentsPlan::compile(definition, &first.arguments);
        let ty = definition.ty.clone();
        let inner_type = ty.inner_named_type().clone();
        let inner_definition = self
            .schema
            .definitions()
            .types
            .get(&inner_type)
            .ok_or_else(|| CompileError::UnknownType(inner_type.to_string()))?;

        // A single occurrence's conditions are already checked by this field's guard
        let children: Vec<Occurrence<'a>> = occurrences
            .iter()
            .map(|occurrence| {
                let field: &'a Node<executable::Field> = occurrence.field;
                Occurrence {
                    selection_set: &field.selection_set,
                    conditions: if occurrences.len() == 1 {
                        Vec::new()
                    } else {
                        occurrence.conditions.clone()
                    },
                }
            })
            .collect();

        let (leaf, selection) = match inner_definition {
            ExtendedType::Object(_) => {
                let fields =
                    self.compile_selection(Target::Object(inner_type.clone()), &children, depth + 1)?;
                (None, Some(SelectionPlan::Concrete(fields)))
            }
            ExtendedType::Interface(_) | ExtendedType::Union(_) => {
                let mut per_type = HashMap::new();
                for possible_type in self.schema.possible_types(&inner_type) {
                    let fields = self.compile_selection(
                        Target::Object(possible_type.clone()),
                        &children,
                        depth + 1,
                    )?;
                    per_type.insert(possible_type.clone(), fields);
                }
                let common =
                    self.compile_selection(Target::Shared(inner_type.clone()), &children, depth + 1)?;
                (None, Some(SelectionPlan::Abstract { per_type, common }))
            }
            ExtendedType::Enum(_) => (Some(LeafType::Enum(inner_type.clone())), None),
            ExtendedType::Scalar(_) => (Some(self.scalar_leaf(&inner_type)), None),
            ExtendedType::InputObject(_) => {
                return Err(CompileError::UnknownType(inner_type.to_string()));
            }
        };

        Ok(FieldPlan {
            response_key,
            field_name: first.name.clone(),
            parent_type,
            ty,
            arguments,
            guard,
            kind: FieldKind::Resolve(accessor),
            leaf,
            selection,
        })
    }

    fn scalar_leaf(&self, scalar: &Name) -> LeafType {
        match scalar.as_str() {
            "Int" => LeafType::Int,
            "Float" => LeafType::Float,
            "String" => LeafType::String,
            "Boolean" => LeafType::Boolean,
            "ID" => LeafType::Id,
            _ => LeafType::Custom {
                name: scalar.clone(),
                serializer: self.schema.scalar_serializer(scalar),
            },
        }
    }
}

/// Adds the `@skip`/`@include` conditions of a selection to the enclosing ones.
/// Returns `None` when the selection is statically excluded.
fn enter(
    conditions: &[IncludeSkip],
    directives: &executable::DirectiveList,
) -> Option<Vec<IncludeSkip>> {
    let include_skip = IncludeSkip::parse(directives);
    if include_skip.statically_skipped() {
        return None;
    }
    let mut conditions = conditions.to_vec();
    if !include_skip.statically_included() {
        conditions.push(include_skip);
    }
    Some(conditions)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SDL: &str = r#"
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String posts: [Post!]! }
        type Post implements Node { id: ID! title: String author: User }
        union SearchResult = User | Post
        type Query {
            node(id: ID!): Node
            search(term: String): [SearchResult!]!
            user: User
            hello(name: String = "world"): String!
        }
        type Mutation { like(id: ID!): Post }
        type Subscription { ticks: Int }
    "#;

    fn schema() -> Schema {
        Schema::parse(SDL)
            .unwrap()
            .resolve_async("Query", "user", |_| async { Ok(crate::Resolved::null()) })
    }

    fn keys(fields: &FieldList) -> Vec<String> {
        fields
            .iter()
            .map(|field| field.response_key.to_string())
            .collect()
    }

    fn child<'a>(fields: &'a FieldList, key: &str) -> &'a FieldPlan {
        fields
            .iter()
            .find(|field| field.response_key == key)
            .unwrap()
    }

    #[test]
    fn fragments_are_inlined_and_merged() {
        let plan = compile(
            &schema(),
            r#"
            query {
                user { ...UserFields name }
                greeting: hello
            }
            fragment UserFields on User { id name posts { title } }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(keys(&plan.root), vec!["user", "greeting"]);
        let user = child(&plan.root, "user");
        let Some(SelectionPlan::Concrete(user_fields)) = &user.selection else {
            panic!("expected a concrete selection");
        };
        assert_eq!(keys(user_fields), vec!["id", "name", "posts"]);
        assert_eq!(child(&plan.root, "greeting").field_name, "hello");
        assert!(plan.has_async());
        assert_eq!(plan.root.async_count, 1);
    }

    #[test]
    fn abstract_selections_are_partitioned() {
        let plan = compile(
            &schema(),
            r#"
            {
                search(term: "x") {
                    __typename
                    ... on User { name }
                    ... on Post { title }
                }
            }
            "#,
            None,
        )
        .unwrap();
        let search = child(&plan.root, "search");
        let Some(SelectionPlan::Abstract { per_type, common }) = &search.selection else {
            panic!("expected an abstract selection");
        };
        assert_eq!(keys(&per_type["User"]), vec!["__typename", "name"]);
        assert_eq!(keys(&per_type["Post"]), vec!["__typename", "title"]);
        assert_eq!(keys(common), vec!["__typename"]);
        assert!(matches!(
            &child(common, "__typename").kind,
            FieldKind::Typename(None)
        ));
        assert!(matches!(
            &child(&per_type["Post"], "__typename").kind,
            FieldKind::Typename(Some(name)) if name == "Post"
        ));
    }

    #[test]
    fn interface_fields_are_shared() {
        let plan = compile(
            &schema(),
            r#"{ node(id: "1") { id ... on Post { title } } }"#,
            None,
        )
        .unwrap();
        let Some(SelectionPlan::Abstract { per_type, common }) =
            &child(&plan.root, "node").selection
        else {
            panic!("expected an abstract selection");
        };
        assert_eq!(keys(common), vec!["id"]);
        assert_eq!(keys(&per_type["Post"]), vec!["id", "title"]);
        assert_eq!(keys(&per_type["User"]), vec!["id"]);
    }

    #[test]
    fn nested_abstract_selections_are_shared() {
        let implementations: String = (1..=6)
            .map(|i| format!("type Node{i} implements Node {{ id: ID! next: Node }}\n"))
            .collect();
        let schema = Schema::parse(&format!(
            "interface Node {{ id: ID! next: Node }}\n{implementations}type Query {{ node: Node }}"
        ))
        .unwrap();
        let depth = 24;
        let query = format!(
            "{{ node {{ id {}{} }} }}",
            "next { id ".repeat(depth),
            "} ".repeat(depth)
        );
        let plan = compile(&schema, &query, None).unwrap();

        let mut field = child(&plan.root, "node");
        for _ in 0..depth {
            let Some(SelectionPlan::Abstract { per_type, common }) = &field.selection else {
                panic!("expected an abstract selection");
            };
            assert_eq!(per_type.len(), 6);
            let next = |fields: &Arc<FieldList>| {
                match &child(fields, "next").selection {
                    Some(SelectionPlan::Abstract { common, .. }) => Arc::as_ptr(common),
                    _ => panic!("expected an abstract selection"),
                }
            };
            // Every possible type reaches the same compiled `next` selection
            assert!(
                per_type
                    .values()
                    .all(|fields| next(fields) == next(common))
            );
            field = child(common, "next");
        }
        let Some(SelectionPlan::Abstract { common, .. }) = &field.selection else {
            panic!("expected an abstract selection");
        };
        assert_eq!(keys(common), vec!["id"]);
    }

    #[test]
    fn fragments_on_implemented_interfaces_are_shared() {
        let schema = Schema::parse(
            r#"
            interface Named { name: String }
            interface Pet implements Named { name: String legs: Int }
            type Dog implements Pet & Named { name: String legs: Int barks: Boolean }
            type Cat implements Pet & Named { name: String legs: Int }
            type Query { pet: Pet }
            "#,
        )
        .unwrap();
        let plan = compile(
            &schema,
            "{ pet { legs ... on Named { name } ... on Dog { barks } } }",
            None,
        )
        .unwrap();
        let Some(SelectionPlan::Abstract { per_type, common }) =
            &child(&plan.root, "pet").selection
        else {
            panic!("expected an abstract selection");
        };
        assert_eq!(keys(common), vec!["legs", "name"]);
        assert_eq!(keys(&per_type["Cat"]), vec!["legs", "name"]);
        assert_eq!(keys(&per_type["Dog"]), vec!["legs", "name", "barks"]);
    }

    #[test]
    fn statically_excluded_fields_are_dropped() {
        let plan = compile(
            &schema(),
            r#"
            query($show: Boolean!) {
                hello @include(if: false)
                user @skip(if: false) { id }
                other: hello @include(if: $show)
            }
            "#,
            None,
        )
        .unwrap();
        assert_eq!(keys(&plan.root), vec!["user", "other"]);
        assert!(child(&plan.root, "user").guard.is_always());
        assert!(!child(&plan.root, "other").guard.is_always());
    }

    #[test]
    fn operation_selection() {
        let query = "query A { hello } query B { user { id } } mutation C { like(id: 1) { id } }";
        let schema = schema();
        assert_eq!(
            compile(&schema, query, None).unwrap().operation_name(),
            Some("A")
        );
        let mutation = compile(&schema, query, Some("C")).unwrap();
        assert!(mutation.is_mutation());
        assert_eq!(mutation.root_type(), "Mutation");
        assert_eq!(
            compile(&schema, query, Some("D")).unwrap_err(),
            CompileError::UnknownOperation("D".to_string())
        );
        assert_eq!(
            compile(&schema, "subscription { ticks }", None).unwrap_err(),
            CompileError::SubscriptionNotSupported
        );
    }

    #[test]
    fn validation_errors_are_all_reported() {
        let error = compile(&schema(), "{ nope also_nope }", None).unwrap_err();
        let CompileError::Validation(validation) = error else {
            panic!("expected a validation error");
        };
        assert_eq!(validation.errors.len(), 2);
        assert!(validation.errors[0].message.contains("nope"));
    }

    #[test]
    fn recursion_limit() {
        let query = "{ user { posts { author { posts { author { id } } } } } }";
        let error = compile_with_config(
            &schema(),
            query,
            None,
            &Execution::builder().recursion_limit(3).build(),
        )
        .unwrap_err();
        assert_eq!(error, CompileError::RecursionLimitExceeded(3));
        assert!(compile(&schema(), query, None).is_ok());
    }

    #[test]
    fn variable_definitions_keep_defaults() {
        let plan = compile(
            &schema(),
            r#"query($name: String = "you") { hello(name: $name) }"#,
            None,
        )
        .unwrap();
        assert_eq!(plan.variables.len(), 1);
        assert_eq!(plan.variables[0].name, "name");
        assert_eq!(
            plan.variables[0].default,
            Some(serde_json_bytes::json!("you"))
        );
    }
}
