//! The executable plan produced by the compiler.
//!
//! A plan is immutable once compiled. It owns everything execution needs (accessors, argument
//! plans, type information) so it can be shared across any number of concurrent executions.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable::OperationType;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;
use derivative::Derivative;

use crate::argument::ArgumentsPlan;
use crate::directives::DirectiveGuard;
use crate::json_ext::Value;
use crate::resolver::Accessor;
use crate::resolver::ScalarSerializerFn;

/// A compiled operation, ready for repeated execution.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Plan {
    pub(crate) operation_name: Option<String>,
    pub(crate) operation_type: OperationType,
    pub(crate) root_type: Name,
    pub(crate) root: FieldList,
    pub(crate) variables: Vec<VariablePlan>,
    pub(crate) has_async: bool,
    /// When false, no level fans out. Mutation root fields never fan out.
    pub(crate) parallel: bool,
    #[derivative(Debug = "ignore")]
    pub(crate) schema: Arc<Valid<apollo_compiler::Schema>>,
}

static_assertions::assert_impl_all!(Plan: Send, Sync);

impl Plan {
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Name of the root operation type, such as `Query`.
    pub fn root_type(&self) -> &str {
        self.root_type.as_str()
    }

    /// Returns true when any field of the plan has an asynchronous resolver.
    pub fn has_async(&self) -> bool {
        self.has_async
    }

    pub fn is_mutation(&self) -> bool {
        self.operation_type == OperationType::Mutation
    }
}

/// An operation variable definition.
#[derive(Debug, Clone)]
pub(crate) struct VariablePlan {
    pub(crate) name: Name,
    pub(crate) ty: Node<Type>,
    pub(crate) default: Option<Value>,
}

/// The fields selected on one object, in response order.
#[derive(Debug, Default)]
pub(crate) struct FieldList {
    pub(crate) fields: Vec<FieldPlan>,
    /// How many of `fields` resolve asynchronously.
    pub(crate) async_count: usize,
    /// Whether any field at this level or below resolves asynchronously.
    has_async: bool,
}

impl FieldList {
    pub(crate) fn push(&mut self, field: FieldPlan) {
        if field.is_async() {
            self.async_count += 1;
        }
        self.has_async |= field.has_async();
        self.fields.push(field);
    }

    /// Sibling asynchronous fields are resolved as one concurrent batch.
    pub(crate) fn fans_out(&self) -> bool {
        self.async_count > 1
    }

    pub(crate) fn has_async(&self) -> bool {
        self.has_async
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FieldPlan> {
        self.fields.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Sub-selections are shared between every field plan that selects the same fields on the same
/// type, so a plan is a DAG rather than a tree.
#[derive(Debug)]
pub(crate) enum SelectionPlan {
    Concrete(Arc<FieldList>),
    /// Selections on an interface or union, dispatched on the runtime type name.
    Abstract {
        per_type: HashMap<Name, Arc<FieldList>>,
        /// Used when the runtime type is missing or not a possible type.
        common: Arc<FieldList>,
    },
}

impl SelectionPlan {
    pub(crate) fn for_type(&self, type_name: Option<&str>) -> &FieldList {
        match self {
            SelectionPlan::Concrete(fields) => fields,
            SelectionPlan::Abstract { per_type, common } => type_name
                .and_then(|type_name| per_type.get(type_name))
                .unwrap_or(common),
        }
    }

    fn has_async(&self) -> bool {
        match self {
            SelectionPlan::Concrete(fields) => fields.has_async(),
            SelectionPlan::Abstract { per_type, common } => {
                common.has_async() || per_type.values().any(|fields| fields.has_async())
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct FieldPlan {
    pub(crate) response_key: Name,
    pub(crate) field_name: Name,
    pub(crate) parent_type: Name,
    pub(crate) ty: Type,
    pub(crate) arguments: ArgumentsPlan,
    pub(crate) guard: DirectiveGuard,
    pub(crate) kind: FieldKind,
    /// Set for fields without a sub-selection.
    pub(crate) leaf: Option<LeafType>,
    pub(crate) selection: Option<SelectionPlan>,
}

impl FieldPlan {
    pub(crate) fn is_async(&self) -> bool {
        matches!(&self.kind, FieldKind::Resolve(accessor) if accessor.is_async())
    }

    pub(crate) fn has_async(&self) -> bool {
        self.is_async() || self.selection.as_ref().is_some_and(SelectionPlan::has_async)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FieldKind {
    /// `__typename`. `None` under an abstract type's shared selections, where the runtime
    /// type name is only known during execution.
    Typename(Option<Name>),
    Resolve(Accessor),
}

/// How leaf values are coerced into the response.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub(crate) enum LeafType {
    Int,
    Float,
    String,
    Boolean,
    Id,
    Enum(Name),
    Custom {
        name: Name,
        #[derivative(Debug = "ignore")]
        serializer: Option<ScalarSerializerFn>,
    },
}

impl LeafType {
    pub(crate) fn name(&self) -> &str {
        match self {
            LeafType::Int => "Int",
            LeafType::Float => "Float",
            LeafType::String => "String",
            LeafType::Boolean => "Boolean",
            LeafType::Id => "ID",
            LeafType::Enum(name) | LeafType::Custom { name, .. } => name.as_str(),
        }
    }
}
