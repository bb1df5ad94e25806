//! Compiled field arguments.
//!
//! Arguments are compiled once per field and materialized on every execution against the
//! live variable values, without going back to the document.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast::Value as AstValue;
use apollo_compiler::executable::Argument;
use apollo_compiler::schema::FieldDefinition;

use crate::json_ext::Object;
use crate::json_ext::Value;

/// How to produce one argument value at execution time.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ArgumentPlan {
    Constant(Value),
    /// Looked up in the variables, falling back to `default` and then to an absent value.
    Variable {
        name: Name,
        default: Option<Value>,
    },
    List(Vec<ArgumentPlan>),
    /// Input object fields, in document order.
    Object(Vec<(Name, ArgumentPlan)>),
}

impl ArgumentPlan {
    pub(crate) fn compile(value: &AstValue, default: Option<Value>) -> Self {
        match value {
            AstValue::Variable(name) => ArgumentPlan::Variable {
                name: name.clone(),
                default,
            },
            AstValue::List(items) => {
                ArgumentPlan::List(items.iter().map(|item| Self::compile(item, None)).collect())
            }
            AstValue::Object(fields) => ArgumentPlan::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Self::compile(value, None)))
                    .collect(),
            ),
            literal => ArgumentPlan::Constant(literal_to_json(literal)),
        }
    }

    /// Returns `None` when the value is absent, which is distinct from an explicit `null`.
    pub(crate) fn materialize(&self, variables: &Object) -> Option<Value> {
        match self {
            ArgumentPlan::Constant(value) => Some(value.clone()),
            ArgumentPlan::Variable { name, default } => variables
                .get(name.as_str())
                .cloned()
                .or_else(|| default.clone()),
            ArgumentPlan::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.materialize(variables).unwrap_or_default())
                    .collect(),
            )),
            ArgumentPlan::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(name, plan)| {
                        plan.materialize(variables)
                            .map(|value| (name.as_str().into(), value))
                    })
                    .collect(),
            )),
        }
    }

    fn is_constant(&self) -> bool {
        match self {
            ArgumentPlan::Constant(_) => true,
            ArgumentPlan::Variable { .. } => false,
            ArgumentPlan::List(items) => items.iter().all(ArgumentPlan::is_constant),
            ArgumentPlan::Object(fields) => fields.iter().all(|(_, plan)| plan.is_constant()),
        }
    }
}

/// The compiled arguments of one field, in schema definition order.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ArgumentsPlan {
    arguments: Vec<(Name, ArgumentPlan)>,
    /// Precomputed when no argument depends on variables.
    constant: Option<Object>,
}

impl ArgumentsPlan {
    /// Pairs the arguments written in the query with the field definition, applying schema
    /// defaults for the ones left out.
    pub(crate) fn compile(definition: &FieldDefinition, arguments: &[Node<Argument>]) -> Self {
        let mut compiled = Vec::with_capacity(definition.arguments.len());
        for argument_definition in &definition.arguments {
            let default = argument_definition
                .default_value
                .as_deref()
                .map(literal_to_json);
            let provided = arguments
                .iter()
                .find(|argument| argument.name == argument_definition.name);
            let plan = match (provided, default) {
                (Some(argument), default) => ArgumentPlan::compile(&argument.value, default),
                (None, Some(default)) => ArgumentPlan::Constant(default),
                (None, None) => continue,
            };
            compiled.push((argument_definition.name.clone(), plan));
        }
        let constant = compiled
            .iter()
            .all(|(_, plan)| plan.is_constant())
            .then(|| Self::collect(&compiled, &Object::new()));
        Self {
            arguments: compiled,
            constant,
        }
    }

    pub(crate) fn materialize(&self, variables: &Object) -> Object {
        match &self.constant {
            Some(constant) => constant.clone(),
            None => Self::collect(&self.arguments, variables),
        }
    }

    fn collect(arguments: &[(Name, ArgumentPlan)], variables: &Object) -> Object {
        arguments
            .iter()
            .filter_map(|(name, plan)| {
                plan.materialize(variables)
                    .map(|value| (name.as_str().into(), value))
            })
            .collect()
    }
}

/// Converts a constant document value to JSON. Variables nested in a constant position
/// cannot occur in a validated document and become `null`.
pub(crate) fn literal_to_json(value: &AstValue) -> Value {
    match value {
        AstValue::Null | AstValue::Variable(_) => Value::Null,
        AstValue::Enum(name) => Value::String(name.as_str().into()),
        AstValue::String(string) => Value::String(string.as_str().into()),
        AstValue::Boolean(boolean) => Value::Bool(*boolean),
        AstValue::Int(int) => match int.try_to_i32() {
            Ok(int) => Value::from(int),
            Err(_) => int
                .try_to_f64()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(int.as_str().into())),
        },
        AstValue::Float(float) => float
            .try_to_f64()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(float.as_str().into())),
        AstValue::List(items) => {
            Value::Array(items.iter().map(|item| literal_to_json(item)).collect())
        }
        AstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), literal_to_json(value)))
                .collect(),
        ),
    }
}
