//! Compilation and execution errors.
use std::fmt;

use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// The query document failed validation against the schema.
///
/// Holds every validation message, not only the first one.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryValidationError {
    pub errors: Vec<Error>,
}

impl fmt::Display for QueryValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query validation failed: ")?;
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error.message)?;
        }
        Ok(())
    }
}

impl<T> From<WithErrors<T>> for QueryValidationError {
    fn from(with_errors: WithErrors<T>) -> Self {
        Self {
            errors: with_errors
                .errors
                .iter()
                .map(|diagnostic| diagnostic.to_json().into())
                .collect(),
        }
    }
}

impl IntoGraphQLErrors for QueryValidationError {
    fn into_graphql_errors(self) -> Vec<Error> {
        self.errors
            .into_iter()
            .map(|mut error| {
                error
                    .extensions
                    .insert("code", "GRAPHQL_VALIDATION_FAILED".into());
                error
            })
            .collect()
    }
}

/// Error types for schema loading.
#[derive(Error, Display, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SchemaError {
    /// GraphQL validation error: {0}
    Validate(String),
}

impl<T> From<WithErrors<T>> for SchemaError {
    fn from(with_errors: WithErrors<T>) -> Self {
        SchemaError::Validate(with_errors.errors.to_string())
    }
}

/// Error types raised while turning a query document into a plan.
///
/// Compilation never returns a partial plan.
#[derive(Error, Display, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CompileError {
    /// {0}
    Validation(#[from] QueryValidationError),

    /// unknown fragment: '{0}'
    UnknownFragment(String),

    /// cannot query field '{field}' on type '{type_name}'
    UnknownField {
        /// Name of the field.
        field: String,
        /// Name of the parent type.
        type_name: String,
    },

    /// unknown type: '{0}'
    UnknownType(String),

    /// unknown operation: '{0}'
    UnknownOperation(String),

    /// the document does not contain any operation
    NoOperation,

    /// subscriptions are not supported
    SubscriptionNotSupported,

    /// the schema does not define a {0} root type
    MissingRootType(String),

    /// selection set nesting exceeds the limit of {0}
    RecursionLimitExceeded(usize),
}

impl ErrorExtension for CompileError {
    fn extension_code(&self) -> String {
        match self {
            CompileError::Validation(_) => "GRAPHQL_VALIDATION_FAILED",
            CompileError::UnknownFragment(_) => "UNKNOWN_FRAGMENT",
            CompileError::UnknownField { .. } => "UNKNOWN_FIELD",
            CompileError::UnknownType(_) => "UNKNOWN_TYPE",
            CompileError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            CompileError::NoOperation => "NO_OPERATION",
            CompileError::SubscriptionNotSupported => "SUBSCRIPTION_NOT_SUPPORTED",
            CompileError::MissingRootType(_) => "MISSING_ROOT_TYPE",
            CompileError::RecursionLimitExceeded(_) => "RECURSION_LIMIT_EXCEEDED",
        }
        .to_string()
    }
}

impl IntoGraphQLErrors for CompileError {
    fn into_graphql_errors(self) -> Vec<Error> {
        match self {
            CompileError::Validation(errors) => errors.into_graphql_errors(),
            other => vec![other.to_graphql_error(None)],
        }
    }
}

impl CompileError {
    /// Converts the error into GraphQL errors suitable for a response `errors` array.
    pub fn to_graphql_errors(&self) -> Vec<Error> {
        self.clone().into_graphql_errors()
    }
}

/// An error raised by a field resolver.
///
/// The engine records it once, with the response path of the field, and nulls the
/// nearest nullable ancestor.
#[derive(Error, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
        }
    }

    /// Adds an entry to the `extensions` of the recorded GraphQL error.
    pub fn with_extension(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }

    /// Wraps any error, keeping its display message.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self::new(error.to_string())
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Error types for variable coercion, raised before any resolver runs.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum VariableError {
    /// invalid type for variable: '{name}'
    InvalidType {
        /// Name of the variable.
        name: String,
    },

    /// Variable "${name}" of required type "{ty}" was not provided.
    Missing {
        /// Name of the variable.
        name: String,
        /// The declared type.
        ty: String,
    },
}

impl ErrorExtension for VariableError {
    fn extension_code(&self) -> String {
        match self {
            VariableError::InvalidType { .. } => "VALIDATION_INVALID_TYPE_VARIABLE",
            VariableError::Missing { .. } => "VALIDATION_MISSING_VARIABLE",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn compile_error_messages() {
        assert_eq!(
            CompileError::UnknownField {
                field: "nope".to_string(),
                type_name: "Query".to_string(),
            }
            .to_string(),
            "cannot query field 'nope' on type 'Query'"
        );
        assert_eq!(
            CompileError::UnknownFragment("F".to_string()).to_string(),
            "unknown fragment: 'F'"
        );
    }

    #[test]
    fn compile_error_extension_code() {
        let errors = CompileError::UnknownType("Ghost".to_string()).to_graphql_errors();
        assert_eq!(
            serde_json_bytes::to_value(&errors).unwrap(),
            json!([{
                "message": "unknown type: 'Ghost'",
                "extensions": { "code": "UNKNOWN_TYPE" }
            }])
        );
    }

    #[test]
    fn variable_error_messages() {
        let missing = VariableError::Missing {
            name: "id".to_string(),
            ty: "ID!".to_string(),
        };
        assert_eq!(
            missing.to_string(),
            r#"Variable "$id" of required type "ID!" was not provided."#
        );
        assert_eq!(
            missing.to_graphql_error(None).extensions.get("code"),
            Some(&json!("VALIDATION_MISSING_VARIABLE"))
        );
    }

    #[test]
    fn field_error_from_str() {
        let error: FieldError = "Deep error".into();
        assert_eq!(error.to_string(), "Deep error");
    }
}
