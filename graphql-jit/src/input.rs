//! Variable input coercion.

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;

use crate::error::VariableError;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::plan::VariablePlan;

#[derive(Debug)]
pub(crate) struct InvalidValue;

/// Applies declared defaults and checks every provided variable against its declared type.
///
/// Variables that are neither provided nor defaulted stay absent, so arguments referring to
/// them fall back to the schema default.
pub(crate) fn coerce_variables(
    definitions: &[VariablePlan],
    schema: &Valid<apollo_compiler::Schema>,
    mut provided: Object,
) -> Result<Object, Vec<Error>> {
    let mut errors = Vec::new();
    let mut coerced = Object::new();
    for definition in definitions {
        let name = definition.name.as_str();
        let value = match provided.remove(name) {
            Some(value) => value,
            None => match &definition.default {
                Some(default) => default.clone(),
                None if definition.ty.is_non_null() => {
                    errors.push(
                        VariableError::Missing {
                            name: name.to_string(),
                            ty: definition.ty.to_string(),
                        }
                        .to_graphql_error(None),
                    );
                    continue;
                }
                None => continue,
            },
        };
        if validate_input_value(&definition.ty, &value, schema).is_err() {
            errors.push(
                VariableError::InvalidType {
                    name: name.to_string(),
                }
                .to_graphql_error(None),
            );
            continue;
        }
        coerced.insert(name, value);
    }
    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

// Validates input values according to the "input coercion" rules of the GraphQL specification.
pub(crate) fn validate_input_value(
    ty: &Type,
    value: &Value,
    schema: &Valid<apollo_compiler::Schema>,
) -> Result<(), InvalidValue> {
    match (ty, value) {
        (Type::NonNullNamed(_) | Type::NonNullList(_), Value::Null) => Err(InvalidValue),
        // NOTE: graphql's types are all optional by default
        (_, Value::Null) => Ok(()),
        (Type::List(inner) | Type::NonNullList(inner), Value::Array(items)) => items
            .iter()
            .try_for_each(|item| validate_input_value(inner, item, schema)),
        // For coercion from single value to list
        (Type::List(inner) | Type::NonNullList(inner), value) => {
            validate_input_value(inner, value, schema)
        }
        (Type::Named(name) | Type::NonNullNamed(name), value) => match name.as_str() {
            "String" => value.is_string().then_some(()).ok_or(InvalidValue),
            "Boolean" => value.is_boolean().then_some(()).ok_or(InvalidValue),
            // Spec: https://spec.graphql.org/June2018/#sec-Int
            "Int" => is_valid_int_input(value).then_some(()).ok_or(InvalidValue),
            // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
            "Float" => value.is_number().then_some(()).ok_or(InvalidValue),
            // In practice it seems Int works too
            "ID" => (value.is_string() || is_valid_int_input(value))
                .then_some(())
                .ok_or(InvalidValue),
            _ => match schema.types.get(name) {
                Some(ExtendedType::Scalar(_)) => Ok(()),
                Some(ExtendedType::Enum(enum_type)) => value
                    .as_str()
                    .filter(|v| enum_type.values.contains_key(*v))
                    .map(|_| ())
                    .ok_or(InvalidValue),
                Some(ExtendedType::InputObject(input_object)) => {
                    let object = value.as_object().ok_or(InvalidValue)?;
                    if object
                        .keys()
                        .any(|key| !input_object.fields.contains_key(key.as_str()))
                    {
                        return Err(InvalidValue);
                    }
                    input_object
                        .fields
                        .iter()
                        .try_for_each(|(field_name, field)| {
                            match object.get(field_name.as_str()) {
                                Some(field_value) => {
                                    validate_input_value(&field.ty, field_value, schema)
                                }
                                None if field.ty.is_non_null()
                                    && field.default_value.is_none() =>
                                {
                                    Err(InvalidValue)
                                }
                                None => Ok(()),
                            }
                        })
                }
                _ => Err(InvalidValue),
            },
        },
    }
}

fn is_valid_int_input(value: &Value) -> bool {
    value
        .as_i64()
        .and_then(|int| i32::try_from(int).ok())
        .is_some()
}

#[cfg(test)]
mod tests {
    use apollo_compiler::Node;
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    const SDL: &str = r#"
        enum Color { RED GREEN }
        scalar Date
        input Filter { color: Color! limit: Int = 10 tags: [String!] }
        type Query { items(filter: Filter): [String] }
    "#;

    fn schema() -> Valid<apollo_compiler::Schema> {
        apollo_compiler::Schema::parse_and_validate(SDL, "schema.graphql").unwrap()
    }

    fn check(ty: Type, value: Value) -> bool {
        validate_input_value(&ty, &value, &schema()).is_ok()
    }

    #[test]
    fn scalars() {
        assert!(check(Type::Named(name!("Int")), json!(5)));
        assert!(!check(Type::Named(name!("Int")), json!(1.5)));
        assert!(!check(Type::Named(name!("Int")), json!(3_000_000_000_i64)));
        assert!(check(Type::Named(name!("Float")), json!(5)));
        assert!(check(Type::Named(name!("ID")), json!(5)));
        assert!(check(Type::Named(name!("ID")), json!("a")));
        assert!(!check(Type::Named(name!("String")), json!(true)));
        assert!(check(Type::Named(name!("Date")), json!({ "any": "thing" })));
        assert!(check(Type::Named(name!("String")), json!(null)));
        assert!(!check(Type::NonNullNamed(name!("String")), json!(null)));
    }

    #[test]
    fn enums_lists_and_input_objects() {
        assert!(check(Type::Named(name!("Color")), json!("RED")));
        assert!(!check(Type::Named(name!("Color")), json!("BLUE")));
        let list = Type::Named(name!("Int")).list();
        assert!(check(list.clone(), json!([1, 2])));
        assert!(check(list.clone(), json!(1)));
        assert!(!check(list, json!([1, "2"])));
        let filter = Type::NonNullNamed(name!("Filter"));
        assert!(check(filter.clone(), json!({ "color": "GREEN", "tags": ["a"] })));
        assert!(!check(filter.clone(), json!({ "limit": 1 })));
        assert!(!check(filter.clone(), json!({ "color": "RED", "unknown": 1 })));
        assert!(!check(filter, json!("RED")));
    }

    #[test]
    fn coercion_reports_every_variable() {
        let definitions = vec![
            VariablePlan {
                name: name!("id"),
                ty: Node::new(Type::NonNullNamed(name!("ID"))),
                default: None,
            },
            VariablePlan {
                name: name!("limit"),
                ty: Node::new(Type::Named(name!("Int"))),
                default: Some(json!(3)),
            },
            VariablePlan {
                name: name!("color"),
                ty: Node::new(Type::Named(name!("Color"))),
                default: None,
            },
        ];
        let coerced = coerce_variables(
            &definitions,
            &schema(),
            json!({ "id": "1" }).as_object().unwrap().clone(),
        )
        .unwrap();
        assert_eq!(Value::Object(coerced), json!({ "id": "1", "limit": 3 }));

        let errors = coerce_variables(
            &definitions,
            &schema(),
            json!({ "limit": "three" }).as_object().unwrap().clone(),
        )
        .unwrap_err();
        let messages: Vec<_> = errors.iter().map(|error| error.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                r#"Variable "$id" of required type "ID!" was not provided."#,
                "invalid type for variable: 'limit'",
            ]
        );
        assert_eq!(
            errors[0].extensions.get("code"),
            Some(&json!("VALIDATION_MISSING_VARIABLE"))
        );
    }
}
