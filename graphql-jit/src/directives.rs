//! `@skip` and `@include` handling.

use apollo_compiler::executable;

use crate::json_ext::Object;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(String),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &executable::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in &directives.0 {
            if include.is_none() && directive.name == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    pub(crate) fn statically_included(&self) -> bool {
        matches!(self.skip, Condition::No) && matches!(self.include, Condition::Yes)
    }

    pub(crate) fn should_skip(&self, variables: &Object) -> bool {
        // Variables are coerced before execution, a missing one can only mean the
        // directive argument was nullable and left out.
        self.skip.eval(variables).unwrap_or(false) || !self.include.eval(variables).unwrap_or(true)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &executable::Directive) -> Option<Self> {
        match directive.specified_argument_by_name("if")?.as_ref() {
            executable::Value::Boolean(true) => Some(Condition::Yes),
            executable::Value::Boolean(false) => Some(Condition::No),
            executable::Value::Variable(variable) => {
                Some(Condition::Variable(variable.as_str().to_owned()))
            }
            _ => None,
        }
    }

    pub(crate) fn eval(&self, variables: &Object) -> Option<bool> {
        match self {
            Condition::Yes => Some(true),
            Condition::No => Some(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|v| v.as_bool()),
        }
    }
}

/// The directive conditions a field depends on, after fragments have been inlined.
///
/// A field written several times under the same response key is kept when any of its
/// occurrences is kept, and an occurrence is kept when all of its enclosing conditions hold.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum DirectiveGuard {
    #[default]
    Always,
    Any(Vec<Vec<IncludeSkip>>),
}

impl DirectiveGuard {
    /// Builds the guard of a single occurrence from the conditions enclosing it.
    /// Statically included conditions must already be filtered out.
    pub(crate) fn all(conditions: &[IncludeSkip]) -> Self {
        if conditions.is_empty() {
            DirectiveGuard::Always
        } else {
            DirectiveGuard::Any(vec![conditions.to_vec()])
        }
    }

    pub(crate) fn or(self, other: DirectiveGuard) -> Self {
        match (self, other) {
            (DirectiveGuard::Always, _) | (_, DirectiveGuard::Always) => DirectiveGuard::Always,
            (DirectiveGuard::Any(mut left), DirectiveGuard::Any(right)) => {
                for conjunction in right {
                    if !left.contains(&conjunction) {
                        left.push(conjunction);
                    }
                }
                DirectiveGuard::Any(left)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_always(&self) -> bool {
        matches!(self, DirectiveGuard::Always)
    }

    pub(crate) fn allows(&self, variables: &Object) -> bool {
        match self {
            DirectiveGuard::Always => true,
            DirectiveGuard::Any(alternatives) => alternatives.iter().any(|conditions| {
                conditions
                    .iter()
                    .all(|condition| !condition.should_skip(variables))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ExecutableDocument;
    use apollo_compiler::Schema;
    use apollo_compiler::executable::Selection;
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Value;

    fn parse_field_directives(query: &str) -> Vec<IncludeSkip> {
        let schema =
            Schema::parse_and_validate("type Query { a: Int b: Int }", "schema.graphql").unwrap();
        let document =
            ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        operation
            .selection_set
            .selections
            .iter()
            .map(|selection| match selection {
                Selection::Field(field) => IncludeSkip::parse(&field.directives),
                _ => panic!("expected fields"),
            })
            .collect()
    }

    fn variables(value: Value) -> Object {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn static_conditions() {
        let parsed = parse_field_directives(
            "{ a @include(if: false) b @skip(if: false) }",
        );
        assert!(parsed[0].statically_skipped());
        assert!(parsed[1].statically_included());
    }

    #[test]
    fn variable_conditions() {
        let parsed = parse_field_directives(
            "query($x: Boolean!, $y: Boolean!) { a @include(if: $x) b @skip(if: $y) }",
        );
        let on = variables(json!({ "x": true, "y": true }));
        let off = variables(json!({ "x": false, "y": false }));
        assert!(!parsed[0].should_skip(&on));
        assert!(parsed[0].should_skip(&off));
        assert!(parsed[1].should_skip(&on));
        assert!(!parsed[1].should_skip(&off));
    }

    #[test]
    fn guard_disjunction() {
        let parsed = parse_field_directives(
            "query($x: Boolean!, $y: Boolean!) { a @include(if: $x) b @include(if: $y) }",
        );
        let guard = DirectiveGuard::all(&parsed[0..1]).or(DirectiveGuard::all(&parsed[1..2]));
        assert!(guard.allows(&variables(json!({ "x": false, "y": true }))));
        assert!(!guard.allows(&variables(json!({ "x": false, "y": false }))));

        let both = DirectiveGuard::all(&parsed);
        assert!(!both.allows(&variables(json!({ "x": true, "y": false }))));
        assert!(both.or(DirectiveGuard::Always).is_always());
    }
}
