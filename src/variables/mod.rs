//! Lazy configuration values and `${lookup ...}` resolution.
//!
//! Configuration fields that may contain lookup syntax are held as
//! [`Variable`] values: an explicit two-state sum of a raw, unresolved
//! value and a resolved one. Reading an unresolved variable is an error,
//! never a silent fallthrough to the raw value. Resolution walks the value
//! tree, dispatching `${handler-name query}` expressions to registered
//! [`lookup::LookupHandler`]s; nested expressions resolve inner-to-outer.

pub mod lookup;

use serde_json::Value;

use crate::environment::DeployEnvironment;
use crate::error::{Result, VariableError};

pub use lookup::{LookupHandler, LookupRegistry};

/// Context for one resolution pass.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// The deploy environment supplying process variables.
    pub environment: &'a DeployEnvironment,
    /// The run's variables document (the `variables` mapping).
    pub variables: &'a Value,
    /// Registered lookup handlers.
    pub lookups: &'a LookupRegistry,
}

/// Resolution state of a [`Variable`].
#[derive(Debug, Clone)]
enum VariableState {
    /// The raw configuration value, possibly containing lookup syntax.
    Unresolved(Value),
    /// The fully-resolved value.
    Resolved(Value),
}

/// A configuration value that resolves lookups exactly once.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    state: VariableState,
}

impl Variable {
    /// Wraps a raw configuration value.
    #[must_use]
    pub fn new(name: impl Into<String>, raw: Value) -> Self {
        Self {
            name: name.into(),
            state: VariableState::Unresolved(raw),
        }
    }

    /// Returns the variable's name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once [`Variable::resolve`] has run.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self.state, VariableState::Resolved(_))
    }

    /// Returns the resolved value.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::Unresolved`] if called before
    /// [`Variable::resolve`]; the raw value is never returned here.
    pub fn value(&self) -> Result<&Value> {
        match &self.state {
            VariableState::Resolved(value) => Ok(value),
            VariableState::Unresolved(_) => Err(VariableError::unresolved(&self.name).into()),
        }
    }

    /// Resolves all lookup expressions in the raw value.
    ///
    /// Calling resolve on an already-resolved variable is a no-op; the
    /// first resolution wins.
    ///
    /// # Errors
    ///
    /// Returns an error if any lookup is unknown, malformed, or fails.
    pub fn resolve(&mut self, ctx: &ResolutionContext<'_>) -> Result<()> {
        let resolved = match &self.state {
            VariableState::Resolved(_) => return Ok(()),
            VariableState::Unresolved(raw) => resolve_value(&self.name, raw, ctx)?,
        };
        self.state = VariableState::Resolved(resolved);
        Ok(())
    }
}

/// Recursively resolves lookups within a value tree.
fn resolve_value(name: &str, value: &Value, ctx: &ResolutionContext<'_>) -> Result<Value> {
    match value {
        Value::String(s) if s.contains("${") => resolve_string(name, s, ctx),
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| resolve_value(name, item, ctx))
                .collect::<Result<Vec<Value>>>()?;
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(name, item, ctx)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolves lookup expressions embedded in a string.
///
/// The last `${` in the string is always an innermost expression, so
/// repeatedly resolving it and substituting the result realizes
/// inner-to-outer ordering for nested lookups. A string that consists of a
/// single expression keeps the handler's value type; an expression embedded
/// in surrounding text is stringified.
fn resolve_string(name: &str, input: &str, ctx: &ResolutionContext<'_>) -> Result<Value> {
    let mut current = input.to_string();

    loop {
        let Some(start) = current.rfind("${") else {
            return Ok(Value::String(current));
        };
        let Some(close_offset) = current[start..].find('}') else {
            return Err(VariableError::MalformedLookup {
                expression: current[start..].to_string(),
                variable: name.to_string(),
            }
            .into());
        };
        let end = start + close_offset;

        let expression = &current[start + 2..end];
        let Some((lookup_name, query)) = expression.split_once(' ') else {
            return Err(VariableError::MalformedLookup {
                expression: expression.to_string(),
                variable: name.to_string(),
            }
            .into());
        };
        let lookup_name = lookup_name.trim();
        let query = query.trim();

        let resolved = ctx.lookups.resolve(lookup_name, query, ctx, name)?;

        if start == 0 && end == current.len() - 1 {
            return Ok(resolved);
        }

        let replacement = scalar_to_string(&resolved).ok_or_else(|| {
            VariableError::NonScalarInterpolation {
                lookup: lookup_name.to_string(),
                variable: name.to_string(),
            }
        })?;
        current.replace_range(start..=end, &replacement);
    }
}

/// Renders a scalar value for interpolation into a string.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunwayError;
    use serde_json::json;

    fn fixture_env() -> DeployEnvironment {
        let mut env = DeployEnvironment::fixture("dev", true, "/tmp");
        env.set_var("BUCKET_NAME", "my-bucket");
        env
    }

    #[test]
    fn test_read_before_resolve_fails() {
        let variable = Variable::new("namespace", json!("${env BUCKET_NAME}"));
        assert!(!variable.is_resolved());
        let err = variable.value().unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Variable(VariableError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_resolve_env_lookup() {
        let env = fixture_env();
        let variables = json!({});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new("bucket", json!("${env BUCKET_NAME}"));
        variable.resolve(&ctx).unwrap();
        assert_eq!(variable.value().unwrap(), &json!("my-bucket"));
    }

    #[test]
    fn test_repeated_reads_are_stable() {
        let env = fixture_env();
        let variables = json!({});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new("bucket", json!("prefix-${env BUCKET_NAME}"));
        variable.resolve(&ctx).unwrap();
        let first = variable.value().unwrap().clone();
        variable.resolve(&ctx).unwrap();
        assert_eq!(variable.value().unwrap(), &first);
        assert_eq!(first, json!("prefix-my-bucket"));
    }

    #[test]
    fn test_whole_expression_preserves_type() {
        let env = fixture_env();
        let variables = json!({"regions": ["us-east-1", "us-west-2"]});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new("regions", json!("${var regions}"));
        variable.resolve(&ctx).unwrap();
        assert_eq!(
            variable.value().unwrap(),
            &json!(["us-east-1", "us-west-2"])
        );
    }

    #[test]
    fn test_nested_lookup_resolves_inner_first() {
        let mut env = fixture_env();
        env.set_var("TARGET", "dev");
        let variables = json!({"accounts": {"dev": "111111111111", "prod": "222222222222"}});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new("account", json!("${var accounts.${env TARGET}}"));
        variable.resolve(&ctx).unwrap();
        assert_eq!(variable.value().unwrap(), &json!("111111111111"));
    }

    #[test]
    fn test_resolves_inside_collections() {
        let env = fixture_env();
        let variables = json!({"team": "platform"});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new(
            "parameters",
            json!({"owner": "${var team}", "static": 7}),
        );
        variable.resolve(&ctx).unwrap();
        assert_eq!(
            variable.value().unwrap(),
            &json!({"owner": "platform", "static": 7})
        );
    }

    #[test]
    fn test_unknown_lookup_is_fatal() {
        let env = fixture_env();
        let variables = json!({});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new("value", json!("${ssm /some/param}"));
        let err = variable.resolve(&ctx).unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Variable(VariableError::UnknownLookup { .. })
        ));
    }

    #[test]
    fn test_missing_env_var_is_fatal() {
        let env = fixture_env();
        let variables = json!({});
        let lookups = LookupRegistry::default();
        let ctx = ResolutionContext {
            environment: &env,
            variables: &variables,
            lookups: &lookups,
        };

        let mut variable = Variable::new("value", json!("${env NOT_SET_ANYWHERE}"));
        let err = variable.resolve(&ctx).unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Variable(VariableError::LookupFailed { .. })
        ));
    }
}
