//! Environment gating: should this module run here at all?
//!
//! A module's `environments` definition decides whether it runs for the
//! current deploy environment, account, and region. The accepted shapes
//! are modeled as a closed union ([`GateDefinition`]) and evaluated
//! recursively into enabled, disabled-with-reason, or deferred (the
//! orchestrator has no opinion and the handler decides).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Reason attached to a disabled gate outcome on account/region mismatch.
pub const MISMATCH_REASON: &str = "account_id/region mismatch";

/// The accepted shapes of an `environments` definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GateDefinition {
    /// Explicitly enabled or disabled.
    Explicit(bool),
    /// An account id to match numerically.
    Account(i64),
    /// A matcher string: `accountId/region`, `accountId`, or `region`.
    Matcher(String),
    /// A list of matchers; any match enables.
    AnyOf(Vec<GateDefinition>),
    /// Keyed by deploy-environment name; the matched entry is evaluated
    /// recursively.
    Keyed(BTreeMap<String, GateDefinition>),
    /// Anything else: unsupported, disables with a warning.
    Other(Value),
}

impl GateDefinition {
    /// Parses a resolved configuration value into a gate definition.
    ///
    /// `Null` means "no definition" and yields `None`; the caller treats
    /// that as absent.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Inputs to one gate evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// The current deploy-environment name.
    pub environment: &'a str,
    /// The validated AWS account id, when known.
    pub account_id: Option<&'a str>,
    /// The current region.
    pub region: &'a str,
    /// Treat a missing environment entry as "skip" instead of deferring.
    pub strict: bool,
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The module runs, explicitly enabled.
    Enabled,
    /// The module is skipped, with the reason to log.
    Disabled(String),
    /// No definition applies; the decision is deferred to the handler.
    Deferred,
}

impl GateOutcome {
    /// Returns true when the module should be skipped.
    #[must_use]
    pub const fn should_skip(&self) -> bool {
        matches!(self, Self::Disabled(_))
    }

    /// The value handed to the handler: `Some(true)` when explicitly
    /// enabled, `None` when deferred.
    #[must_use]
    pub const fn explicitly_enabled(&self) -> Option<bool> {
        match self {
            Self::Enabled => Some(true),
            Self::Disabled(_) => Some(false),
            Self::Deferred => None,
        }
    }
}

/// Evaluates a gate definition for the current context.
///
/// An absent definition defers to the handler unless strict mode is on, in
/// which case it disables.
#[must_use]
pub fn evaluate(definition: Option<&GateDefinition>, ctx: &GateContext<'_>) -> GateOutcome {
    let Some(definition) = definition else {
        if ctx.strict {
            return GateOutcome::Disabled(String::from("environment definition missing"));
        }
        return GateOutcome::Deferred;
    };

    match definition {
        GateDefinition::Explicit(true) => GateOutcome::Enabled,
        GateDefinition::Explicit(false) => {
            GateOutcome::Disabled(String::from("explicitly disabled"))
        }
        GateDefinition::Keyed(map) => match map.get(ctx.environment) {
            Some(entry) => evaluate(Some(entry), ctx),
            None => {
                if ctx.strict {
                    GateOutcome::Disabled(format!(
                        "environment '{}' not in definition",
                        ctx.environment
                    ))
                } else {
                    GateOutcome::Deferred
                }
            }
        },
        GateDefinition::Account(account) => scalar_outcome(&account.to_string(), ctx),
        GateDefinition::Matcher(matcher) => scalar_outcome(matcher, ctx),
        GateDefinition::AnyOf(entries) => {
            let matched = entries.iter().any(|entry| match entry {
                GateDefinition::Account(account) => scalar_matches(&account.to_string(), ctx),
                GateDefinition::Matcher(matcher) => scalar_matches(matcher, ctx),
                other => {
                    warn!("Ignoring unsupported entry in environments list: {other:?}");
                    false
                }
            });
            if matched {
                GateOutcome::Enabled
            } else {
                GateOutcome::Disabled(String::from(MISMATCH_REASON))
            }
        }
        GateDefinition::Other(value) => {
            let kind = match value {
                Value::Null => "null",
                Value::Number(_) => "number",
                _ => "unsupported",
            };
            warn!("Unsupported environments definition type ({kind}): {value}");
            GateOutcome::Disabled(format!("unsupported environments definition type: {kind}"))
        }
    }
}

/// Evaluates one scalar matcher to an outcome.
fn scalar_outcome(matcher: &str, ctx: &GateContext<'_>) -> GateOutcome {
    if scalar_matches(matcher, ctx) {
        GateOutcome::Enabled
    } else {
        GateOutcome::Disabled(String::from(MISMATCH_REASON))
    }
}

/// Matches a scalar against the current account/region candidate set:
/// `accountId/region`, `accountId`, `region`, and the numeric form of the
/// account id.
fn scalar_matches(matcher: &str, ctx: &GateContext<'_>) -> bool {
    if matcher == ctx.region {
        return true;
    }
    let Some(account) = ctx.account_id else {
        return false;
    };
    if matcher == account {
        return true;
    }
    if matcher == format!("{account}/{}", ctx.region) {
        return true;
    }
    // Both match forms are accepted: the string form above and numeric
    // equality, which tolerates a leading-zero mismatch in either spelling.
    if let (Ok(lhs), Ok(rhs)) = (matcher.parse::<i64>(), account.parse::<i64>()) {
        return lhs == rhs;
    }
    false
}

/// Merges a deployment-level definition under a module-level one.
///
/// When both sides are environment-keyed maps they merge per key with the
/// module winning; otherwise a present module value replaces the
/// deployment default entirely.
#[must_use]
pub fn merge_definitions(deployment: &Value, module: &Value) -> Value {
    match (deployment, module) {
        (_, Value::Null) => deployment.clone(),
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => module.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(environment: &'a str, account_id: Option<&'a str>, region: &'a str) -> GateContext<'a> {
        GateContext {
            environment,
            account_id,
            region,
            strict: false,
        }
    }

    fn eval(value: Value, ctx: &GateContext<'_>) -> GateOutcome {
        evaluate(GateDefinition::from_value(&value).as_ref(), ctx)
    }

    #[test]
    fn test_true_enables() {
        let outcome = eval(json!(true), &ctx("dev", None, "us-east-1"));
        assert_eq!(outcome, GateOutcome::Enabled);
        assert_eq!(outcome.explicitly_enabled(), Some(true));
    }

    #[test]
    fn test_false_disables() {
        let outcome = eval(json!(false), &ctx("dev", None, "us-east-1"));
        assert!(outcome.should_skip());
    }

    #[test]
    fn test_absent_defers_unless_strict() {
        let context = ctx("dev", None, "us-east-1");
        assert_eq!(evaluate(None, &context), GateOutcome::Deferred);

        let strict = GateContext { strict: true, ..context };
        assert!(evaluate(None, &strict).should_skip());
    }

    #[test]
    fn test_empty_map_follows_missing_key_rules() {
        let context = ctx("dev", None, "us-east-1");
        assert_eq!(eval(json!({}), &context), GateOutcome::Deferred);

        let strict = GateContext { strict: true, ..context };
        assert!(eval(json!({}), &strict).should_skip());
    }

    #[test]
    fn test_keyed_entry_recurses() {
        let definition = json!({"prod": true, "dev": false});
        assert_eq!(
            eval(definition.clone(), &ctx("prod", None, "us-east-1")),
            GateOutcome::Enabled
        );
        assert!(eval(definition, &ctx("dev", None, "us-east-1")).should_skip());
    }

    #[test]
    fn test_account_region_pair_matches() {
        let definition = json!({"prod": "123456789012/us-east-1"});
        assert_eq!(
            eval(
                definition.clone(),
                &ctx("prod", Some("123456789012"), "us-east-1")
            ),
            GateOutcome::Enabled
        );

        let outcome = eval(definition, &ctx("prod", Some("123456789012"), "us-west-2"));
        assert_eq!(outcome, GateOutcome::Disabled(String::from(MISMATCH_REASON)));
    }

    #[test]
    fn test_account_id_string_matches() {
        let definition = json!({"prod": "111111111111"});
        assert_eq!(
            eval(
                definition.clone(),
                &ctx("prod", Some("111111111111"), "us-east-1")
            ),
            GateOutcome::Enabled
        );

        let outcome = eval(definition, &ctx("prod", Some("222222222222"), "us-east-1"));
        assert_eq!(outcome, GateOutcome::Disabled(String::from(MISMATCH_REASON)));
    }

    #[test]
    fn test_account_id_numeric_form_matches() {
        let definition = json!({"prod": 111_111_111_111_i64});
        assert_eq!(
            eval(definition, &ctx("prod", Some("111111111111"), "us-east-1")),
            GateOutcome::Enabled
        );
    }

    #[test]
    fn test_region_alone_matches_without_account() {
        let definition = json!(["us-east-1", "eu-west-1"]);
        assert_eq!(
            eval(definition.clone(), &ctx("dev", None, "us-east-1")),
            GateOutcome::Enabled
        );
        assert!(eval(definition, &ctx("dev", None, "ap-southeast-2")).should_skip());
    }

    #[test]
    fn test_unsupported_type_disables_with_reason() {
        let outcome = eval(json!(1.5), &ctx("dev", None, "us-east-1"));
        let GateOutcome::Disabled(reason) = outcome else {
            panic!("expected disabled");
        };
        assert!(reason.contains("unsupported"));
    }

    #[test]
    fn test_merge_module_wins_per_key() {
        let deployment = json!({"dev": true, "prod": true});
        let module = json!({"prod": false});
        assert_eq!(
            merge_definitions(&deployment, &module),
            json!({"dev": true, "prod": false})
        );
        assert_eq!(merge_definitions(&deployment, &Value::Null), deployment);
        assert_eq!(merge_definitions(&deployment, &json!(true)), json!(true));
    }
}
