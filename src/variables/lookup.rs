//! Lookup handlers and their registry.
//!
//! A lookup is a `${handler-name query}` expression embedded in
//! configuration. Handlers are plain trait objects keyed by name; the
//! registry owns dispatch and the built-in `env` and `var` handlers.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Result, VariableError};

use super::ResolutionContext;

/// A named lookup handler.
pub trait LookupHandler: Send + Sync {
    /// The handler's registry key (the word before the query).
    fn name(&self) -> &'static str;

    /// Resolves a query into a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be satisfied.
    fn handle(&self, query: &str, ctx: &ResolutionContext<'_>) -> Result<Value>;
}

/// Registry of lookup handlers keyed by name.
pub struct LookupRegistry {
    handlers: HashMap<&'static str, Box<dyn LookupHandler>>,
}

impl LookupRegistry {
    /// Creates an empty registry with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler, replacing any existing one with the same name.
    pub fn register(&mut self, handler: Box<dyn LookupHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Dispatches a lookup to its registered handler.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::UnknownLookup`] for an unregistered name, or
    /// the handler's own error.
    pub fn resolve(
        &self,
        lookup_name: &str,
        query: &str,
        ctx: &ResolutionContext<'_>,
        variable_name: &str,
    ) -> Result<Value> {
        let handler = self.handlers.get(lookup_name).ok_or_else(|| {
            VariableError::UnknownLookup {
                lookup: lookup_name.to_string(),
                variable: variable_name.to_string(),
            }
        })?;
        handler.handle(query, ctx)
    }
}

impl Default for LookupRegistry {
    /// Creates a registry with the built-in `env` and `var` handlers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(EnvLookup));
        registry.register(Box::new(VarLookup));
        registry
    }
}

impl std::fmt::Debug for LookupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("LookupRegistry")
            .field("handlers", &names)
            .finish()
    }
}

/// Looks up a variable from the deploy environment's process variables.
struct EnvLookup;

impl LookupHandler for EnvLookup {
    fn name(&self) -> &'static str {
        "env"
    }

    fn handle(&self, query: &str, ctx: &ResolutionContext<'_>) -> Result<Value> {
        ctx.environment
            .var(query)
            .map(|value| Value::String(value.to_string()))
            .ok_or_else(|| {
                VariableError::LookupFailed {
                    lookup: String::from("env"),
                    query: query.to_string(),
                    message: String::from("environment variable is not set"),
                }
                .into()
            })
    }
}

/// Looks up a dotted path within the run's variables document.
struct VarLookup;

impl LookupHandler for VarLookup {
    fn name(&self) -> &'static str {
        "var"
    }

    fn handle(&self, query: &str, ctx: &ResolutionContext<'_>) -> Result<Value> {
        let mut current = ctx.variables;
        for segment in query.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| missing_key(query, segment))?,
                Value::Array(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| missing_key(query, segment))?;
                    items.get(index).ok_or_else(|| missing_key(query, segment))?
                }
                _ => return Err(missing_key(query, segment)),
            };
        }
        Ok(current.clone())
    }
}

/// Builds the error for a missing segment in a `var` query.
fn missing_key(query: &str, segment: &str) -> crate::error::RunwayError {
    VariableError::LookupFailed {
        lookup: String::from("var"),
        query: query.to_string(),
        message: format!("key '{segment}' not found in the variables document"),
    }
    .into()
}
