//! Request context providing per-call output and warning behaviour.
//!
//! Every transport and override-engine call receives a `RequestContext` by reference.
//! Nested calls that must stay quiet (metadata lookups made while resolving overrides)
//! derive a silenced copy instead of toggling shared state.

/// Errors that can occur during RequestContext operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Required builder attribute was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// Context information for a single logical operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Name of the operation, used for log fields.
    pub operation: String,
    /// Whether response bodies are printed to stdout.
    pub print_output: bool,
    /// Whether recoverable warnings are logged.
    pub suppress_warnings: bool,
}

impl RequestContext {
    /// Returns a copy of this context that never prints responses.
    pub fn silenced(&self) -> Self {
        Self {
            print_output: false,
            ..self.clone()
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            operation: "default".to_string(),
            print_output: false,
            suppress_warnings: false,
        }
    }
}

/// Builder for constructing RequestContext instances.
#[derive(Default)]
pub struct RequestContextBuilder {
    /// Operation name (required for build).
    operation: Option<String>,
    /// Whether response bodies are printed.
    print_output: bool,
    /// Whether warnings are suppressed.
    suppress_warnings: bool,
}

impl RequestContextBuilder {
    /// Creates a new RequestContextBuilder with default values.
    pub fn new() -> Self {
        Self {
            print_output: true,
            ..Default::default()
        }
    }

    /// Sets the operation name.
    ///
    /// # Arguments
    /// * `operation` - Name used in log fields for every call made with this context
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets whether response bodies are printed to stdout.
    pub fn print_output(mut self, enabled: bool) -> Self {
        self.print_output = enabled;
        self
    }

    /// Sets whether recoverable warnings are logged.
    pub fn suppress_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }

    /// Builds the RequestContext instance.
    ///
    /// # Errors
    /// Returns `Error::MissingRequiredAttribute` if the operation name is not set.
    pub fn build(self) -> Result<RequestContext, Error> {
        Ok(RequestContext {
            operation: self
                .operation
                .ok_or_else(|| Error::MissingRequiredAttribute("operation".to_string()))?,
            print_output: self.print_output,
            suppress_warnings: self.suppress_warnings,
        })
    }
}
