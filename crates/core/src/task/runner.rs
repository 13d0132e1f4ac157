//! Base trait for bulk operation implementations.
//!
//! Defines the common interface that export and import pipelines implement so the
//! command layer can drive them uniformly.

/// Trait for executing bulk operations asynchronously.
///
/// A runner consumes itself, performs all of its work and reports a summary value.
pub trait Runner {
    /// Summary produced when the run completes.
    type Output;
    /// Error type for failures that abort the whole run.
    type Error;

    /// Executes the operation until completion or a fatal error.
    ///
    /// # Returns
    /// The run summary or an error if the operation could not be carried out at all
    fn run(self) -> impl std::future::Future<Output = Result<Self::Output, Self::Error>> + Send
    where
        Self: Sized;
}
