//! Agent error taxonomy.

/// Errors surfaced by the external collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// An assigned executor identity does not resolve against the roster
    #[error("executor `{0}` is not in the roster")]
    ExecutorNotFound(String),

    /// Executor invocation failed; there is no partial-output contract
    #[error("executor failed: {0}")]
    Executor(String),

    /// Decomposition failed or produced an unusable plan
    #[error("decomposition failed: {0}")]
    Decomposition(String),

    /// Planning failed or produced unusable assignments
    #[error("planning failed: {0}")]
    Planning(String),

    /// Review synthesis failed
    #[error("synthesis failed: {0}")]
    Synthesis(String),
}
