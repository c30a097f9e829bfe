// src/infra/errors.rs — Error types for Vendora

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VendoraError {
    // Session errors
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Session rejected by the server (401). Log in again.")]
    Unauthorized,

    // Persistence errors
    #[error("Repository error: {message}")]
    Repository { message: String },

    // Assistant run errors
    #[error("Assistant run failed: {message}")]
    Run {
        message: String,
        token_limited: bool,
    },

    #[error("Assistant run timed out after {waited_secs}s")]
    RunTimeout { waited_secs: u64 },

    // Report errors (empty result is a distinct, user-visible outcome)
    #[error("Report unavailable: {message}")]
    Report { message: String, empty: bool },

    // Lookup errors (per-source, isolated by the caller)
    #[error("Lookup against '{source_name}' failed: {message}")]
    Lookup { source_name: String, message: String },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VendoraError {
    /// Whether this failure is the context-length subtype that triggers
    /// history eviction and a single resend.
    pub fn is_token_limited(&self) -> bool {
        match self {
            VendoraError::Run { token_limited, .. } => *token_limited,
            _ => false,
        }
    }

    /// Whether the caller must force a logout.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, VendoraError::Unauthorized)
    }

    /// Whether a report failure means "no matching products" rather than a
    /// transport problem.
    pub fn is_empty_report(&self) -> bool {
        matches!(self, VendoraError::Report { empty: true, .. })
    }

    /// Classify an assistant failure message into the run error, detecting
    /// the token/context-limit subtype by substring (the workflow backend
    /// reports it as free text).
    pub fn run_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let token_limited = lower.contains("token") && lower.contains("limit");
        VendoraError::Run {
            message,
            token_limited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failure_detects_token_limit() {
        let e = VendoraError::run_failure("request exceeds the model token limit");
        assert!(e.is_token_limited());
    }

    #[test]
    fn test_run_failure_plain_error_not_token_limited() {
        let e = VendoraError::run_failure("upstream returned 502");
        assert!(!e.is_token_limited());
    }

    #[test]
    fn test_run_failure_needs_both_substrings() {
        assert!(!VendoraError::run_failure("rate limit reached").is_token_limited());
        assert!(!VendoraError::run_failure("invalid token").is_token_limited());
    }

    #[test]
    fn test_empty_report_flag() {
        let e = VendoraError::Report {
            message: "no products found".into(),
            empty: true,
        };
        assert!(e.is_empty_report());
        let e = VendoraError::Report {
            message: "HTTP 503".into(),
            empty: false,
        };
        assert!(!e.is_empty_report());
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(VendoraError::Unauthorized.is_unauthorized());
        assert!(!VendoraError::run_failure("boom").is_unauthorized());
    }
}
