use std::fmt;

use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure reported by an AWS API, reduced to its error code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    code: Option<String>,
    message: String,
}

impl ProviderError {
    pub fn new<S: Into<String>>(code: Option<&str>, message: S) -> ProviderError {
        ProviderError {
            code: code.map(|s| s.to_string()),
            message: message.into(),
        }
    }

    pub fn message<S: Into<String>>(message: S) -> ProviderError {
        ProviderError::new(None, message)
    }

    pub fn from_sdk<E>(err: E) -> ProviderError
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let message = err
            .message()
            .map(|s| s.to_string())
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
        ProviderError::new(err.code(), message)
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to register client: {0}")]
    RegistrationFailed(#[source] ProviderError),

    #[error("failed to start device authorization: {0}")]
    AuthorizationStartFailed(#[source] ProviderError),

    #[error("authentication timed out after {0} seconds")]
    AuthenticationTimedOut(u64),

    #[error("authentication cancelled")]
    AuthenticationCancelled,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[source] ProviderError),

    #[error("failed to list accounts: {0}")]
    AccountListFailed(#[source] ProviderError),

    #[error("failed to list roles of account {account_id}: {source}")]
    RoleListFailed {
        account_id: String,
        source: ProviderError,
    },

    #[error("failed to assume role {role_name} in account {account_id}: {source}")]
    RoleAssumptionFailed {
        account_id: String,
        role_name: String,
        source: ProviderError,
    },

    #[error("failed to list Lambda functions: {0}")]
    DirectoryListFailed(#[source] ProviderError),

    #[error("failed to invoke Lambda function {function_name}: {source}")]
    InvocationFailed {
        function_name: String,
        source: ProviderError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_provider_message() {
        let err = Error::InvocationFailed {
            function_name: "deploy".to_string(),
            source: ProviderError::new(
                Some("ResourceNotFoundException"),
                "Function not found: deploy",
            ),
        };
        assert_eq!(
            "failed to invoke Lambda function deploy: Function not found: deploy (ResourceNotFoundException)",
            err.to_string()
        );
    }

    #[test]
    fn provider_error_without_code() {
        let err = ProviderError::message("dispatch failure");
        assert_eq!(None, err.code());
        assert_eq!("dispatch failure", err.to_string());
    }
}
