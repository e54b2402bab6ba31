//! Error types for the Xero MCP server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Authentication outcomes are always explicit `Result` values; the tool boundary turns
//! them into text for the agent instead of failing the process.

use std::time::Duration;

/// Errors from the authentication core (credential strategies, token store, PKCE flow).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing credentials, no stored tokens, or no connected organisation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The identity endpoint (or connections listing) rejected the credentials.
    #[error("Xero rejected the credentials ({status}): {message}")]
    AuthExchange {
        /// HTTP status returned by Xero
        status: u16,
        /// Error description from the response body
        message: String,
    },

    /// Code verifier did not match the challenge, or the method is unsupported.
    #[error("PKCE verification failed: {0}")]
    PkceVerification(String),

    /// The authorization callback was malformed, replayed, or reported an error.
    #[error("OAuth callback error: {0}")]
    CallbackProtocol(String),

    /// The interactive authorization flow exceeded its time budget.
    #[error("Authorization timed out after {0:?}")]
    Timeout(Duration),

    /// Connectivity failure or 5xx from the identity or connections endpoint.
    #[error("Network error talking to Xero: {0}")]
    TransientNetwork(String),

    /// The token file could not be written or deleted.
    #[error("Token storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an exchange rejection error.
    #[must_use]
    pub fn exchange(status: u16, message: impl Into<String>) -> Self {
        Self::AuthExchange { status, message: message.into() }
    }

    /// Create a callback protocol error.
    #[must_use]
    pub fn callback(message: impl Into<String>) -> Self {
        Self::CallbackProtocol(message.into())
    }

    /// Create a PKCE verification error.
    #[must_use]
    pub fn pkce(message: impl Into<String>) -> Self {
        Self::PkceVerification(message.into())
    }

    /// Create a transient network error.
    #[must_use]
    pub fn network(message: impl std::fmt::Display) -> Self {
        Self::TransientNetwork(message.to_string())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Returns true if the caller may retry after backing off.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Timeout(_))
    }

    /// Returns true if Xero refused the credential itself (400/401 from the token endpoint).
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::AuthExchange { status: 400 | 401, .. })
    }
}

/// Errors from the Xero accounting API client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Could not obtain a valid token or tenant before calling the API
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Rate limited by Xero (429 response)
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested wait time before retry
        retry_after: Duration,
    },

    /// Validation failure (400 response)
    #[error("Bad request: {message}")]
    BadRequest {
        /// Validation messages extracted from the Xero error body
        message: String,
    },

    /// Token rejected by the accounting API (401 response)
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Response detail
        message: String,
    },

    /// Missing scope or organisation permission (403 response)
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Response detail
        message: String,
    },

    /// Resource not found (404 response)
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Server error (5xx response)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ClientError {
    /// Create a rate limited error with retry-after duration.
    #[must_use]
    pub fn rate_limited(seconds: u64) -> Self {
        Self::RateLimited { retry_after: Duration::from_secs(seconds) }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Server { .. } => true,
            Self::Auth(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Human-readable explanation suitable for returning to the agent.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message } if !message.is_empty() => message.clone(),
            Self::BadRequest { .. } => {
                "Validation error from Xero. Please check your input.".to_string()
            }
            Self::Unauthorized { .. } => {
                "Authentication failed. Please check your Xero credentials.".to_string()
            }
            Self::Forbidden { .. } => {
                "You don't have permission to access this resource in Xero.".to_string()
            }
            Self::NotFound { .. } => "The requested resource was not found in Xero.".to_string(),
            Self::RateLimited { .. } => {
                "Too many requests to Xero. Please try again in a moment.".to_string()
            }
            Self::Server { message, .. } | Self::UnexpectedStatus { message, .. }
                if !message.is_empty() =>
            {
                message.clone()
            }
            Self::Server { .. } | Self::UnexpectedStatus { .. } => {
                "An error occurred while communicating with Xero.".to_string()
            }
            Self::Auth(err) => err.to_string(),
            _ => self.to_string(),
        }
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Error from the API client
    #[error("API error: {0}")]
    Client(#[from] ClientError),

    /// Error from the authentication core
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal tool logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Convert to a user-friendly error message for MCP response.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Client(err) => err.user_message(),
            Self::Auth(err) => err.to_string(),
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            Self::Serialization(err) => format!("Invalid arguments: {err}"),
            Self::Internal(_) => self.to_string(),
        }
    }
}

/// Errors from the HTTP session registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A non-initialize request referenced a session that does not exist.
    #[error("No active session - initialize first")]
    UnknownSession(String),

    /// A non-initialize request carried no session id at all.
    #[error("No valid session ID provided")]
    MissingSessionId,
}

/// Result type alias for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_retryable() {
        assert!(AuthError::network("connection refused").is_retryable());
        assert!(AuthError::Timeout(Duration::from_secs(300)).is_retryable());

        assert!(!AuthError::configuration("missing client id").is_retryable());
        assert!(!AuthError::exchange(401, "invalid_client").is_retryable());
        assert!(!AuthError::callback("state mismatch").is_retryable());
    }

    #[test]
    fn test_auth_error_rejection() {
        assert!(AuthError::exchange(400, "invalid_grant").is_rejection());
        assert!(AuthError::exchange(401, "invalid_client").is_rejection());
        assert!(!AuthError::exchange(403, "forbidden").is_rejection());
        assert!(!AuthError::network("reset").is_rejection());
    }

    #[test]
    fn test_client_error_retryable() {
        assert!(ClientError::rate_limited(60).is_retryable());
        assert!(ClientError::server(503, "unavailable").is_retryable());
        assert!(ClientError::Auth(AuthError::network("dns")).is_retryable());

        assert!(!ClientError::not_found("Contacts/abc").is_retryable());
        assert!(!ClientError::bad_request("Name is required").is_retryable());
    }

    #[test]
    fn test_client_error_retry_after() {
        let err = ClientError::rate_limited(60);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(ClientError::not_found("x").retry_after(), None);
    }

    #[test]
    fn test_user_messages_follow_status() {
        assert_eq!(
            ClientError::Unauthorized { message: String::new() }.user_message(),
            "Authentication failed. Please check your Xero credentials."
        );
        assert_eq!(
            ClientError::Forbidden { message: String::new() }.user_message(),
            "You don't have permission to access this resource in Xero."
        );
        assert_eq!(
            ClientError::not_found("Invoices/1").user_message(),
            "The requested resource was not found in Xero."
        );
        assert_eq!(
            ClientError::rate_limited(5).user_message(),
            "Too many requests to Xero. Please try again in a moment."
        );
        assert_eq!(
            ClientError::bad_request("").user_message(),
            "Validation error from Xero. Please check your input."
        );
        assert_eq!(
            ClientError::server(502, "").user_message(),
            "An error occurred while communicating with Xero."
        );
    }

    #[test]
    fn test_tool_error_user_message() {
        let err = ToolError::validation("name", "cannot be empty");
        assert!(err.to_user_message().contains("name"));
        assert!(err.to_user_message().contains("cannot be empty"));

        let err = ToolError::Client(ClientError::bad_request("Email address is invalid"));
        assert_eq!(err.to_user_message(), "Email address is invalid");
    }

    #[test]
    fn test_session_error_message() {
        assert_eq!(
            SessionError::UnknownSession("abc".into()).to_string(),
            "No active session - initialize first"
        );
    }
}
