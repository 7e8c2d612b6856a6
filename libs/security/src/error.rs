use http::StatusCode;

/// A rejected request
///
/// `Display` shows only the client-facing message. The operator-facing detail
/// is kept separately and written to the local log when the error is raised.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub status: StatusCode,
    pub message: String,
    detail: String,
}

impl AuthError {
    pub fn forbidden(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// What actually went wrong, never sent to the client
    pub fn detail(&self) -> &str {
        &self.detail
    }
}
