use super::{ErrorList, ErrorReason, GoogleError};

/// The structure of an error response returned by Google.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// A container for the error information.
    pub error: ErrorList,
}

impl ErrorResponse {
    /// Return list of errors returned by Google.
    pub fn errors(&self) -> &[GoogleError] {
        &self.error.errors
    }

    /// Check whether errors contain given reason.
    pub fn errors_has_reason(&self, reason: &ErrorReason) -> bool {
        self.errors()
            .iter()
            .any(|google_error| google_error.is_reason(reason))
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{} ({})", self.error.message, self.error.code)
    }
}

impl std::error::Error for ErrorResponse {}
