#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials or other settings are missing. The user must fix the settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Bad input from the caller (missing signer data, bad template settings, ...).
    #[error("validation error: {0}")]
    Validation(String),
    #[error("no active signature template is available")]
    NoTemplateAvailable,
    #[error("invalid signature template: {0}")]
    InvalidTemplate(String),
    #[error("could not generate the quotation PDF: {0}")]
    RenderingFailure(String),
    #[error("could not inspect the PDF: {0}")]
    PdfInspection(#[from] lopdf::Error),
    #[error("could not determine the page for the signature")]
    PageUndeterminable,
    /// The provider answered with a non-2xx status.
    #[error("API error: {status}\nResponse:\n{body}")]
    Provider { status: u16, body: String },
    /// Timeout, DNS or connection failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// A 2xx response that does not contain what the contract promises.
    #[error("unexpected response from provider: {0}")]
    UnexpectedResponse(String),
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    /// A host collaborator (record store, attachment store, ...) failed.
    #[error("host error: {0}")]
    Host(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::UnexpectedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_shows_status_and_body() {
        let err = Error::Provider {
            status: 401,
            body: "{\n  \"message\": \"Unauthorized\"\n}".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "API error: 401\nResponse:\n{\n  \"message\": \"Unauthorized\"\n}"
        );
    }

    #[test]
    fn lopdf_errors_become_inspection_errors() {
        let err: Error = lopdf::Error::Header.into();
        assert!(matches!(err, Error::PdfInspection(_)));
    }
}
