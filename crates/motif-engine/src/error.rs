use motif_contracts::wire::ErrorResponse;
use motif_contracts::{DataUriError, ParamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Configuration,
    Upstream,
    Transport,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or missing caller input. Never retried.
    #[error("{0}")]
    Validation(String),
    /// A credential the operation needs is not configured.
    #[error("Server missing {0}")]
    Configuration(&'static str),
    /// Non-2xx or malformed response from a collaborator.
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        details: Option<String>,
    },
    /// Network-level failure before a response arrived.
    #[error("{context}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn upstream_with_details(
        status: Option<u16>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        let details = details.into();
        Self::Upstream {
            status,
            message: message.into(),
            details: Some(details).filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Transport { .. } => ErrorKind::Transport,
        }
    }

    /// Status code the HTTP surface answers with.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Configuration => 500,
            ErrorKind::Upstream | ErrorKind::Transport => 502,
        }
    }

    /// Status reported by the collaborator, when one answered.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            Self::Upstream { details, .. } => details.clone(),
            Self::Transport { source, .. } => Some(source.to_string()),
            _ => None,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            details: self.details(),
        }
    }
}

impl From<DataUriError> for GatewayError {
    fn from(err: DataUriError) -> Self {
        Self::Validation(format!("Invalid image data: {err}"))
    }
}

impl From<ParamError> for GatewayError {
    fn from(err: ParamError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(GatewayError::validation("Missing prompt").http_status(), 400);
        assert_eq!(GatewayError::Configuration("PRODIA_API_KEY").http_status(), 500);
        assert_eq!(GatewayError::upstream(Some(503), "down").http_status(), 502);
    }

    #[test]
    fn configuration_error_names_the_missing_credential() {
        let err = GatewayError::Configuration("PRODIA_API_KEY");
        assert_eq!(err.to_string(), "Server missing PRODIA_API_KEY");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_response().details, None);
    }

    #[test]
    fn upstream_details_are_dropped_when_blank() {
        let err = GatewayError::upstream_with_details(Some(500), "Replicate API error", "  ");
        assert_eq!(err.details(), None);
        assert_eq!(err.upstream_status(), Some(500));

        let err = GatewayError::upstream_with_details(None, "Replicate prediction failed", "OOM");
        assert_eq!(
            err.to_response(),
            ErrorResponse {
                error: "Replicate prediction failed".to_string(),
                details: Some("OOM".to_string()),
            }
        );
    }

    #[test]
    fn data_uri_errors_become_validation_errors() {
        let err: GatewayError = DataUriError::MissingScheme.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().starts_with("Invalid image data"));
    }
}
