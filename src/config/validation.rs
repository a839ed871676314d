use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::models::{BackendConfig, LoggingConfig, ServerConfig, ServerLimits};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem found
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }
        errors.extend(Self::validate_limits(&config.server));
        errors.extend(Self::validate_backend(&config.backend));
        errors.extend(Self::validate_logging(&config.logging));

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "listen_addr".to_string(),
            });
        }
        address
            .parse::<SocketAddr>()
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })
    }

    fn validate_limits(limits: &ServerLimits) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if limits.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "server.max_body_bytes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        errors
    }

    fn validate_backend(backend: &BackendConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if backend.timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "backend.timeout_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if backend.source_vars.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "backend.source_vars".to_string(),
            });
        }
        for (i, name) in backend.source_vars.iter().enumerate() {
            if name.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("backend.source_vars[{i}]"),
                    message: "variable name must not be blank".to_string(),
                });
            }
        }

        errors
    }

    fn validate_logging(logging: &LoggingConfig) -> Vec<ValidationError> {
        match EnvFilter::try_new(&logging.level) {
            Ok(_) => Vec::new(),
            Err(e) => vec![ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfigValidator::validate(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let config = ServerConfig::builder().listen_addr("not-an-address").build();
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidListenAddress { .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig::builder().timeout_ms(0).build();
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidField {
                field: "backend.timeout_ms".to_string(),
                message: "must be greater than 0".to_string(),
            }
        );
    }

    #[test]
    fn test_blank_source_var_rejected() {
        let config = ServerConfig::builder()
            .source_vars(["INCIDENT_BACKEND_URL", "  "])
            .build();
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("backend.source_vars[1]"));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let config = ServerConfig::builder()
            .listen_addr("")
            .timeout_ms(0)
            .max_body_bytes(0)
            .source_vars(Vec::<String>::new())
            .build();

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("listen_addr"));
        assert!(message.contains("backend.timeout_ms"));
        assert!(message.contains("server.max_body_bytes"));
        assert!(message.contains("backend.source_vars"));
    }
}
