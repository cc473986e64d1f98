use eyre::Result;
use tokio::sync::Semaphore;

use crate::{config::models::ContextSettings, core::service_properties::split_service_uri};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid service uri for '{name}': {reason}")]
    InvalidServiceUri { name: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Context settings validator
pub struct SettingsValidator;

impl SettingsValidator {
    /// Validate the context settings, reporting every problem at once
    pub fn validate(settings: &ContextSettings) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if settings.subsystem.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "subsystem".to_string(),
            });
        }

        match settings.bind_attempt_interval() {
            Ok(interval) if interval.is_zero() => errors.push(ValidationError::InvalidField {
                field: "bean_bind_attempt_interval".to_string(),
                message: "must be greater than zero".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        match settings.lease_renew_interval() {
            Ok(interval) if interval.is_zero() => errors.push(ValidationError::InvalidField {
                field: "service_lease_renew_interval".to_string(),
                message: "must be greater than zero".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        if settings.bind_worker_pool_size == 0 {
            errors.push(ValidationError::InvalidField {
                field: "bind_worker_pool_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        } else if settings.bind_worker_pool_size > Semaphore::MAX_PERMITS {
            errors.push(ValidationError::InvalidField {
                field: "bind_worker_pool_size".to_string(),
                message: format!("must be at most {}", Semaphore::MAX_PERMITS),
            });
        }

        for (name, uri) in &settings.services {
            if let Err(e) = split_service_uri(uri) {
                errors.push(ValidationError::InvalidServiceUri {
                    name: name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_defaults() {
        assert!(SettingsValidator::validate(&ContextSettings::default()).is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let settings = ContextSettings {
            bean_bind_attempt_interval: "0s".to_string(),
            ..ContextSettings::default()
        };
        let err = SettingsValidator::validate(&settings).unwrap_err();
        assert!(err.to_string().contains("bean_bind_attempt_interval"));
    }

    #[test]
    fn validate_rejects_empty_subsystem() {
        let settings = ContextSettings {
            subsystem: "  ".to_string(),
            ..ContextSettings::default()
        };
        assert!(SettingsValidator::validate(&settings).is_err());
    }

    #[test]
    fn validate_rejects_pool_size_beyond_semaphore_limit() {
        let settings = ContextSettings {
            bind_worker_pool_size: Semaphore::MAX_PERMITS + 1,
            ..ContextSettings::default()
        };
        match SettingsValidator::validate(&settings) {
            Err(ValidationError::ValidationFailed { message }) => {
                assert!(message.contains("bind_worker_pool_size"));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }

        let at_limit = ContextSettings {
            bind_worker_pool_size: Semaphore::MAX_PERMITS,
            ..ContextSettings::default()
        };
        assert!(SettingsValidator::validate(&at_limit).is_ok());
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut settings = ContextSettings {
            bind_worker_pool_size: 0,
            service_lease_renew_interval: "later".to_string(),
            ..ContextSettings::default()
        };
        settings
            .services
            .insert("quotes".to_string(), "no-colon".to_string());

        match SettingsValidator::validate(&settings) {
            Err(ValidationError::ValidationFailed { message }) => {
                assert!(message.starts_with("Found 3 validation errors"));
                assert!(message.contains("quotes"));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_well_formed_service_uris() {
        let mut settings = ContextSettings::default();
        settings
            .services
            .insert("quotes".to_string(), "direct:1".to_string());
        assert!(SettingsValidator::validate(&settings).is_ok());
    }
}
