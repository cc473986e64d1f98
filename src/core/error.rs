use std::time::Duration;

use thiserror::Error;

use crate::core::bean::{BeanKey, BeanType};

/// Plugin lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PluginError {
    #[error("No plugin registered for {plugin_type} and no default plugin available")]
    MissingPlugin { plugin_type: &'static str },

    #[error("Expected exactly one plugin for {plugin_type}, found {count}")]
    MultiplePlugins {
        plugin_type: &'static str,
        count: usize,
    },
}

/// Errors raised while resolving, creating or invoking beans
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BeanError {
    #[error("No provider registered for bean {bean}")]
    MissingProvider { bean: BeanKey },

    #[error("Bean {dependent} depends on {missing}, but no provider is registered for it")]
    MissingDependency { dependent: BeanKey, missing: BeanKey },

    #[error("Circular bean dependency detected: {root} is reachable from its own dependency {node}")]
    CircularDependency { root: BeanType, node: BeanType },

    #[error("A provider for bean {bean} is already registered")]
    DuplicateProvider { bean: BeanKey },

    #[error("Bean {dependent} requested {dependency}, which it never declared as a dependency")]
    UndeclaredDependency {
        dependent: BeanKey,
        dependency: BeanKey,
    },

    #[error(
        "Illegal subsystem boundary: consumer in subsystem '{consumer}' may not use non-versioned {bean_type} provided by subsystem '{provider}'"
    )]
    IllegalSubsystem {
        consumer: String,
        provider: String,
        bean_type: BeanType,
    },

    #[error("Service unavailable: bean {bean} (bean_id={bean_id}) {reason}")]
    ServiceUnavailable {
        bean: BeanKey,
        bean_id: u64,
        reason: &'static str,
    },

    #[error("Illegal service metadata for bean {bean} (bean_id={bean_id}): {message}")]
    IllegalServiceMetadata {
        bean: BeanKey,
        bean_id: u64,
        message: String,
    },

    #[error("Bean {bean} was not bound within {timeout:?}")]
    BindTimeout { bean: BeanKey, timeout: Duration },

    #[error("Bean {bean} cannot be used as {requested}")]
    IncompatibleInstance { bean: BeanKey, requested: BeanType },

    #[error("Failed to create bean {bean}: {source}")]
    CreationFailed {
        bean: BeanKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Astrix context is destroyed, cannot provide bean {bean}")]
    ContextDestroyed { bean: BeanKey },

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl BeanError {
    /// Reattribute a missing provider to the bean that declared the dependency.
    pub(crate) fn as_missing_dependency(self, dependent: &BeanKey, missing: &BeanKey) -> Self {
        match self {
            Self::MissingProvider { .. } => Self::MissingDependency {
                dependent: dependent.clone(),
                missing: missing.clone(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_names_both_members() {
        let err = BeanError::CircularDependency {
            root: BeanType::of::<u32>(),
            node: BeanType::of::<String>(),
        };
        let message = err.to_string();
        assert!(message.contains("u32"));
        assert!(message.contains("String"));
    }

    #[test]
    fn test_illegal_subsystem_names_both_subsystems() {
        let err = BeanError::IllegalSubsystem {
            consumer: "trading".to_string(),
            provider: "accounts".to_string(),
            bean_type: BeanType::of::<u32>(),
        };
        let message = err.to_string();
        assert!(message.contains("trading"));
        assert!(message.contains("accounts"));
    }

    #[test]
    fn test_missing_provider_becomes_missing_dependency() {
        let dependent = BeanKey::of::<u32>();
        let missing = BeanKey::of::<String>();
        let err = BeanError::MissingProvider {
            bean: missing.clone(),
        }
        .as_missing_dependency(&dependent, &missing);
        assert!(matches!(
            err,
            BeanError::MissingDependency { dependent: d, missing: m } if d == dependent && m == missing
        ));
    }
}
