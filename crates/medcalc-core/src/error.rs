//! Error taxonomy for the calculator plugin runtime
//!
//! This module provides structured error types for every runtime operation,
//! with category, severity and recoverability accessors consumed by the
//! classification and recovery service.

use std::fmt;
use thiserror::Error;

/// Structured error type for plugin runtime operations
#[derive(Error, Debug, Clone)]
pub enum PluginError {
    /// Plugin metadata/config shape or input validation errors
    #[error("Plugin validation error: {message}")]
    Validation { message: String, plugin_id: Option<String>, field: Option<String> },

    /// Registration conflicts on the `(namespace, id)` key
    #[error("Plugin conflict: {message}")]
    Conflict {
        message: String,
        plugin_key: Option<String>,
        existing_version: Option<String>,
    },

    /// Missing or failed plugin dependencies
    #[error("Dependency error: {message}")]
    Dependency { message: String, plugin_id: Option<String>, dependency: Option<String> },

    /// Calculation or validation exceeded its allotted time
    #[error("Plugin timeout: {message}")]
    Timeout {
        message: String,
        plugin_id: Option<String>,
        namespace: Option<String>,
        operation: Option<String>,
        timeout_ms: Option<u64>,
    },

    /// Version requirements that cannot be satisfied
    #[error("Version conflict: {message}")]
    Version {
        message: String,
        plugin_id: Option<String>,
        required: Option<String>,
        found: Option<String>,
    },

    /// Discovery and loading failures
    #[error("Plugin load error: {message}")]
    Load { message: String, plugin_id: Option<String>, source_path: Option<String> },

    /// Failures raised while executing a plugin calculation
    #[error("Calculation error: {message}")]
    Calculation { message: String, plugin_id: Option<String>, operation: Option<String> },

    /// Failures reaching an external collaborator
    #[error("Network error: {message}")]
    Network { message: String, endpoint: Option<String> },

    /// Runtime configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String, setting: Option<String> },

    /// Plugin declared itself incompatible with this runtime
    #[error("Compatibility error: {message}")]
    Compatibility { message: String, plugin_id: Option<String>, runtime_version: Option<String> },

    /// Anything that does not fit the typed variants
    #[error("Plugin error: {message}")]
    Unknown { message: String },
}

/// Failure categories the host makes retry/UX decisions from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Dependency,
    Timeout,
    Version,
    Load,
    Calculation,
    Network,
    Configuration,
    Compatibility,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Version => "version",
            ErrorCategory::Load => "load",
            ErrorCategory::Calculation => "calculation",
            ErrorCategory::Network => "network",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Compatibility => "compatibility",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Keyword heuristics assigning a category to untyped error messages.
/// Must stay deterministic: callers make retry decisions from the result.
fn categorize_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCategory::Timeout
    } else if lower.contains("network")
        || lower.contains("fetch")
        || lower.contains("connection")
    {
        ErrorCategory::Network
    } else if lower.contains("valid") || lower.contains("required input") {
        ErrorCategory::Validation
    } else if lower.contains("config") {
        ErrorCategory::Configuration
    } else if lower.contains("calculat") || lower.contains("divide") || lower.contains("nan") {
        ErrorCategory::Calculation
    } else {
        ErrorCategory::Unknown
    }
}

impl PluginError {
    /// Get the error category for classification, logging and metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            PluginError::Validation { .. } => ErrorCategory::Validation,
            PluginError::Conflict { .. } => ErrorCategory::Conflict,
            PluginError::Dependency { .. } => ErrorCategory::Dependency,
            PluginError::Timeout { .. } => ErrorCategory::Timeout,
            PluginError::Version { .. } => ErrorCategory::Version,
            PluginError::Load { .. } => ErrorCategory::Load,
            PluginError::Calculation { .. } => ErrorCategory::Calculation,
            PluginError::Network { .. } => ErrorCategory::Network,
            PluginError::Configuration { .. } => ErrorCategory::Configuration,
            PluginError::Compatibility { .. } => ErrorCategory::Compatibility,
            PluginError::Unknown { message } => categorize_message(message),
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation => ErrorSeverity::Low,
            ErrorCategory::Conflict => ErrorSeverity::Medium,
            ErrorCategory::Dependency => ErrorSeverity::High,
            ErrorCategory::Timeout => ErrorSeverity::Medium,
            ErrorCategory::Version => ErrorSeverity::Medium,
            ErrorCategory::Load => ErrorSeverity::High,
            ErrorCategory::Calculation => ErrorSeverity::Medium,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
            ErrorCategory::Compatibility => ErrorSeverity::Medium,
            ErrorCategory::Unknown => ErrorSeverity::Medium,
        }
    }

    /// Check if the recovery service has a strategy worth attempting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout
                | ErrorCategory::Dependency
                | ErrorCategory::Load
                | ErrorCategory::Network
        )
    }

    /// Plugin id carried by this error, when one applies
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            PluginError::Validation { plugin_id, .. }
            | PluginError::Dependency { plugin_id, .. }
            | PluginError::Timeout { plugin_id, .. }
            | PluginError::Version { plugin_id, .. }
            | PluginError::Load { plugin_id, .. }
            | PluginError::Calculation { plugin_id, .. }
            | PluginError::Compatibility { plugin_id, .. } => plugin_id.as_deref(),
            PluginError::Conflict { plugin_key, .. } => plugin_key.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for runtime operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Convenience constructors for common error scenarios
impl PluginError {
    /// Create a validation error without field context
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), plugin_id: None, field: None }
    }

    /// Create a validation error for a specific plugin field
    pub fn validation_field(plugin_id: &str, field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            plugin_id: Some(plugin_id.to_string()),
            field: Some(field.to_string()),
        }
    }

    /// Create a registration conflict error
    pub fn conflict(plugin_key: &str, existing_version: &str, message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            plugin_key: Some(plugin_key.to_string()),
            existing_version: Some(existing_version.to_string()),
        }
    }

    /// Create a dependency error
    pub fn dependency(plugin_id: &str, dependency: &str, message: impl Into<String>) -> Self {
        Self::Dependency {
            message: message.into(),
            plugin_id: Some(plugin_id.to_string()),
            dependency: Some(dependency.to_string()),
        }
    }

    /// Create a timeout error carrying plugin identity and operation
    pub fn timeout(plugin_id: &str, namespace: &str, operation: &str, timeout_ms: u64) -> Self {
        Self::Timeout {
            message: format!("operation '{operation}' exceeded {timeout_ms}ms"),
            plugin_id: Some(plugin_id.to_string()),
            namespace: Some(namespace.to_string()),
            operation: Some(operation.to_string()),
            timeout_ms: Some(timeout_ms),
        }
    }

    /// Create a load error
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load { message: message.into(), plugin_id: None, source_path: None }
    }

    /// Create a load error for a specific source path
    pub fn load_from(plugin_id: &str, source: &str, message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
            plugin_id: Some(plugin_id.to_string()),
            source_path: Some(source.to_string()),
        }
    }

    /// Create a calculation error
    pub fn calculation(plugin_id: &str, operation: &str, message: impl Into<String>) -> Self {
        Self::Calculation {
            message: message.into(),
            plugin_id: Some(plugin_id.to_string()),
            operation: Some(operation.to_string()),
        }
    }

    /// Create a configuration error
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), setting: Some(setting.to_string()) }
    }

    /// Create a compatibility error
    pub fn compatibility(plugin_id: &str, runtime_version: &str) -> Self {
        Self::Compatibility {
            message: format!(
                "plugin '{plugin_id}' is not compatible with runtime version {runtime_version}"
            ),
            plugin_id: Some(plugin_id.to_string()),
            runtime_version: Some(runtime_version.to_string()),
        }
    }

    /// Wrap an arbitrary error message
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown { message: message.into() }
    }
}

impl From<anyhow::Error> for PluginError {
    fn from(err: anyhow::Error) -> Self {
        PluginError::Unknown { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_variants_map_to_fixed_categories() {
        assert_eq!(
            PluginError::timeout("bmi", "general", "calculate", 10_000).category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            PluginError::conflict("general.bmi", "1.0.0", "already registered").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(PluginError::load("no entry point").category(), ErrorCategory::Load);
    }

    #[test]
    fn unknown_messages_are_categorized_by_keyword() {
        assert_eq!(
            PluginError::unknown("request timed out after 5s").category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            PluginError::unknown("connection refused").category(),
            ErrorCategory::Network
        );
        assert_eq!(
            PluginError::unknown("something inexplicable").category(),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn severity_follows_category() {
        assert_eq!(
            PluginError::configuration("root", "missing").severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(PluginError::validation("bad input").severity(), ErrorSeverity::Low);
    }
}
