//! Plugin descriptor model
//!
//! The data shape every calculator plugin must satisfy: identifying
//! metadata, the author-owned UI/config document, and the calculation
//! capability. Shape conformance is validated once here, at the
//! discovery/registry boundary, never at call sites.

use crate::error::{PluginError, PluginResult};
use chrono::{DateTime, Utc};
use medcalc_calculator::Calculator;
use medcalc_types::LocalizedText;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Runtime version plugins check compatibility against
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifying metadata for a plugin.
///
/// The pair `(namespace, id)` is the plugin's globally unique key and is
/// immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    pub version: String,
    pub name: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PluginMetadata {
    /// The globally unique `namespace.id` key
    pub fn key(&self) -> String {
        format!("{}.{}", self.namespace, self.id)
    }

    /// Parsed semantic version
    pub fn semver(&self) -> PluginResult<Version> {
        Version::parse(&self.version).map_err(|e| {
            PluginError::validation_field(
                &self.id,
                "version",
                format!("'{}' is not a valid semver version: {e}", self.version),
            )
        })
    }

    /// Validate identifier shape. Called at the discovery/registry boundary.
    pub fn validate(&self) -> PluginResult<()> {
        if !is_slug(&self.id) {
            return Err(PluginError::validation_field(
                &self.id,
                "id",
                format!("'{}' is not a valid slug", self.id),
            ));
        }
        if !is_slug(&self.namespace) {
            return Err(PluginError::validation_field(
                &self.id,
                "namespace",
                format!("'{}' is not a valid slug", self.namespace),
            ));
        }
        self.semver()?;
        if self.name.is_empty() {
            return Err(PluginError::validation_field(
                &self.id,
                "name",
                "at least one localized name is required",
            ));
        }
        Ok(())
    }
}

/// Lowercase alphanumeric with interior dashes, e.g. `chads-vasc`
fn is_slug(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

/// UI input field kinds the host knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Integer,
    Text,
    Boolean,
    Select,
    Date,
}

/// One UI input field definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    pub label: LocalizedText,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Author-owned plugin configuration.
///
/// The runtime validates presence and shape only; the `extra` map carries
/// domain metadata the core never interprets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Names the calculation capability in the provider registry
    pub entry: String,
    pub category: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub evidence_level: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Domain metadata, opaque to the runtime
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PluginConfig {
    /// Validate config shape: entry/category present, field names unique,
    /// selects carry options. Domain metadata is never inspected.
    pub fn validate(&self) -> PluginResult<()> {
        if self.entry.is_empty() {
            return Err(PluginError::validation("config is missing the 'entry' field"));
        }
        if !is_slug(&self.category) {
            return Err(PluginError::validation(format!(
                "category '{}' is not a valid slug",
                self.category
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(PluginError::validation("field definitions require a name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(PluginError::validation(format!(
                    "duplicate field definition '{}'",
                    field.name
                )));
            }
            if field.field_type == FieldType::Select && field.options.is_empty() {
                return Err(PluginError::validation(format!(
                    "select field '{}' requires options",
                    field.name
                )));
            }
        }
        Ok(())
    }
}

/// A fully assembled plugin: metadata + config + calculation capability.
///
/// This is the single contract every runtime component depends on. Any
/// `Calculator` implementation satisfying the trait is acceptable.
#[derive(Clone)]
pub struct CalculatorPlugin {
    pub metadata: PluginMetadata,
    pub config: PluginConfig,
    pub calculator: Arc<dyn Calculator>,
}

impl fmt::Debug for CalculatorPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorPlugin")
            .field("key", &self.metadata.key())
            .field("version", &self.metadata.version)
            .field("category", &self.config.category)
            .finish()
    }
}

impl CalculatorPlugin {
    pub fn new(
        metadata: PluginMetadata,
        config: PluginConfig,
        calculator: Arc<dyn Calculator>,
    ) -> Self {
        Self { metadata, config, calculator }
    }

    /// The globally unique `namespace.id` key
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Validate metadata and config shape in one pass
    pub fn validate_shape(&self) -> PluginResult<()> {
        self.metadata.validate()?;
        self.config.validate()
    }

    /// Localized display name with fallback
    pub fn display_name(&self, locale: &str) -> &str {
        self.metadata.name.resolve(locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medcalc_calculator::built_in::bmi::BmiCalculator;

    fn metadata(id: &str, namespace: &str, version: &str) -> PluginMetadata {
        PluginMetadata {
            id: id.to_string(),
            namespace: namespace.to_string(),
            version: version.to_string(),
            name: LocalizedText::with("en", "Test"),
            description: LocalizedText::new(),
            author: String::new(),
            license: None,
            dependencies: vec![],
            conflicts: vec![],
            tags: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn slug_validation_rejects_bad_identifiers() {
        assert!(metadata("bmi", "general", "1.0.0").validate().is_ok());
        assert!(metadata("chads-vasc", "cardiology", "0.2.1").validate().is_ok());
        assert!(metadata("BMI", "general", "1.0.0").validate().is_err());
        assert!(metadata("bmi", "", "1.0.0").validate().is_err());
        assert!(metadata("-bmi", "general", "1.0.0").validate().is_err());
    }

    #[test]
    fn version_must_be_semver() {
        assert!(metadata("bmi", "general", "not-a-version").validate().is_err());
        assert!(metadata("bmi", "general", "1.2").validate().is_err());
    }

    #[test]
    fn config_shape_validation() {
        let mut config = PluginConfig {
            entry: "bmi".to_string(),
            category: "general".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.fields.push(FieldDef {
            name: "stage".to_string(),
            label: LocalizedText::with("en", "Stage"),
            field_type: FieldType::Select,
            required: true,
            unit: None,
            min: None,
            max: None,
            options: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_preserves_opaque_domain_metadata() {
        let doc = serde_json::json!({
            "entry": "bmi",
            "category": "general",
            "references": [{ "doi": "10.1000/xyz" }],
            "evidenceLevel": "A"
        });
        let config: PluginConfig = serde_json::from_value(doc).unwrap();
        assert_eq!(config.evidence_level.as_deref(), Some("A"));
        assert!(config.extra.contains_key("references"));
    }

    #[test]
    fn plugin_key_combines_namespace_and_id() {
        let plugin = CalculatorPlugin::new(
            metadata("bmi", "general", "1.0.0"),
            PluginConfig {
                entry: "bmi".to_string(),
                category: "general".to_string(),
                ..Default::default()
            },
            Arc::new(BmiCalculator),
        );
        assert_eq!(plugin.key(), "general.bmi");
        assert!(plugin.validate_shape().is_ok());
    }
}
