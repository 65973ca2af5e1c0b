//! Middleware definitions.

use super::Middleware;
use crate::core::LifecyclePhase;
use crate::errors::InvalidDefinitionError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Display metadata a middleware contributes to result cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardField {
    /// Where the value is read from (e.g. "store", "config", "parameters").
    pub source: String,
    /// The key under `source`.
    pub key: String,
    /// Human-readable label.
    pub label: String,
    /// Display format hint (e.g. "text", "currency").
    #[serde(default = "default_format")]
    pub format: String,
    /// Config group the key lives under, when `source` is "config".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_group: Option<String>,
    /// Text appended to the rendered value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

fn default_format() -> String {
    "text".to_string()
}

impl CardField {
    /// Creates a text card field.
    #[must_use]
    pub fn new(source: impl Into<String>, key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
            label: label.into(),
            format: default_format(),
            config_group: None,
            suffix: None,
        }
    }

    /// Sets the display format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Sets the config group.
    #[must_use]
    pub fn with_config_group(mut self, group: impl Into<String>) -> Self {
        self.config_group = Some(group.into());
        self
    }

    /// Sets the suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

/// Immutable descriptor of a registered middleware.
///
/// `before` and `after` targets name either another middleware or a
/// lifecycle phase string such as `lifecycle-request`.
#[derive(Debug, Clone)]
pub struct MiddlewareDefinition {
    /// The unique name of the middleware.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional category for admin listings.
    pub category: Option<String>,
    /// The lifecycle phase this middleware belongs to.
    pub phase: LifecyclePhase,
    /// Targets this middleware must complete before.
    pub before: Vec<String>,
    /// Targets that must complete before this middleware starts.
    pub after: Vec<String>,
    /// Shared configuration namespace.
    pub config_group: Option<String>,
    /// Card display metadata.
    pub card_fields: Vec<CardField>,
    /// The middleware implementation.
    pub handler: Arc<dyn Middleware>,
}

impl MiddlewareDefinition {
    /// Creates a new definition in the request phase.
    #[must_use]
    pub fn new(name: impl Into<String>, handler: Arc<dyn Middleware>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: None,
            category: None,
            phase: LifecyclePhase::default(),
            before: Vec::new(),
            after: Vec::new(),
            config_group: None,
            card_fields: Vec::new(),
            handler,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the lifecycle phase.
    #[must_use]
    pub const fn with_phase(mut self, phase: LifecyclePhase) -> Self {
        self.phase = phase;
        self
    }

    /// Adds a target this middleware must run before.
    #[must_use]
    pub fn before(mut self, target: impl Into<String>) -> Self {
        self.before.push(target.into());
        self
    }

    /// Adds a target this middleware must run after.
    #[must_use]
    pub fn after(mut self, target: impl Into<String>) -> Self {
        self.after.push(target.into());
        self
    }

    /// Sets the config group.
    #[must_use]
    pub fn with_config_group(mut self, group: impl Into<String>) -> Self {
        self.config_group = Some(group.into());
        self
    }

    /// Adds a card field.
    #[must_use]
    pub fn with_card_field(mut self, field: CardField) -> Self {
        self.card_fields.push(field);
        self
    }

    /// Returns the key used for configuration and enablement lookups.
    #[must_use]
    pub fn config_key(&self) -> &str {
        self.config_group.as_deref().unwrap_or(&self.name)
    }

    /// Returns true if this middleware runs in the finalize phase.
    #[must_use]
    pub const fn is_finalize(&self) -> bool {
        self.phase.is_finalize()
    }

    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, collides with a lifecycle
    /// phase name, or a before/after target is blank.
    pub fn validate(&self) -> Result<(), InvalidDefinitionError> {
        if self.name.trim().is_empty() {
            return Err(InvalidDefinitionError::new(&self.name, "name must not be empty"));
        }

        if self.name.parse::<LifecyclePhase>().is_ok() {
            return Err(InvalidDefinitionError::new(
                &self.name,
                "name collides with a lifecycle phase",
            ));
        }

        if self.before.iter().chain(&self.after).any(|t| t.trim().is_empty()) {
            return Err(InvalidDefinitionError::new(
                &self.name,
                "before/after targets must not be empty",
            ));
        }

        Ok(())
    }
}
