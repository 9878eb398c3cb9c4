//! Configuration types for the Armillary repository.
//!
//! All types implement [`serde::Deserialize`] for loading from external
//! sources such as a TOML file.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration, one section per component.
//! - [`RepositoryConfig`] - History depth and load-time repair settings,
//!   read from the `[repository]` section.
//!
//! # Example
//!
//! ```
//! # use armillary::config::AppConfig;
//! let config = AppConfig::default();
//! assert_eq!(config.repository().history_capacity(), 100);
//! assert!(config.repository().repair_on_load());
//! ```

use serde::Deserialize;

fn default_history_capacity() -> usize {
    100
}

fn default_repair_on_load() -> bool {
    true
}

fn default_model_less_views() -> Vec<String> {
    vec!["LabelView".to_owned(), "NoteView".to_owned()]
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Repository configuration section.
    #[serde(default)]
    repository: RepositoryConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] with the given repository settings.
    pub fn new(repository: RepositoryConfig) -> Self {
        Self { repository }
    }

    /// Returns the repository configuration.
    pub fn repository(&self) -> &RepositoryConfig {
        &self.repository
    }
}

/// Repository behaviour settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Maximum number of operations kept on each of the undo and redo stacks.
    #[serde(default = "default_history_capacity")]
    history_capacity: usize,

    /// Whether to run the load-time repair pass after decoding a document.
    #[serde(default = "default_repair_on_load")]
    repair_on_load: bool,

    /// View types that are legitimately rendered without a backing model.
    #[serde(default = "default_model_less_views")]
    model_less_views: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            repair_on_load: default_repair_on_load(),
            model_less_views: default_model_less_views(),
        }
    }
}

impl RepositoryConfig {
    /// Returns a copy with a different history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Returns a copy with the repair pass switched on or off.
    pub fn with_repair_on_load(mut self, enabled: bool) -> Self {
        self.repair_on_load = enabled;
        self
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn repair_on_load(&self) -> bool {
        self.repair_on_load
    }

    pub fn model_less_views(&self) -> &[String] {
        &self.model_less_views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RepositoryConfig =
            serde_json::from_value(serde_json::json!({ "history_capacity": 5 })).unwrap();

        assert_eq!(config.history_capacity(), 5);
        assert!(config.repair_on_load());
        assert_eq!(config.model_less_views(), &["LabelView", "NoteView"]);
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.repository().history_capacity(), 100);

        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "repository": { "repair_on_load": false }
        }))
        .unwrap();
        assert!(!config.repository().repair_on_load());
    }

    #[test]
    fn test_builders() {
        let config = RepositoryConfig::default()
            .with_history_capacity(3)
            .with_repair_on_load(false);
        assert_eq!(config.history_capacity(), 3);
        assert!(!config.repair_on_load());
    }
}
