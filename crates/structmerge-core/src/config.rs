use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use structmerge::refiner::DEFAULT_THRESHOLD;
use structmerge::{
    CommentStyle, ConfigError, FreezeMarkerRegistry, MatchRefiner, MergeOptions, NodeTyping, Preference,
    ResolutionStrategy, SimilarityWeights,
};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub refiner: RefinerSettings,
    #[serde(default)]
    pub freeze: FreezeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    /// `"template"`, `"destination"`, or an object of per-type sides with an
    /// optional `"default"`. Validated by [`Settings::merge_options`].
    #[serde(default = "default_preference")]
    pub preference: Value,
    #[serde(default)]
    pub add_template_only_nodes: bool,
    #[serde(default)]
    pub strategy: ResolutionStrategy,
    /// `node_type -> merge_type` reclassification rules.
    #[serde(default)]
    pub node_typing: BTreeMap<String, String>,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            preference: default_preference(),
            add_template_only_nodes: false,
            strategy: ResolutionStrategy::default(),
            node_typing: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinerSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub weights: SimilarityWeights,
    /// Empty means every node type.
    #[serde(default)]
    pub node_types: Vec<String>,
}

impl Default for RefinerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_threshold(),
            weights: SimilarityWeights::default(),
            node_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreezeSettings {
    /// Comment styles recognized on top of the built-in `hash`, `slash` and `html`.
    #[serde(default)]
    pub extra_markers: Vec<MarkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    pub name: String,
    pub open: String,
    #[serde(default)]
    pub close: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            filter: default_filter(),
        }
    }
}

fn default_preference() -> Value {
    Value::String("destination".into())
}
fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_filter() -> String {
    "info".into()
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validated engine options. Every configuration error surfaces here,
    /// before any merge runs.
    pub fn merge_options(&self) -> Result<MergeOptions, ConfigError> {
        let refiner = if self.refiner.enabled {
            Some(MatchRefiner::new(
                self.refiner.threshold,
                self.refiner.weights,
                self.refiner.node_types.iter().cloned(),
            )?)
        } else {
            None
        };
        Ok(MergeOptions {
            preference: Preference::from_json(&self.merge.preference)?,
            add_template_only_nodes: self.merge.add_template_only_nodes,
            node_typing: NodeTyping::new(self.merge.node_typing.clone())?,
            refiner,
            strategy: self.merge.strategy,
        })
    }

    /// The built-in freeze marker styles plus the configured extras.
    pub fn marker_registry(&self) -> Result<FreezeMarkerRegistry, ConfigError> {
        let registry = FreezeMarkerRegistry::default();
        for marker in &self.freeze.extra_markers {
            registry.register(CommentStyle::new(
                marker.name.clone(),
                marker.open.clone(),
                marker.close.as_deref(),
            )?)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use structmerge::{DecisionKind, OutlineBackend, Side, SmartMerger};

    #[test]
    fn test_defaults_from_empty_object() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.merge.preference, json!("destination"));
        assert!(!settings.refiner.enabled);
        assert_eq!(settings.refiner.threshold, 0.5);
        assert_eq!(settings.logging.filter, "info");

        let options = settings.merge_options().unwrap();
        assert_eq!(options.preference, Preference::Global(Side::Destination));
        assert!(options.refiner.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut settings = Settings::default();
        settings.merge.preference = json!({ "heading": "template", "default": "destination" });
        settings.merge.add_template_only_nodes = true;
        settings.refiner.enabled = true;
        settings.freeze.extra_markers.push(MarkerConfig {
            name: "sql".into(),
            open: "--".into(),
            close: None,
        });
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.merge.preference, settings.merge.preference);
        assert!(loaded.merge.add_template_only_nodes);
        let options = loaded.merge_options().unwrap();
        assert!(options.refiner.is_some());
        assert_eq!(options.preference.side_for("heading"), Side::Template);
        assert_eq!(loaded.marker_registry().unwrap().style_names().len(), 4);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(settings.freeze.extra_markers.is_empty());
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let mut settings = Settings::default();
        settings.merge.preference = json!("newest");
        assert!(matches!(
            settings.merge_options(),
            Err(ConfigError::InvalidPreferenceValue { .. })
        ));

        let mut settings = Settings::default();
        settings.merge.preference = json!({ "not a symbol": "template" });
        assert!(matches!(settings.merge_options(), Err(ConfigError::InvalidTypeKey(_))));

        let mut settings = Settings::default();
        settings.refiner.enabled = true;
        settings.refiner.weights = SimilarityWeights {
            content: 0.9,
            length: 0.9,
            position: 0.0,
        };
        assert!(matches!(settings.merge_options(), Err(ConfigError::InvalidWeights { .. })));

        let mut settings = Settings::default();
        settings.freeze.extra_markers.push(MarkerConfig {
            name: "hash".into(),
            open: "#".into(),
            close: None,
        });
        assert!(matches!(settings.marker_registry(), Err(ConfigError::DuplicateMarker(_))));
    }

    #[test]
    fn test_invalid_strategy_fails_to_parse() {
        let result: Result<Settings, _> = serde_json::from_str(r#"{ "merge": { "strategy": "greedy" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_options_drive_a_merge() {
        let settings: Settings = serde_json::from_str(
            r#"{ "merge": { "preference": "template", "add_template_only_nodes": true } }"#,
        )
        .unwrap();
        let backend = OutlineBackend::new(settings.marker_registry().unwrap());
        let merger = SmartMerger::new(backend, settings.merge_options().unwrap());
        let result = merger.merge("# A\nnew\n", "# A\n").unwrap();
        assert_eq!(result.content(), "# A\nnew\n");
        assert_eq!(result.decisions().count(DecisionKind::Added), 1);
    }
}
