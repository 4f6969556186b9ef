//! Which side wins a conflict, globally or per node type.
//!
//! Per-type configuration is resolved through a fixed lookup chain, first
//! hit wins:
//!
//! 1. the exact type tag (`md:heading`)
//! 2. the tag with its namespace stripped (`heading`)
//! 3. the normalized alias: lowercase, `-` and spaces folded to `_`
//!
//! All validation happens when the preference is built, so a merge never
//! starts with a bad configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Key reserved for the fallback side in per-type mappings.
pub const DEFAULT_KEY: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Template,
    Destination,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Template => "template",
            Side::Destination => "destination",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template" => Ok(Side::Template),
            "destination" => Ok(Side::Destination),
            other => Err(ConfigError::InvalidPreferenceValue {
                key: DEFAULT_KEY.to_string(),
                value: format!("{other:?}"),
            }),
        }
    }
}

/// Conflict preference policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Preference {
    Global(Side),
    PerType {
        default: Side,
        overrides: BTreeMap<String, Side>,
    },
}

impl Default for Preference {
    fn default() -> Self {
        Preference::Global(Side::Destination)
    }
}

impl From<Side> for Preference {
    fn from(side: Side) -> Self {
        Preference::Global(side)
    }
}

impl Preference {
    /// Per-type preference; `default` falls back to [`Side::Destination`].
    pub fn per_type<I, K>(entries: I, default: Option<Side>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, Side)>,
        K: Into<String>,
    {
        let mut overrides = BTreeMap::new();
        for (key, side) in entries {
            let key = key.into();
            if !is_symbol(&key) {
                return Err(ConfigError::InvalidTypeKey(key));
            }
            overrides.insert(key, side);
        }
        let default = overrides
            .remove(DEFAULT_KEY)
            .or(default)
            .unwrap_or(Side::Destination);
        Ok(Preference::PerType { default, overrides })
    }

    /// Parse `"template"`, `"destination"` or `{"type": "template", "default": ...}`.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) => Ok(Preference::Global(parse_side(DEFAULT_KEY, value, s)?)),
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, raw) in map {
                    let side = match raw {
                        Value::String(s) => parse_side(key, raw, s)?,
                        other => {
                            return Err(ConfigError::InvalidPreferenceValue {
                                key: key.clone(),
                                value: other.to_string(),
                            })
                        }
                    };
                    entries.push((key.clone(), side));
                }
                Preference::per_type(entries, None)
            }
            other => Err(ConfigError::InvalidPreferenceShape(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Preference::Global(side) => Value::String(side.as_str().into()),
            Preference::PerType { default, overrides } => {
                let mut map = serde_json::Map::new();
                map.insert(DEFAULT_KEY.into(), Value::String(default.as_str().into()));
                for (key, side) in overrides {
                    map.insert(key.clone(), Value::String(side.as_str().into()));
                }
                Value::Object(map)
            }
        }
    }

    /// The side to keep for a node merged as `merge_type`.
    pub fn side_for(&self, merge_type: &str) -> Side {
        match self {
            Preference::Global(side) => *side,
            Preference::PerType { default, overrides } => {
                lookup_chain(overrides, merge_type).copied().unwrap_or(*default)
            }
        }
    }
}

fn parse_side(key: &str, raw: &Value, s: &str) -> Result<Side, ConfigError> {
    s.parse().map_err(|_| ConfigError::InvalidPreferenceValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Symbols are `[A-Za-z_][A-Za-z0-9_]*` segments joined by `:`.
pub(crate) fn is_symbol(key: &str) -> bool {
    !key.is_empty()
        && key.split(':').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn strip_namespace(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

fn normalize_alias(tag: &str) -> String {
    tag.chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Resolve a type tag against per-type configuration.
pub(crate) fn lookup_chain<'a, V>(map: &'a BTreeMap<String, V>, tag: &str) -> Option<&'a V> {
    if let Some(v) = map.get(tag) {
        return Some(v);
    }
    let bare = strip_namespace(tag);
    if bare != tag {
        if let Some(v) = map.get(bare) {
            return Some(v);
        }
    }
    let alias = normalize_alias(bare);
    map.iter()
        .find(|(key, _)| normalize_alias(key) == alias)
        .map(|(_, v)| v)
}

/// Static reclassification rules: `node_type -> merge_type`.
///
/// Applied when a node carries no explicit `TypedNode` override.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeTyping {
    rules: BTreeMap<String, String>,
}

impl NodeTyping {
    pub fn new<I, K, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rules = BTreeMap::new();
        for (node_type, merge_type) in entries {
            let node_type = node_type.into();
            let merge_type = merge_type.into();
            if !is_symbol(&node_type) {
                return Err(ConfigError::InvalidNodeTyping {
                    node_type,
                    reason: "node type must be a symbol",
                });
            }
            if !is_symbol(&merge_type) {
                return Err(ConfigError::InvalidNodeTyping {
                    node_type,
                    reason: "merge type must be a non-empty symbol",
                });
            }
            rules.insert(node_type, merge_type);
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn merge_type_for(&self, node_type: &str) -> Option<&str> {
        lookup_chain(&self.rules, node_type).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_global_preference() {
        let pref = Preference::from_json(&json!("template")).unwrap();
        assert_eq!(pref, Preference::Global(Side::Template));
        assert_eq!(pref.side_for("anything"), Side::Template);
        assert_eq!(Preference::default().side_for("x"), Side::Destination);
    }

    #[test]
    fn test_per_type_with_and_without_default() {
        let pref = Preference::from_json(&json!({
            "heading": "template",
            "default": "template",
            "paragraph": "destination",
        }))
        .unwrap();
        assert_eq!(pref.side_for("heading"), Side::Template);
        assert_eq!(pref.side_for("paragraph"), Side::Destination);
        assert_eq!(pref.side_for("table"), Side::Template);

        let pref = Preference::from_json(&json!({ "heading": "template" })).unwrap();
        assert_eq!(pref.side_for("code_block"), Side::Destination);
    }

    #[test]
    fn test_lookup_chain_order() {
        let pref = Preference::per_type(
            [
                ("md:heading", Side::Template),
                ("table_row", Side::Template),
                ("code_block", Side::Destination),
            ],
            Some(Side::Destination),
        )
        .unwrap();
        assert_eq!(pref.side_for("md:heading"), Side::Template);
        assert_eq!(pref.side_for("heading"), Side::Destination);
        assert_eq!(pref.side_for("gfm:table_row"), Side::Template);
        assert_eq!(pref.side_for("Table-Row"), Side::Template);
    }

    #[test]
    fn test_invalid_values_and_shapes() {
        assert!(matches!(
            Preference::from_json(&json!("mine")),
            Err(ConfigError::InvalidPreferenceValue { .. })
        ));
        assert!(matches!(
            Preference::from_json(&json!({"heading": 1})),
            Err(ConfigError::InvalidPreferenceValue { .. })
        ));
        assert!(matches!(
            Preference::from_json(&json!(["template"])),
            Err(ConfigError::InvalidPreferenceShape(_))
        ));
        assert!(matches!(
            Preference::from_json(&json!({"1heading": "template"})),
            Err(ConfigError::InvalidTypeKey(_))
        ));
        assert!(matches!(
            Preference::from_json(&json!({"": "template"})),
            Err(ConfigError::InvalidTypeKey(_))
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_default() {
        let pref = Preference::per_type([("heading", Side::Template)], None).unwrap();
        let value = pref.to_json();
        assert_eq!(value["default"], "destination");
        assert_eq!(Preference::from_json(&value).unwrap(), pref);
    }

    #[test]
    fn test_node_typing() {
        let typing = NodeTyping::new([("table_row", "header_row")]).unwrap();
        assert_eq!(typing.merge_type_for("table_row"), Some("header_row"));
        assert_eq!(typing.merge_type_for("gfm:table_row"), Some("header_row"));
        assert_eq!(typing.merge_type_for("paragraph"), None);
        assert!(matches!(
            NodeTyping::new([("table_row", "")]),
            Err(ConfigError::InvalidNodeTyping { .. })
        ));
    }
}
