//! Typed key/value configuration that drives simulated outcomes.
//!
//! Every key has a fixed type and a documented default (see [`keys`]). The
//! store is created once at startup and shared as `Arc<Config>`; the engine
//! reads it at each decision point, so changes apply to the next operation
//! without a restart.
//!
//! Reads never fail: a key holding a value of the wrong type reads back as
//! its default. Writes are type-checked and unknown keys are rejected.
//!
//! # Examples
//!
//! ```
//! use fpsim_core::config::{Config, keys};
//!
//! let config = Config::new();
//! assert_eq!(config.get_string(keys::TYPE), "rear");
//!
//! config.set_str(keys::LOCKOUT_TIMED_THRESHOLD, "3").unwrap();
//! assert_eq!(config.get_i32(keys::LOCKOUT_TIMED_THRESHOLD), 3);
//!
//! config.reset_to_default();
//! assert_eq!(config.get_i32(keys::LOCKOUT_TIMED_THRESHOLD), 5);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{Result, error::Error};

/// Configuration key names.
pub mod keys {
    pub const TYPE: &str = "type";
    pub const ENROLLMENTS: &str = "enrollments";
    pub const ENROLLMENT_HIT: &str = "enrollment_hit";
    pub const NEXT_ENROLLMENT: &str = "next_enrollment";
    pub const AUTHENTICATOR_ID: &str = "authenticator_id";
    pub const CHALLENGE: &str = "challenge";
    pub const LOCKOUT: &str = "lockout";
    pub const OPERATION_AUTHENTICATE_FAILS: &str = "operation_authenticate_fails";
    pub const OPERATION_AUTHENTICATE_LATENCY: &str = "operation_authenticate_latency";
    pub const OPERATION_AUTHENTICATE_DURATION: &str = "operation_authenticate_duration";
    pub const OPERATION_AUTHENTICATE_ERROR: &str = "operation_authenticate_error";
    pub const OPERATION_AUTHENTICATE_ACQUIRED: &str = "operation_authenticate_acquired";
    pub const OPERATION_ENROLL_ERROR: &str = "operation_enroll_error";
    pub const OPERATION_ENROLL_LATENCY: &str = "operation_enroll_latency";
    pub const OPERATION_DETECT_INTERACTION_ERROR: &str = "operation_detect_interaction_error";
    pub const OPERATION_DETECT_INTERACTION_LATENCY: &str = "operation_detect_interaction_latency";
    pub const OPERATION_DETECT_INTERACTION_DURATION: &str =
        "operation_detect_interaction_duration";
    pub const OPERATION_DETECT_INTERACTION_ACQUIRED: &str =
        "operation_detect_interaction_acquired";
    pub const SENSOR_LOCATION: &str = "sensor_location";
    pub const SENSOR_ID: &str = "sensor_id";
    pub const SENSOR_STRENGTH: &str = "sensor_strength";
    pub const MAX_ENROLLMENTS: &str = "max_enrollments";
    pub const NAVIGATION_GUESTURE: &str = "navigation_guesture";
    pub const DETECT_INTERACTION: &str = "detect_interaction";
    pub const DISPLAY_TOUCH: &str = "display_touch";
    pub const CONTROL_ILLUMINATION: &str = "control_illumination";
    pub const LOCKOUT_ENABLE: &str = "lockout_enable";
    pub const LOCKOUT_TIMED_THRESHOLD: &str = "lockout_timed_threshold";
    pub const LOCKOUT_TIMED_DURATION: &str = "lockout_timed_duration";
    pub const LOCKOUT_PERMANENT_THRESHOLD: &str = "lockout_permanent_threshold";
}

/// Default value of a key, in a form that fits in a static table.
#[derive(Debug, Clone, Copy)]
enum DefaultValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Str(&'static str),
    IntList(&'static [i32]),
}

impl DefaultValue {
    fn to_value(self) -> ConfigValue {
        match self {
            Self::Bool(v) => ConfigValue::Bool(v),
            Self::Int32(v) => ConfigValue::Int32(v),
            Self::Int64(v) => ConfigValue::Int64(v),
            Self::Str(v) => ConfigValue::Str(v.to_string()),
            Self::IntList(v) => ConfigValue::IntList(v.to_vec()),
        }
    }
}

const ENTRIES: &[(&str, DefaultValue)] = &[
    (keys::TYPE, DefaultValue::Str("rear")),
    (keys::ENROLLMENTS, DefaultValue::IntList(&[])),
    (keys::ENROLLMENT_HIT, DefaultValue::Int32(0)),
    (keys::NEXT_ENROLLMENT, DefaultValue::Str("")),
    (keys::AUTHENTICATOR_ID, DefaultValue::Int64(0)),
    (keys::CHALLENGE, DefaultValue::Int64(0)),
    (keys::LOCKOUT, DefaultValue::Bool(false)),
    (keys::OPERATION_AUTHENTICATE_FAILS, DefaultValue::Bool(false)),
    (keys::OPERATION_AUTHENTICATE_LATENCY, DefaultValue::IntList(&[])),
    (keys::OPERATION_AUTHENTICATE_DURATION, DefaultValue::Int32(10_000)),
    (keys::OPERATION_AUTHENTICATE_ERROR, DefaultValue::Int32(0)),
    (keys::OPERATION_AUTHENTICATE_ACQUIRED, DefaultValue::Str("1")),
    (keys::OPERATION_ENROLL_ERROR, DefaultValue::Int32(0)),
    (keys::OPERATION_ENROLL_LATENCY, DefaultValue::IntList(&[])),
    (keys::OPERATION_DETECT_INTERACTION_ERROR, DefaultValue::Int32(0)),
    (keys::OPERATION_DETECT_INTERACTION_LATENCY, DefaultValue::IntList(&[])),
    (keys::OPERATION_DETECT_INTERACTION_DURATION, DefaultValue::Int32(10_000)),
    (keys::OPERATION_DETECT_INTERACTION_ACQUIRED, DefaultValue::Str("1")),
    (keys::SENSOR_LOCATION, DefaultValue::Str("")),
    (keys::SENSOR_ID, DefaultValue::Int32(5)),
    (keys::SENSOR_STRENGTH, DefaultValue::Int32(2)),
    (keys::MAX_ENROLLMENTS, DefaultValue::Int32(5)),
    (keys::NAVIGATION_GUESTURE, DefaultValue::Bool(false)),
    (keys::DETECT_INTERACTION, DefaultValue::Bool(false)),
    (keys::DISPLAY_TOUCH, DefaultValue::Bool(true)),
    (keys::CONTROL_ILLUMINATION, DefaultValue::Bool(false)),
    (keys::LOCKOUT_ENABLE, DefaultValue::Bool(true)),
    (keys::LOCKOUT_TIMED_THRESHOLD, DefaultValue::Int32(5)),
    (keys::LOCKOUT_TIMED_DURATION, DefaultValue::Int32(10_000)),
    (keys::LOCKOUT_PERMANENT_THRESHOLD, DefaultValue::Int32(20)),
];

/// Type of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Bool,
    Int32,
    Int64,
    Str,
    IntList,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Str => "string",
            Self::IntList => "int list",
        };
        f.write_str(name)
    }
}

/// A stored configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Str(String),
    IntList(Vec<i32>),
}

impl ConfigValue {
    pub fn kind(&self) -> ConfigKind {
        match self {
            Self::Bool(_) => ConfigKind::Bool,
            Self::Int32(_) => ConfigKind::Int32,
            Self::Int64(_) => ConfigKind::Int64,
            Self::Str(_) => ConfigKind::Str,
            Self::IntList(_) => ConfigKind::IntList,
        }
    }

    /// Parse text into a value of the given kind.
    ///
    /// Booleans accept `true`/`false`/`1`/`0`; lists are comma separated and
    /// an empty string is the empty list.
    pub fn parse(kind: ConfigKind, text: &str) -> std::result::Result<Self, String> {
        let text = text.trim();
        match kind {
            ConfigKind::Bool => match text {
                "true" | "1" => Ok(Self::Bool(true)),
                "false" | "0" => Ok(Self::Bool(false)),
                other => Err(format!("expected a boolean, got {other:?}")),
            },
            ConfigKind::Int32 => text.parse().map(Self::Int32).map_err(|e| e.to_string()),
            ConfigKind::Int64 => text.parse().map(Self::Int64).map_err(|e| e.to_string()),
            ConfigKind::Str => Ok(Self::Str(text.to_string())),
            ConfigKind::IntList => {
                if text.is_empty() {
                    return Ok(Self::IntList(Vec::new()));
                }
                text.split(',')
                    .map(|item| item.trim().parse::<i32>().map_err(|e| e.to_string()))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Self::IntList)
            }
        }
    }

    /// Convert a JSON value into a value of the given kind.
    fn from_json(kind: ConfigKind, json: &serde_json::Value) -> std::result::Result<Self, String> {
        use serde_json::Value;

        match (kind, json) {
            (ConfigKind::Bool, Value::Bool(b)) => Ok(Self::Bool(*b)),
            (ConfigKind::Int32, Value::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Int32)
                .ok_or_else(|| format!("{n} does not fit in int32")),
            (ConfigKind::Int64, Value::Number(n)) => n
                .as_i64()
                .map(Self::Int64)
                .ok_or_else(|| format!("{n} is not an integer")),
            (ConfigKind::IntList, Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_i64()
                        .and_then(|v| i32::try_from(v).ok())
                        .ok_or_else(|| format!("{item} is not an int32"))
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Self::IntList),
            (_, Value::String(text)) => Self::parse(kind, text),
            (kind, other) => Err(format!("expected {kind}, got {other}")),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::IntList(v) => {
                let items: Vec<String> = v.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

fn entry(key: &str) -> Option<&'static (&'static str, DefaultValue)> {
    ENTRIES.iter().find(|(name, _)| *name == key)
}

fn defaults() -> HashMap<&'static str, ConfigValue> {
    ENTRIES
        .iter()
        .map(|(name, default)| (*name, default.to_value()))
        .collect()
}

/// Shared configuration store.
///
/// All methods take `&self`; the map sits behind a `RwLock` so the service,
/// the shell and the engine can hold the same `Arc<Config>`.
#[derive(Debug)]
pub struct Config {
    values: RwLock<HashMap<&'static str, ConfigValue>>,
}

impl Config {
    /// Create a store holding every key at its default.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(defaults()),
        }
    }

    /// Create a store from a JSON object file of overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a JSON object, or
    /// names an unknown key or a value of the wrong type.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&text)?;
        let config = Self::new();
        config.apply_json(&json)?;
        Ok(config)
    }

    /// Apply every key of a JSON object as an override.
    ///
    /// Keys are validated before anything is written, so a bad document
    /// leaves the store untouched.
    pub fn apply_json(&self, json: &serde_json::Value) -> Result<()> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::invalid_config("<root>", "expected a JSON object"))?;

        let mut parsed = Vec::with_capacity(object.len());
        for (key, raw) in object {
            let (name, default) =
                entry(key).ok_or_else(|| Error::UnknownConfigKey(key.clone()))?;
            let value = ConfigValue::from_json(default.to_value().kind(), raw)
                .map_err(|message| Error::invalid_config(key.as_str(), message))?;
            parsed.push((*name, value));
        }

        let mut values = self.write();
        for (name, value) in parsed {
            values.insert(name, value);
        }
        Ok(())
    }

    /// The type of a key, or `None` if the key does not exist.
    pub fn kind_of(key: &str) -> Option<ConfigKind> {
        entry(key).map(|(_, default)| default.to_value().kind())
    }

    /// The documented default of a key.
    pub fn default_of(key: &str) -> Option<ConfigValue> {
        entry(key).map(|(_, default)| default.to_value())
    }

    /// All key names, in table order.
    pub fn keys() -> impl Iterator<Item = &'static str> {
        ENTRIES.iter().map(|(name, _)| *name)
    }

    /// Read the raw value of a key, falling back to its default.
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let (name, default) = entry(key)?;
        let values = self.read();
        match values.get(name) {
            Some(value) if value.kind() == default.to_value().kind() => Some(value.clone()),
            _ => Some(default.to_value()),
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(ConfigValue::Bool(v)) => v,
            _ => Self::mistyped(key, ConfigKind::Bool, false),
        }
    }

    pub fn get_i32(&self, key: &str) -> i32 {
        match self.get(key) {
            Some(ConfigValue::Int32(v)) => v,
            _ => Self::mistyped(key, ConfigKind::Int32, 0),
        }
    }

    /// Read a count or limit, using the documented default when the stored
    /// value is negative.
    pub fn get_non_negative_i32(&self, key: &str) -> i32 {
        let value = self.get_i32(key);
        if value >= 0 {
            return value;
        }
        let default = match Self::default_of(key) {
            Some(ConfigValue::Int32(default)) => default.max(0),
            _ => 0,
        };
        warn!("config key {} is negative ({}), using {}", key, value, default);
        default
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        match self.get(key) {
            Some(ConfigValue::Int64(v)) => v,
            _ => Self::mistyped(key, ConfigKind::Int64, 0),
        }
    }

    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(ConfigValue::Str(v)) => v,
            _ => Self::mistyped(key, ConfigKind::Str, String::new()),
        }
    }

    pub fn get_int_list(&self, key: &str) -> Vec<i32> {
        match self.get(key) {
            Some(ConfigValue::IntList(v)) => v,
            _ => Self::mistyped(key, ConfigKind::IntList, Vec::new()),
        }
    }

    /// Store a typed value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConfigKey` for keys outside the table and
    /// `InvalidConfig` when the value's type differs from the key's.
    pub fn set(&self, key: &str, value: ConfigValue) -> Result<()> {
        let (name, default) = entry(key).ok_or_else(|| Error::UnknownConfigKey(key.to_string()))?;
        let expected = default.to_value().kind();
        if value.kind() != expected {
            return Err(Error::invalid_config(
                key,
                format!("expected {expected}, got {}", value.kind()),
            ));
        }

        debug!("config {} = {}", name, value);
        self.write().insert(*name, value);
        Ok(())
    }

    /// Parse text according to the key's type and store it.
    pub fn set_str(&self, key: &str, text: &str) -> Result<()> {
        let kind = Self::kind_of(key).ok_or_else(|| Error::UnknownConfigKey(key.to_string()))?;
        let value =
            ConfigValue::parse(kind, text).map_err(|message| Error::invalid_config(key, message))?;
        self.set(key, value)
    }

    /// Restore every key to its default in one step.
    pub fn reset_to_default(&self) {
        *self.write() = defaults();
    }

    /// Every key with its current value, in table order.
    pub fn snapshot(&self) -> Vec<(&'static str, ConfigValue)> {
        Self::keys()
            .filter_map(|name| self.get(name).map(|value| (name, value)))
            .collect()
    }

    fn mistyped<T>(key: &str, kind: ConfigKind, fallback: T) -> T {
        warn!("config key {} is not a known {} key", key, kind);
        fallback
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<&'static str, ConfigValue>> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<&'static str, ConfigValue>> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::default::Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_every_key_has_a_default() {
        let config = Config::new();
        for key in Config::keys() {
            assert_eq!(config.get(key), Config::default_of(key), "key {key}");
        }
        assert_eq!(Config::keys().count(), ENTRIES.len());
    }

    #[test]
    fn test_reset_to_default_round_trip() {
        let config = Config::new();
        config.set_str(keys::TYPE, "udfps").unwrap();
        config.set_str(keys::ENROLLMENTS, "1,2,3").unwrap();
        config.set_str(keys::LOCKOUT, "true").unwrap();
        config.set_str(keys::AUTHENTICATOR_ID, "123456789012").unwrap();
        config.set_str(keys::LOCKOUT_TIMED_DURATION, "50").unwrap();

        config.reset_to_default();

        for key in Config::keys() {
            assert_eq!(config.get(key), Config::default_of(key), "key {key}");
        }
    }

    #[rstest]
    #[case(keys::LOCKOUT, "1", ConfigValue::Bool(true))]
    #[case(keys::LOCKOUT, "false", ConfigValue::Bool(false))]
    #[case(keys::SENSOR_ID, " 9 ", ConfigValue::Int32(9))]
    #[case(keys::CHALLENGE, "-77", ConfigValue::Int64(-77))]
    #[case(keys::ENROLLMENTS, "4, 5", ConfigValue::IntList(vec![4, 5]))]
    #[case(keys::ENROLLMENTS, "", ConfigValue::IntList(vec![]))]
    #[case(keys::TYPE, "side", ConfigValue::Str("side".to_string()))]
    fn test_set_str_valid(#[case] key: &str, #[case] text: &str, #[case] expected: ConfigValue) {
        let config = Config::new();
        config.set_str(key, text).unwrap();
        assert_eq!(config.get(key), Some(expected));
    }

    #[rstest]
    #[case(keys::LOCKOUT, "maybe")]
    #[case(keys::SENSOR_ID, "five")]
    #[case(keys::SENSOR_ID, "99999999999")]
    #[case(keys::ENROLLMENTS, "1,x")]
    fn test_set_str_invalid_keeps_value(#[case] key: &str, #[case] text: &str) {
        let config = Config::new();
        let before = config.get(key);
        let result = config.set_str(key, text);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        assert_eq!(config.get(key), before);
    }

    #[rstest]
    #[case("3", 3)]
    #[case("0", 0)]
    #[case("-1", 5)]
    fn test_non_negative_falls_back_to_default(#[case] text: &str, #[case] expected: i32) {
        let config = Config::new();
        config.set_str(keys::MAX_ENROLLMENTS, text).unwrap();
        assert_eq!(config.get_non_negative_i32(keys::MAX_ENROLLMENTS), expected);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let config = Config::new();
        assert!(matches!(
            config.set_str("no_such_key", "1"),
            Err(Error::UnknownConfigKey(_))
        ));
        assert_eq!(config.get("no_such_key"), None);
    }

    #[test]
    fn test_set_wrong_type_rejected() {
        let config = Config::new();
        let result = config.set(keys::SENSOR_ID, ConfigValue::Bool(true));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        assert_eq!(config.get_i32(keys::SENSOR_ID), 5);
    }

    #[test]
    fn test_apply_json_overrides() {
        let config = Config::new();
        let json = serde_json::json!({
            "type": "udfps",
            "enrollments": [1, 2],
            "lockout_timed_threshold": 3,
            "lockout": "true"
        });
        config.apply_json(&json).unwrap();

        assert_eq!(config.get_string(keys::TYPE), "udfps");
        assert_eq!(config.get_int_list(keys::ENROLLMENTS), vec![1, 2]);
        assert_eq!(config.get_i32(keys::LOCKOUT_TIMED_THRESHOLD), 3);
        assert!(config.get_bool(keys::LOCKOUT));
    }

    #[test]
    fn test_apply_json_is_all_or_nothing() {
        let config = Config::new();
        let json = serde_json::json!({
            "type": "side",
            "sensor_id": "not a number"
        });
        assert!(config.apply_json(&json).is_err());
        assert_eq!(config.get_string(keys::TYPE), "rear");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ConfigValue::IntList(vec![1, 2, 3]).to_string(), "1,2,3");
        assert_eq!(ConfigValue::Bool(true).to_string(), "true");
    }
}
