use duration_string::DurationString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

use crate::converters::Converter;
use crate::error::{Result, SolverError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Options {
    pub solver: Converter,
    pub random_seed: u32,
    #[serde(
        serialize_with = "serialize_timeout",
        deserialize_with = "deserialize_timeout"
    )]
    pub timeout: Option<Duration>,
    pub log_all_queries: bool,
    /// Release native references of unreachable formulas through the creator's cleanup queue.
    pub track_native_references: bool,
    /// Recreate declarations that a native pop discarded.
    pub global_declarations: bool,
    pub min_atoms_for_abbreviation: usize,
    pub produce_models: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            solver: Converter::default(),
            random_seed: 42,
            timeout: None,
            log_all_queries: false,
            track_native_references: false,
            global_declarations: true,
            min_atoms_for_abbreviation: 100,
            produce_models: true,
        }
    }
}

impl Options {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn set_global_declarations(&mut self, val: bool) {
        self.global_declarations = val;
    }

    pub fn set_track_native_references(&mut self, val: bool) {
        self.track_native_references = val;
    }

    pub fn timeout_millis(&self) -> Result<Option<u32>> {
        self.timeout
            .map(|timeout| {
                u32::try_from(timeout.as_millis())
                    .map_err(|_| SolverError::Config(format!("timeout {:?} is too long", timeout)))
            })
            .transpose()
    }
}

fn serialize_timeout<S: Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => serializer.serialize_some(&DurationString::from(*timeout).to_string()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timeout<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    let text: Option<String> = Option::deserialize(deserializer)?;
    text.map(|text| {
        text.parse::<DurationString>()
            .map(Duration::from)
            .map_err(serde::de::Error::custom)
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = Options::default();
        assert_eq!(options.random_seed, 42);
        assert_eq!(options.min_atoms_for_abbreviation, 100);
        assert!(options.global_declarations);
        assert!(!options.track_native_references);
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options =
            Options::from_json(r#"{"solver": "Dummy", "timeout": "1500ms", "random_seed": 7}"#)
                .unwrap();
        assert_eq!(options.solver, Converter::Dummy);
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.random_seed, 7);
        assert_eq!(options.min_atoms_for_abbreviation, 100);
        assert_eq!(options.timeout_millis().unwrap(), Some(1500));
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let err = Options::from_json(r#"{"timeout": "soon"}"#).unwrap_err();
        assert!(matches!(err, SolverError::Json(_)));
    }

    #[test]
    fn options_survive_serialization() {
        let mut options = Options::default();
        options.set_timeout(Some(Duration::from_secs(3)));
        options.set_global_declarations(false);
        let text = serde_json::to_string(&options).unwrap();
        assert_eq!(Options::from_json(&text).unwrap(), options);
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!("polysmt-options-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"log_all_queries": true}"#).unwrap();
        let options = Options::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(options.log_all_queries);
    }
}
