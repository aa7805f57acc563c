use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlagsError;

/// One declared pipeline option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlagSpec {
    pub default: Value,
    /// Label shown next to the option in user interfaces.
    pub long_name: String,
}

/// Validated flag declarations of a pipeline class, keyed by flag name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagSchema(pub BTreeMap<String, FlagSpec>);

impl FlagSchema {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&FlagSpec> {
        self.0.get(name)
    }

    /// Merge user-supplied values onto the declared defaults.
    pub fn resolve(&self, overrides: &BTreeMap<String, Value>) -> Result<Flags, FlagsError> {
        let mut values: BTreeMap<String, Value> = self
            .0
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect();
        for (name, value) in overrides {
            if !self.0.contains_key(name) {
                return Err(FlagsError::UnknownFlag(name.clone()));
            }
            values.insert(name.clone(), value.clone());
        }
        Ok(Flags(values))
    }
}

/// Runtime flag values handed to a pipeline's work method.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags(pub BTreeMap<String, Value>);

impl Flags {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// `true` only when the flag is present and set to JSON `true`.
    pub fn enabled(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(Value::Bool(true)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Check a class's declared flags.
///
/// `None` means the class takes no flags. Otherwise the declaration must be a
/// mapping whose keys contain no whitespace (they end up as form field ids)
/// and whose values are mappings with at least `default` and `long_name`.
pub fn validate_flags(flags: Option<&Value>) -> Result<Option<FlagSchema>, FlagsError> {
    let Some(flags) = flags else {
        return Ok(None);
    };
    let map = flags.as_object().ok_or(FlagsError::NotAMapping)?;

    let mut schema = BTreeMap::new();
    for (name, info) in map {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(FlagsError::InvalidName(name.clone()));
        }
        let info = info
            .as_object()
            .ok_or_else(|| FlagsError::NotADescription(name.clone()))?;
        let default = info.get("default").ok_or_else(|| FlagsError::MissingKey {
            name: name.clone(),
            key: "default",
        })?;
        let long_name = info.get("long_name").ok_or_else(|| FlagsError::MissingKey {
            name: name.clone(),
            key: "long_name",
        })?;
        let long_name = long_name
            .as_str()
            .ok_or_else(|| FlagsError::InvalidLongName(name.clone()))?;
        schema.insert(
            name.clone(),
            FlagSpec {
                default: default.clone(),
                long_name: long_name.to_string(),
            },
        );
    }
    Ok(Some(FlagSchema(schema)))
}
