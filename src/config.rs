//! Configuration IO
//!
//! JSON persistence shared by the sampling and prediction configurations.
use crate::errors::ForestError;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;

pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save the configuration as a json object to a file.
    ///
    /// * `path` - Path to save the configuration.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ForestError> {
        fs::write(path, self.json_dump()?).map_err(|e| ForestError::UnableToWrite(e.to_string()))
    }

    /// Dump the configuration as a json object.
    fn json_dump(&self) -> Result<String, ForestError> {
        serde_json::to_string(self).map_err(|e| ForestError::UnableToWrite(e.to_string()))
    }

    /// Load a configuration from a json string.
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, ForestError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| ForestError::UnableToRead(e.to_string()))
    }

    /// Load a configuration from a path to a json file.
    ///
    /// * `path` - Path to load the configuration from.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, ForestError> {
        let json_str = fs::read_to_string(path).map_err(|e| ForestError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}
