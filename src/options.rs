//! Converter options handed to the engine at session creation

use crate::compression::CompressionAlgorithm;
use crate::error::{ImsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine settings for one conversion session.
///
/// Every field has a default, so a JSON config only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Edge length of the thumbnail stored in the file
    pub thumbnail_size_xy: u32,
    pub flip_dimension_x: bool,
    pub flip_dimension_y: bool,
    pub flip_dimension_z: bool,
    /// Store file blocks one plane thick
    pub force_file_block_size_z1: bool,
    /// Let the engine print its own progress
    pub enable_log_progress: bool,
    /// Worker threads the engine may use for compression and writing
    pub number_of_threads: u32,
    pub compression_algorithm: CompressionAlgorithm,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            thumbnail_size_xy: 256,
            flip_dimension_x: false,
            flip_dimension_y: false,
            flip_dimension_z: false,
            force_file_block_size_z1: false,
            enable_log_progress: false,
            number_of_threads: 8,
            compression_algorithm: CompressionAlgorithm::default(),
        }
    }
}

impl Options {
    /// Set the compression algorithm
    pub fn with_compression(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.compression_algorithm = algorithm;
        self
    }

    /// Set the number of engine threads
    pub fn with_threads(mut self, number_of_threads: u32) -> Self {
        self.number_of_threads = number_of_threads;
        self
    }

    /// Enable or disable progress logging
    pub fn with_log_progress(mut self, enable: bool) -> Self {
        self.enable_log_progress = enable;
        self
    }

    /// Parse options from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.number_of_threads == 0 {
            return Err(ImsError::Configuration(
                "number_of_threads must be at least 1".to_string(),
            ));
        }
        if self.thumbnail_size_xy == 0 {
            return Err(ImsError::Configuration(
                "thumbnail_size_xy must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::GzipLevel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.compression_algorithm, CompressionAlgorithm::Gzip(GzipLevel::default()));
        assert_eq!(options.thumbnail_size_xy, 256);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_set_compression_none() {
        let options = Options::default().with_compression(CompressionAlgorithm::None);
        assert_eq!(options.compression_algorithm, CompressionAlgorithm::None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options =
            Options::from_json_str(r#"{"number_of_threads": 12, "enable_log_progress": true}"#)
                .unwrap();
        assert_eq!(options.number_of_threads, 12);
        assert!(options.enable_log_progress);
        assert_eq!(options.compression_algorithm, CompressionAlgorithm::default());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(Options::from_json_str(r#"{"number_of_threads": 0}"#).is_err());
        assert!(Options::from_json_str(r#"{"threads": 4}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"compression_algorithm": {{"lshuffle_gzip": 4}}}}"#).unwrap();

        let options = Options::from_json_file(file.path()).unwrap();
        assert_eq!(options.compression_algorithm.code(), 24);
    }
}
