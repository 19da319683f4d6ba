//! Compression algorithm selection passed through to the engine
//!
//! The engine does all encoding; this module only names the algorithm and
//! maps it to the engine's numeric code.

use crate::error::{ImsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gzip level (1-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GzipLevel(u8);

impl GzipLevel {
    pub fn new(level: u8) -> Result<Self> {
        if (1..=9).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ImsError::Configuration(format!(
                "Gzip level must be between 1 and 9, got {}",
                level
            )))
        }
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for GzipLevel {
    fn default() -> Self {
        Self(2)
    }
}

impl TryFrom<u8> for GzipLevel {
    type Error = ImsError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<GzipLevel> for u8 {
    fn from(level: GzipLevel) -> Self {
        level.0
    }
}

/// Compression algorithms understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// Gzip
    Gzip(GzipLevel),
    /// Byte shuffle followed by gzip
    ShuffleGzip(GzipLevel),
    /// Shuffle of the lower bytes followed by gzip
    #[serde(rename = "lshuffle_gzip")]
    LShuffleGzip(GzipLevel),
    /// LZ4
    Lz4,
    /// Byte shuffle followed by LZ4
    ShuffleLz4,
    /// Shuffle of the lower bytes followed by LZ4
    #[serde(rename = "lshuffle_lz4")]
    LShuffleLz4,
}

impl CompressionAlgorithm {
    /// Numeric code expected by the engine
    pub fn code(&self) -> u32 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Gzip(level) => level.value() as u32,
            CompressionAlgorithm::ShuffleGzip(level) => 10 + level.value() as u32,
            CompressionAlgorithm::LShuffleGzip(level) => 20 + level.value() as u32,
            CompressionAlgorithm::Lz4 => 31,
            CompressionAlgorithm::ShuffleLz4 => 41,
            CompressionAlgorithm::LShuffleLz4 => 51,
        }
    }

    /// Inverse of [`code`](Self::code)
    pub fn from_code(code: u32) -> Option<Self> {
        let level = |offset: u32| {
            u8::try_from(code - offset)
                .ok()
                .and_then(|l| GzipLevel::new(l).ok())
        };

        match code {
            0 => Some(CompressionAlgorithm::None),
            1..=9 => level(0).map(CompressionAlgorithm::Gzip),
            11..=19 => level(10).map(CompressionAlgorithm::ShuffleGzip),
            21..=29 => level(20).map(CompressionAlgorithm::LShuffleGzip),
            31 => Some(CompressionAlgorithm::Lz4),
            41 => Some(CompressionAlgorithm::ShuffleLz4),
            51 => Some(CompressionAlgorithm::LShuffleLz4),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionAlgorithm::None)
    }
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        CompressionAlgorithm::Gzip(GzipLevel::default())
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::None => write!(f, "none"),
            CompressionAlgorithm::Gzip(l) => write!(f, "gzip level {}", l.value()),
            CompressionAlgorithm::ShuffleGzip(l) => write!(f, "shuffle gzip level {}", l.value()),
            CompressionAlgorithm::LShuffleGzip(l) => {
                write!(f, "lshuffle gzip level {}", l.value())
            }
            CompressionAlgorithm::Lz4 => write!(f, "lz4"),
            CompressionAlgorithm::ShuffleLz4 => write!(f, "shuffle lz4"),
            CompressionAlgorithm::LShuffleLz4 => write!(f, "lshuffle lz4"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_gzip_level_2() {
        let algorithm = CompressionAlgorithm::default();
        assert_eq!(algorithm, CompressionAlgorithm::Gzip(GzipLevel::new(2).unwrap()));
        assert_eq!(algorithm.code(), 2);
    }

    #[test]
    fn test_codes() {
        assert_eq!(CompressionAlgorithm::None.code(), 0);
        assert_eq!(CompressionAlgorithm::Gzip(GzipLevel::best()).code(), 9);
        assert_eq!(CompressionAlgorithm::ShuffleGzip(GzipLevel::fast()).code(), 11);
        assert_eq!(CompressionAlgorithm::LShuffleGzip(GzipLevel::best()).code(), 29);
        assert_eq!(CompressionAlgorithm::ShuffleLz4.code(), 41);

        for code in [0, 1, 5, 9, 11, 19, 21, 29, 31, 41, 51] {
            assert_eq!(CompressionAlgorithm::from_code(code).unwrap().code(), code);
        }
        assert_eq!(CompressionAlgorithm::from_code(10), None);
        assert_eq!(CompressionAlgorithm::from_code(30), None);
    }

    #[test]
    fn test_level_bounds() {
        assert!(GzipLevel::new(0).is_err());
        assert!(GzipLevel::new(10).is_err());
        assert_eq!(GzipLevel::new(6).unwrap().value(), 6);
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&CompressionAlgorithm::ShuffleGzip(GzipLevel::best())).unwrap();
        assert_eq!(json, r#"{"shuffle_gzip":9}"#);
        let none: CompressionAlgorithm = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(none, CompressionAlgorithm::None);
        assert!(serde_json::from_str::<CompressionAlgorithm>(r#"{"gzip":12}"#).is_err());
    }
}
