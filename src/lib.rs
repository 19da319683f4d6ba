//! ims-writer - streaming block conversion into Imaris (`.ims`) files
//!
//! A client for the ImarisWriter engine. The engine does all encoding,
//! compression and disk I/O; this crate describes the image geometry,
//! feeds the engine one block at a time, assembles the metadata and
//! forwards throttled progress.
//!
//! # Features
//!
//! - Named-axis 5D geometry (X, Y, Z, channel, time) and block grid iteration
//! - Typed block copies for u8, u16, u32 and f32, with numeric conversion from other types
//! - Parameters, per-timepoint Julian day stamps and per-channel color metadata
//! - Progress forwarding in 5% steps and error polling after every engine call
//! - In-memory engine for dry runs and tests; native engine behind the `native` feature
//!
//! # Example
//!
//! ```rust,ignore
//! use ims_writer::{DataType, ImageConverterBuilder, Index5D, MemoryEngine, Size5D};
//! use std::sync::Arc;
//!
//! # fn example() -> ims_writer::Result<()> {
//! let image: Size5D = "x=512,y=512,z=32,c=2,t=4".parse()?;
//! let block: Size5D = "x=256,y=256,z=8,c=1,t=1".parse()?;
//!
//! let engine = MemoryEngine::new();
//! let mut converter = ImageConverterBuilder::new(DataType::U16, image, block)
//!     .with_output_path("out.ims")
//!     .with_progress_callback(Arc::new(|p: f32, bytes: u64| println!("{p} {bytes}")))
//!     .create(&engine)?;
//!
//! let buffer = vec![0u16; converter.grid().block_voxel_count()];
//! for index in converter.grid().iter().collect::<Vec<_>>() {
//!     converter.copy_block(&buffer, &index)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod converter;
pub mod engine;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod options;
pub mod progress;
pub mod sample;
pub mod time;
pub mod types;
pub mod utils;

// Re-exports
pub use compression::{CompressionAlgorithm, GzipLevel};
pub use converter::{ImageConverter, ImageConverterBuilder, SessionState};
pub use engine::{Engine, EngineSession, MemoryEngine};
#[cfg(feature = "native")]
pub use engine::NativeEngine;
pub use error::{ErrorCategory, ImsError, Result};
pub use layout::BlockGrid;
pub use metadata::{Color, ColorInfo, ColorMode, ParameterValue, Parameters, TimeInfo};
pub use options::Options;
pub use progress::{ProgressCallback, ProgressThrottle};
pub use sample::Sample;
pub use time::{nanoseconds_of_day, to_julian_day};
pub use types::{DataType, Dimension, DimensionSequence, ImageExtents, Index5D, Size5D};

/// Version of this crate, reported to the engine by default
pub const IMS_WRITER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!IMS_WRITER_VERSION.is_empty());
        assert_eq!(IMS_WRITER_VERSION, utils::default_application_version());
    }
}
