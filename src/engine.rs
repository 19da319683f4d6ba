//! The writer engine boundary
//!
//! The engine does all encoding, compression and disk I/O. It is reached
//! through a fixed set of calls that report failure only through a
//! last-error poll; [`ImageConverter`](crate::ImageConverter) performs that
//! poll after every call.

use crate::error::Result;
use crate::metadata::{ColorInfo, Parameters, TimeInfo};
use crate::options::Options;
use crate::progress::ProgressForwarder;
use crate::sample::BlockBuffer;
use crate::types::{DataType, DimensionSequence, ImageExtents, Index5D, Size5D};
use std::path::Path;
use std::sync::Arc;

pub mod memory;
#[cfg(feature = "native")]
pub mod native;

pub use memory::MemoryEngine;
#[cfg(feature = "native")]
pub use native::NativeEngine;

/// Everything the engine needs to open a session
#[derive(Debug, Clone, Copy)]
pub struct CreateParams<'a> {
    pub data_type: DataType,
    pub image_size: Size5D,
    pub sample_size: Size5D,
    pub dimension_sequence: DimensionSequence,
    pub block_size: Size5D,
    pub output_path: &'a Path,
    pub options: &'a Options,
    pub application_name: &'a str,
    pub application_version: &'a str,
}

/// Metadata passed to the engine's single finish call
#[derive(Debug, Clone, Copy)]
pub struct FinishParams<'a> {
    pub image_extents: &'a ImageExtents,
    pub parameters: &'a Parameters,
    pub time_infos: &'a [TimeInfo],
    pub color_infos: &'a [ColorInfo],
    pub adjust_color_range: bool,
}

/// Factory for engine sessions
pub trait Engine {
    /// Open a session writing one output file.
    ///
    /// Returns `Err` only if no session handle could be obtained at all;
    /// other creation failures surface through [`EngineSession::last_error`].
    /// `progress` must stay reachable for as long as the session exists.
    fn create(
        &self,
        params: &CreateParams<'_>,
        progress: Arc<ProgressForwarder>,
    ) -> Result<Box<dyn EngineSession>>;
}

/// An open engine session.
///
/// Calls mirror the engine contract: they return nothing and record any
/// failure for [`last_error`](EngineSession::last_error) to report.
pub trait EngineSession: Send {
    /// Copy one block; `block` holds exactly one block's samples
    fn copy_block(&mut self, block: BlockBuffer<'_>, index: &Index5D);

    /// Write metadata and complete the file
    fn finish(&mut self, params: &FinishParams<'_>);

    /// Release all engine resources; called exactly once
    fn destroy(&mut self);

    /// Pending error message, if any
    fn last_error(&self) -> Option<String>;
}
