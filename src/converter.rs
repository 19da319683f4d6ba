//! Image converter session - main API for streaming an image into the engine

use crate::engine::{CreateParams, Engine, EngineSession, FinishParams};
use crate::error::{ImsError, Result};
use crate::layout::BlockGrid;
use crate::metadata::{ColorInfo, Parameters, TimeInfo};
use crate::options::Options;
use crate::progress::{ProgressCallback, ProgressForwarder};
use crate::sample::{BlockBuffer, OwnedBlockBuffer, Sample};
use crate::types::{DataType, DimensionSequence, ImageExtents, Index5D, Size5D};
use crate::utils::{default_application_name, default_application_version};
use ndarray::{ArrayView, Dimension as NdDimension};
use num_traits::ToPrimitive;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle state of a converter session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting blocks
    Open,
    /// The engine reported an error; only destroy is allowed
    Poisoned,
    /// Metadata written; only destroy is allowed
    Finished,
    /// Engine resources released
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Open => "open",
            SessionState::Poisoned => "poisoned",
            SessionState::Finished => "finished",
            SessionState::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

/// Collects everything needed to open a converter session.
///
/// All inputs are validated in [`create`](ImageConverterBuilder::create)
/// before the engine is called.
pub struct ImageConverterBuilder {
    data_type: DataType,
    image_size: Size5D,
    sample_size: Size5D,
    dimension_sequence: DimensionSequence,
    block_size: Size5D,
    output_path: Option<PathBuf>,
    options: Options,
    application_name: String,
    application_version: String,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl ImageConverterBuilder {
    pub fn new(data_type: DataType, image_size: Size5D, block_size: Size5D) -> Self {
        Self {
            data_type,
            image_size,
            sample_size: Size5D::ONE,
            dimension_sequence: DimensionSequence::default(),
            block_size,
            output_path: None,
            options: Options::default(),
            application_name: default_application_name().to_string(),
            application_version: default_application_version().to_string(),
            progress: None,
        }
    }

    pub fn with_sample_size(mut self, sample_size: Size5D) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Memory order of the axes inside every block buffer
    pub fn with_dimension_sequence(mut self, dimension_sequence: DimensionSequence) -> Self {
        self.dimension_sequence = dimension_sequence;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_application(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.application_name = name.into();
        self.application_version = version.into();
        self
    }

    /// Required: receives throttled progress from the engine
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Validate the inputs and open an engine session
    pub fn create(&self, engine: &dyn Engine) -> Result<ImageConverter> {
        if !self.sample_size.is_non_empty() {
            return Err(ImsError::InvalidDimensions(format!(
                "Sample size must be positive along every axis, got {}",
                self.sample_size
            )));
        }
        let grid = BlockGrid::new(self.image_size, self.block_size)?;
        let output_path = self
            .output_path
            .as_deref()
            .ok_or_else(|| ImsError::MissingField("output_path".to_string()))?;
        if output_path.as_os_str().is_empty() {
            return Err(ImsError::MissingField("output_path".to_string()));
        }
        let callback = self
            .progress
            .clone()
            .ok_or_else(|| ImsError::MissingField("progress_callback".to_string()))?;
        self.options.validate()?;

        let session_id = Uuid::new_v4();
        let forwarder = Arc::new(ProgressForwarder::new(
            callback,
            session_id,
            self.options.enable_log_progress,
        ));

        let params = CreateParams {
            data_type: self.data_type,
            image_size: self.image_size,
            sample_size: self.sample_size,
            dimension_sequence: self.dimension_sequence,
            block_size: self.block_size,
            output_path,
            options: &self.options,
            application_name: &self.application_name,
            application_version: &self.application_version,
        };

        let mut session = engine.create(&params, Arc::clone(&forwarder))?;
        if let Some(message) = session.last_error() {
            log::error!("[{}] Create failed: {}", session_id, message);
            session.destroy();
            return Err(ImsError::Engine(message));
        }

        log::info!(
            "[{}] Created {} converter for {}: {}, order {}, compression {}",
            session_id,
            self.data_type,
            output_path.display(),
            grid.summary(),
            self.dimension_sequence,
            self.options.compression_algorithm
        );

        Ok(ImageConverter {
            session_id,
            grid,
            data_type: self.data_type,
            state: SessionState::Open,
            session,
            forwarder,
            blocks_copied: 0,
        })
    }
}

/// An open conversion session writing one output file.
///
/// Every call checks its inputs first, then calls the engine, then polls
/// the engine for errors. An engine error poisons the session: later block
/// copies and finish fail with [`ImsError::InvalidState`], destroy still works.
/// Dropping an undestroyed converter destroys it.
pub struct ImageConverter {
    session_id: Uuid,
    grid: BlockGrid,
    data_type: DataType,
    state: SessionState,
    session: Box<dyn EngineSession>,
    forwarder: Arc<ProgressForwarder>,
    blocks_copied: usize,
}

impl ImageConverter {
    /// Copy one block of samples of the declared data type
    pub fn copy_block<T: Sample>(&mut self, data: &[T], index: &Index5D) -> Result<()> {
        self.ensure_open("copy a block")?;
        if T::DATA_TYPE != self.data_type {
            return Err(ImsError::DataTypeMismatch {
                expected: self.data_type.to_string(),
                actual: T::DATA_TYPE.to_string(),
            });
        }
        self.copy_buffer(T::buffer(data), index)
    }

    /// Copy one block of samples of any numeric type, converting each value
    /// into the declared data type
    pub fn copy_block_converted<S>(&mut self, data: &[S], index: &Index5D) -> Result<()>
    where
        S: ToPrimitive + Copy,
    {
        self.ensure_open("copy a block")?;
        self.check_block(data.len(), index)?;
        let converted = OwnedBlockBuffer::convert(self.data_type, data.iter().copied())?;
        self.copy_buffer(converted.as_buffer(), index)
    }

    /// Copy one block from an array; elements are taken in logical
    /// (row-major) order whatever the array's memory layout
    pub fn copy_block_array<S, D>(&mut self, data: ArrayView<'_, S, D>, index: &Index5D) -> Result<()>
    where
        S: ToPrimitive + Copy,
        D: NdDimension,
    {
        self.ensure_open("copy a block")?;
        self.check_block(data.len(), index)?;
        let converted = OwnedBlockBuffer::convert(self.data_type, data.iter().copied())?;
        self.copy_buffer(converted.as_buffer(), index)
    }

    /// Fill and copy every block of the grid in iteration order.
    ///
    /// `fill` receives each index and a zeroed buffer of one block.
    /// Returns the number of blocks copied.
    pub fn copy_blocks_with<T, F>(&mut self, mut fill: F) -> Result<usize>
    where
        T: Sample,
        F: FnMut(&Index5D, &mut [T]),
    {
        let grid = self.grid;
        let mut buffer = vec![T::default(); grid.block_voxel_count()];
        let mut copied = 0;
        for index in grid.iter() {
            buffer.fill(T::default());
            fill(&index, &mut buffer);
            self.copy_block(&buffer, &index)?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Does the block index cover at least part of the image?
    pub fn need_copy_block(&self, index: &Index5D) -> bool {
        self.grid.contains(index)
    }

    /// Hand metadata to the engine and complete the file
    pub fn finish(
        &mut self,
        image_extents: &ImageExtents,
        parameters: &Parameters,
        time_infos: &[TimeInfo],
        color_infos: &[ColorInfo],
        adjust_color_range: bool,
    ) -> Result<()> {
        self.ensure_open("finish")?;

        if !image_extents.is_valid() {
            return Err(ImsError::Metadata(format!(
                "Invalid image extents {:?}",
                image_extents
            )));
        }
        for (time_point, info) in time_infos.iter().enumerate() {
            info.validate().map_err(|e| match e {
                ImsError::Metadata(message) => {
                    ImsError::Metadata(format!("Time point {}: {}", time_point, message))
                }
                other => other,
            })?;
        }
        for (channel, info) in color_infos.iter().enumerate() {
            info.validate().map_err(|e| match e {
                ImsError::Metadata(message) => {
                    ImsError::Metadata(format!("Channel {}: {}", channel, message))
                }
                other => other,
            })?;
        }

        let image_size = self.grid.image_size();
        if time_infos.len() != image_size.t as usize {
            log::warn!(
                "[{}] {} time infos for {} time points",
                self.session_id,
                time_infos.len(),
                image_size.t
            );
        }
        if color_infos.len() != image_size.c as usize {
            log::warn!(
                "[{}] {} color infos for {} channels",
                self.session_id,
                color_infos.len(),
                image_size.c
            );
        }
        if self.blocks_copied < self.grid.total_blocks() {
            log::warn!(
                "[{}] Finishing after {} of {} blocks",
                self.session_id,
                self.blocks_copied,
                self.grid.total_blocks()
            );
        }

        self.session.finish(&FinishParams {
            image_extents,
            parameters,
            time_infos,
            color_infos,
            adjust_color_range,
        });
        self.poll("Finish")?;
        self.state = SessionState::Finished;

        log::info!(
            "[{}] Finished after {} blocks, {} parameter sections",
            self.session_id,
            self.blocks_copied,
            parameters.len()
        );
        Ok(())
    }

    /// Release the engine session; valid once, from any other state
    pub fn destroy(&mut self) -> Result<()> {
        if self.state == SessionState::Destroyed {
            return Err(ImsError::InvalidState(
                "Converter already destroyed".to_string(),
            ));
        }
        self.session.destroy();
        log::debug!("[{}] Destroyed in state {}", self.session_id, self.state);
        self.state = SessionState::Destroyed;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Blocks accepted by the engine so far
    pub fn blocks_copied(&self) -> usize {
        self.blocks_copied
    }

    /// Last progress percentage forwarded to the callback
    pub fn progress_percentage(&self) -> i32 {
        self.forwarder.last_percentage()
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        match self.state {
            SessionState::Open => Ok(()),
            state => Err(ImsError::InvalidState(format!(
                "Cannot {} on a {} converter",
                action, state
            ))),
        }
    }

    fn check_block(&self, len: usize, index: &Index5D) -> Result<()> {
        let expected = self.grid.block_voxel_count();
        if len != expected {
            return Err(ImsError::DataSizeMismatch {
                expected,
                actual: len,
            });
        }
        self.grid.check_index(index)
    }

    fn copy_buffer(&mut self, buffer: BlockBuffer<'_>, index: &Index5D) -> Result<()> {
        self.check_block(buffer.len(), index)?;

        log::debug!(
            "[{}] CopyBlock {} ({} {} samples)",
            self.session_id,
            index,
            buffer.len(),
            buffer.data_type()
        );
        self.session.copy_block(buffer, index);
        self.poll("CopyBlock")?;
        self.blocks_copied += 1;
        Ok(())
    }

    fn poll(&mut self, call: &str) -> Result<()> {
        match self.session.last_error() {
            None => Ok(()),
            Some(message) => {
                self.state = SessionState::Poisoned;
                log::error!("[{}] {} failed: {}", self.session_id, call, message);
                Err(ImsError::Engine(message))
            }
        }
    }
}

impl fmt::Debug for ImageConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageConverter")
            .field("session_id", &self.session_id)
            .field("data_type", &self.data_type)
            .field("state", &self.state)
            .field("grid", &self.grid)
            .field("blocks_copied", &self.blocks_copied)
            .finish()
    }
}

impl Drop for ImageConverter {
    fn drop(&mut self) {
        if self.state != SessionState::Destroyed {
            self.session.destroy();
            log::debug!("[{}] Destroyed on drop in state {}", self.session_id, self.state);
            self.state = SessionState::Destroyed;
        }
    }
}
