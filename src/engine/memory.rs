//! In-process engine that records everything it is given
//!
//! Useful for dry runs and tests: blocks and metadata are kept in memory
//! instead of being encoded into a file. Failures can be injected to
//! exercise error handling.

use super::{CreateParams, Engine, EngineSession, FinishParams};
use crate::error::Result;
use crate::layout::BlockGrid;
use crate::metadata::{ColorInfo, Parameters, TimeInfo};
use crate::options::Options;
use crate::progress::ProgressForwarder;
use crate::sample::BlockBuffer;
use crate::types::{DataType, DimensionSequence, ImageExtents, Index5D, Size5D};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Share of the progress range covered by block copies; finishing covers the rest
const BLOCK_PROGRESS_SHARE: f32 = 0.9;

/// One call received by a session, in order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Create,
    CopyBlock(Index5D),
    Finish,
    Destroy,
}

/// Metadata received by finish
#[derive(Debug, Clone, PartialEq)]
pub struct FinishRecord {
    pub image_extents: ImageExtents,
    pub parameters: Parameters,
    pub time_infos: Vec<TimeInfo>,
    pub color_infos: Vec<ColorInfo>,
    pub adjust_color_range: bool,
}

/// A block as received, widened to f64; `samples` is empty when the engine discards them
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub index: Index5D,
    pub data_type: DataType,
    pub samples: Vec<f64>,
}

/// Everything one session received
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub data_type: DataType,
    pub image_size: Size5D,
    pub sample_size: Size5D,
    pub block_size: Size5D,
    pub dimension_sequence: DimensionSequence,
    pub output_path: PathBuf,
    pub options: Options,
    pub application_name: String,
    pub application_version: String,
    pub calls: Vec<EngineCall>,
    pub blocks: Vec<BlockRecord>,
    pub finish: Option<FinishRecord>,
    pub destroyed: bool,
    pub bytes_written: u64,
}

impl SessionRecord {
    pub fn block(&self, index: &Index5D) -> Option<&BlockRecord> {
        self.blocks.iter().find(|b| b.index == *index)
    }
}

/// Failures to inject into sessions created by a [`MemoryEngine`]
#[derive(Debug, Clone, Default)]
struct FailurePlan {
    on_create: Option<String>,
    on_block: Option<(usize, String)>,
    on_finish: Option<String>,
}

/// Engine that keeps sessions in memory.
///
/// Cloning shares the recorded sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    sessions: Arc<Mutex<Vec<SessionRecord>>>,
    failures: FailurePlan,
    discard_samples: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record block indices and byte counts but drop the sample values
    pub fn discard_samples(mut self) -> Self {
        self.discard_samples = true;
        self
    }

    /// Sessions report `message` right after creation
    pub fn fail_on_create(mut self, message: impl Into<String>) -> Self {
        self.failures.on_create = Some(message.into());
        self
    }

    /// Sessions report `message` when the `block_number`-th (0-based) block arrives
    pub fn fail_on_block(mut self, block_number: usize, message: impl Into<String>) -> Self {
        self.failures.on_block = Some((block_number, message.into()));
        self
    }

    /// Sessions report `message` when finishing
    pub fn fail_on_finish(mut self, message: impl Into<String>) -> Self {
        self.failures.on_finish = Some(message.into());
        self
    }

    /// Snapshot of all sessions created so far
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.lock().clone()
    }

    /// Snapshot of the most recently created session
    pub fn last_session(&self) -> Option<SessionRecord> {
        self.sessions.lock().last().cloned()
    }
}

impl Engine for MemoryEngine {
    fn create(
        &self,
        params: &CreateParams<'_>,
        progress: Arc<ProgressForwarder>,
    ) -> Result<Box<dyn EngineSession>> {
        let record = SessionRecord {
            data_type: params.data_type,
            image_size: params.image_size,
            sample_size: params.sample_size,
            block_size: params.block_size,
            dimension_sequence: params.dimension_sequence,
            output_path: params.output_path.to_path_buf(),
            options: params.options.clone(),
            application_name: params.application_name.to_string(),
            application_version: params.application_version.to_string(),
            calls: vec![EngineCall::Create],
            blocks: Vec::new(),
            finish: None,
            destroyed: false,
            bytes_written: 0,
        };

        let grid = BlockGrid::new(params.image_size, params.block_size).ok();

        let slot = {
            let mut sessions = self.sessions.lock();
            sessions.push(record);
            sessions.len() - 1
        };

        Ok(Box::new(MemorySession {
            sessions: Arc::clone(&self.sessions),
            slot,
            grid,
            failures: self.failures.clone(),
            discard_samples: self.discard_samples,
            progress,
            error: self.failures.on_create.clone(),
        }))
    }
}

struct MemorySession {
    sessions: Arc<Mutex<Vec<SessionRecord>>>,
    slot: usize,
    grid: Option<BlockGrid>,
    failures: FailurePlan,
    discard_samples: bool,
    progress: Arc<ProgressForwarder>,
    error: Option<String>,
}

impl MemorySession {
    fn with_record<R>(&self, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        let mut sessions = self.sessions.lock();
        f(&mut sessions[self.slot])
    }

    fn check_block(&self, block: &BlockBuffer<'_>, index: &Index5D) -> std::result::Result<(), String> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| "Session was created with invalid geometry".to_string())?;

        if !grid.contains(index) {
            return Err(format!("Block index {} is out of range", index));
        }
        if block.len() != grid.block_voxel_count() {
            return Err(format!(
                "Block has {} samples, expected {}",
                block.len(),
                grid.block_voxel_count()
            ));
        }
        Ok(())
    }
}

impl EngineSession for MemorySession {
    fn copy_block(&mut self, block: BlockBuffer<'_>, index: &Index5D) {
        let (declared, finished, copied) = self.with_record(|r| {
            r.calls.push(EngineCall::CopyBlock(*index));
            (r.data_type, r.finish.is_some(), r.blocks.len())
        });

        if finished {
            self.error = Some("CopyBlock called after Finish".to_string());
            return;
        }
        if block.data_type() != declared {
            self.error = Some(format!(
                "Copy of a {} block into a {} image",
                block.data_type(),
                declared
            ));
            return;
        }
        if let Err(message) = self.check_block(&block, index) {
            self.error = Some(message);
            return;
        }
        if let Some((number, message)) = &self.failures.on_block {
            if *number == copied {
                self.error = Some(message.clone());
                return;
            }
        }

        let bytes = (block.len() * declared.size_in_bytes()) as u64;
        let samples = if self.discard_samples {
            Vec::new()
        } else {
            block.to_f64_vec()
        };
        let (copied, bytes_written) = self.with_record(|r| {
            r.blocks.push(BlockRecord {
                index: *index,
                data_type: declared,
                samples,
            });
            r.bytes_written += bytes;
            (r.blocks.len(), r.bytes_written)
        });

        if let Some(grid) = &self.grid {
            let fraction = copied as f32 / grid.total_blocks() as f32;
            self.progress
                .report(fraction * BLOCK_PROGRESS_SHARE, bytes_written);
        }
    }

    fn finish(&mut self, params: &FinishParams<'_>) {
        let already_finished = self.with_record(|r| {
            r.calls.push(EngineCall::Finish);
            r.finish.is_some()
        });

        if already_finished {
            self.error = Some("Finish called twice".to_string());
            return;
        }
        if let Some(message) = &self.failures.on_finish {
            self.error = Some(message.clone());
            return;
        }

        let bytes_written = self.with_record(|r| {
            r.finish = Some(FinishRecord {
                image_extents: *params.image_extents,
                parameters: params.parameters.clone(),
                time_infos: params.time_infos.to_vec(),
                color_infos: params.color_infos.to_vec(),
                adjust_color_range: params.adjust_color_range,
            });
            r.bytes_written
        });
        self.progress.report(1.0, bytes_written);
    }

    fn destroy(&mut self) {
        self.with_record(|r| {
            r.calls.push(EngineCall::Destroy);
            r.destroyed = true;
        });
    }

    fn last_error(&self) -> Option<String> {
        self.error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use uuid::Uuid;

    fn params<'a>(options: &'a Options) -> CreateParams<'a> {
        CreateParams {
            data_type: DataType::U8,
            image_size: Size5D {
                x: 4,
                y: 4,
                z: 2,
                c: 1,
                t: 1,
            },
            sample_size: Size5D::ONE,
            dimension_sequence: DimensionSequence::default(),
            block_size: Size5D {
                x: 4,
                y: 4,
                z: 1,
                c: 1,
                t: 1,
            },
            output_path: Path::new("memory.ims"),
            options,
            application_name: "test",
            application_version: "0",
        }
    }

    fn forwarder() -> Arc<ProgressForwarder> {
        Arc::new(ProgressForwarder::new(
            Arc::new(|_: f32, _: u64| {}),
            Uuid::new_v4(),
            false,
        ))
    }

    #[test]
    fn test_records_blocks() {
        let engine = MemoryEngine::new();
        let options = Options::default();
        let mut session = engine.create(&params(&options), forwarder()).unwrap();

        let data = [7u8; 16];
        session.copy_block(BlockBuffer::U8(&data), &Index5D { z: 1, ..Default::default() });
        assert_eq!(session.last_error(), None);
        session.destroy();

        let record = engine.last_session().unwrap();
        assert_eq!(record.blocks.len(), 1);
        assert_eq!(record.bytes_written, 16);
        assert_eq!(record.block(&Index5D { z: 1, ..Default::default() }).unwrap().samples, vec![7.0; 16]);
        assert_eq!(
            record.calls,
            vec![
                EngineCall::Create,
                EngineCall::CopyBlock(Index5D { z: 1, ..Default::default() }),
                EngineCall::Destroy
            ]
        );
    }

    #[test]
    fn test_rejects_wrong_type_and_size() {
        let engine = MemoryEngine::new();
        let options = Options::default();
        let mut session = engine.create(&params(&options), forwarder()).unwrap();

        session.copy_block(BlockBuffer::U16(&[0u16; 16]), &Index5D::default());
        assert!(session.last_error().unwrap().contains("uint16"));

        let mut session = engine.create(&params(&options), forwarder()).unwrap();
        session.copy_block(BlockBuffer::U8(&[0u8; 15]), &Index5D::default());
        assert!(session.last_error().is_some());
    }

    #[test]
    fn test_injected_failures() {
        let engine = MemoryEngine::new().fail_on_block(1, "disk full");
        let options = Options::default();
        let mut session = engine.create(&params(&options), forwarder()).unwrap();

        session.copy_block(BlockBuffer::U8(&[0u8; 16]), &Index5D::default());
        assert_eq!(session.last_error(), None);
        session.copy_block(BlockBuffer::U8(&[0u8; 16]), &Index5D { z: 1, ..Default::default() });
        assert_eq!(session.last_error().as_deref(), Some("disk full"));

        let engine = MemoryEngine::new().fail_on_create("cannot open file");
        let session = engine.create(&params(&options), forwarder()).unwrap();
        assert_eq!(session.last_error().as_deref(), Some("cannot open file"));
    }
}
