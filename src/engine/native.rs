//! Binding to the ImarisWriter shared library (`bpImarisWriter96`)
//!
//! The library is loaded at runtime; locating it is left to the caller.

use super::{CreateParams, Engine, EngineSession, FinishParams};
use crate::error::{ImsError, Result};
use crate::metadata::{ColorInfo, ColorMode, Parameters, TimeInfo};
use crate::options::Options;
use crate::progress::ProgressForwarder;
use crate::sample::BlockBuffer;
use crate::types::{DimensionSequence, ImageExtents, Index5D, Size5D};
use libloading::Library;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

#[repr(C)]
struct CSize5D {
    x: c_uint,
    y: c_uint,
    z: c_uint,
    c: c_uint,
    t: c_uint,
}

impl From<&Size5D> for CSize5D {
    fn from(size: &Size5D) -> Self {
        Self {
            x: size.x,
            y: size.y,
            z: size.z,
            c: size.c,
            t: size.t,
        }
    }
}

impl From<&Index5D> for CSize5D {
    fn from(index: &Index5D) -> Self {
        Self {
            x: index.x,
            y: index.y,
            z: index.z,
            c: index.c,
            t: index.t,
        }
    }
}

#[repr(C)]
struct CDimensionSequence5D {
    values: [c_int; 5],
}

impl From<&DimensionSequence> for CDimensionSequence5D {
    fn from(sequence: &DimensionSequence) -> Self {
        Self {
            values: (*sequence.order()).map(|d| d as c_int),
        }
    }
}

#[repr(C)]
struct COptions {
    thumbnail_size_xy: c_uint,
    flip_dimension_x: bool,
    flip_dimension_y: bool,
    flip_dimension_z: bool,
    force_file_block_size_z1: bool,
    enable_log_progress: bool,
    number_of_threads: c_uint,
    compression_algorithm: c_int,
}

impl From<&Options> for COptions {
    fn from(options: &Options) -> Self {
        Self {
            thumbnail_size_xy: options.thumbnail_size_xy,
            flip_dimension_x: options.flip_dimension_x,
            flip_dimension_y: options.flip_dimension_y,
            flip_dimension_z: options.flip_dimension_z,
            force_file_block_size_z1: options.force_file_block_size_z1,
            enable_log_progress: options.enable_log_progress,
            number_of_threads: options.number_of_threads,
            compression_algorithm: options.compression_algorithm.code() as c_int,
        }
    }
}

#[repr(C)]
struct CImageExtent {
    min_x: f32,
    min_y: f32,
    min_z: f32,
    max_x: f32,
    max_y: f32,
    max_z: f32,
}

impl From<&ImageExtents> for CImageExtent {
    fn from(e: &ImageExtents) -> Self {
        Self {
            min_x: e.min_x,
            min_y: e.min_y,
            min_z: e.min_z,
            max_x: e.max_x,
            max_y: e.max_y,
            max_z: e.max_z,
        }
    }
}

#[repr(C)]
struct CParameter {
    name: *const c_char,
    value: *const c_char,
}

#[repr(C)]
struct CParameterSection {
    name: *const c_char,
    values: *const CParameter,
    values_count: c_uint,
}

#[repr(C)]
struct CParameters {
    values: *const CParameterSection,
    values_count: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct CTimeInfo {
    julian_day: c_uint,
    nanoseconds_of_day: u64,
}

#[repr(C)]
struct CTimeInfos {
    values: *const CTimeInfo,
    values_count: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct CColor {
    red: f32,
    green: f32,
    blue: f32,
    alpha: f32,
}

#[repr(C)]
struct CColorInfo {
    is_base_color_mode: bool,
    base_color: CColor,
    color_table: *const CColor,
    color_table_size: c_uint,
    opacity: f32,
    range_min: f32,
    range_max: f32,
    gamma_correction: f32,
}

#[repr(C)]
struct CColorInfos {
    values: *const CColorInfo,
    values_count: c_uint,
}

type ProgressFn = extern "C" fn(progress: f32, total_bytes_written: u64, user_data: *mut c_void);

type CreateFn = unsafe extern "C" fn(
    data_type: c_int,
    image_size: *const CSize5D,
    sample: *const CSize5D,
    dimension_sequence: *const CDimensionSequence5D,
    block_size: *const CSize5D,
    output_file: *const c_char,
    options: *const COptions,
    application_name: *const c_char,
    application_version: *const c_char,
    progress_callback: ProgressFn,
    callback_user_data: *mut c_void,
) -> *mut c_void;
type CopyBlockFn<T> =
    unsafe extern "C" fn(converter: *mut c_void, data: *const T, block_index: *const CSize5D);
type FinishFn = unsafe extern "C" fn(
    converter: *mut c_void,
    image_extent: *const CImageExtent,
    parameters: *const CParameters,
    time_infos: *const CTimeInfos,
    color_infos: *const CColorInfos,
    adjust_color_range: bool,
);
type DestroyFn = unsafe extern "C" fn(converter: *mut c_void);
type LastErrorFn = unsafe extern "C" fn(converter: *mut c_void) -> *const c_char;

/// Resolved entry points; `_library` keeps them valid
struct NativeApi {
    create: CreateFn,
    copy_block_u8: CopyBlockFn<u8>,
    copy_block_u16: CopyBlockFn<u16>,
    copy_block_u32: CopyBlockFn<u32>,
    copy_block_f32: CopyBlockFn<f32>,
    finish: FinishFn,
    destroy: DestroyFn,
    last_error: LastErrorFn,
    _library: Library,
}

/// Engine backed by the native ImarisWriter library
pub struct NativeEngine {
    api: Arc<NativeApi>,
}

impl NativeEngine {
    /// Load the library from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initialisers; the ImarisWriter
        // library has no special requirements there.
        let library = unsafe { Library::new(path) }
            .map_err(|e| ImsError::LibraryLoad(format!("{}: {}", path.display(), e)))?;

        unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
            library.get::<T>(name).map(|s| *s).map_err(|e| {
                ImsError::LibraryLoad(format!(
                    "Missing symbol {}: {}",
                    String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]),
                    e
                ))
            })
        }

        // SAFETY: the signatures match the C header of the library.
        let api = unsafe {
            NativeApi {
                create: symbol(&library, b"bpImageConverterC_Create\0")?,
                copy_block_u8: symbol(&library, b"bpImageConverterC_CopyBlockUInt8\0")?,
                copy_block_u16: symbol(&library, b"bpImageConverterC_CopyBlockUInt16\0")?,
                copy_block_u32: symbol(&library, b"bpImageConverterC_CopyBlockUInt32\0")?,
                copy_block_f32: symbol(&library, b"bpImageConverterC_CopyBlockFloat\0")?,
                finish: symbol(&library, b"bpImageConverterC_Finish\0")?,
                destroy: symbol(&library, b"bpImageConverterC_Destroy\0")?,
                last_error: symbol(&library, b"bpImageConverterC_GetLastException\0")?,
                _library: library,
            }
        };

        log::info!("Loaded ImarisWriter library from {}", path.display());
        Ok(Self { api: Arc::new(api) })
    }
}

fn c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| ImsError::Configuration(format!("{} contains a NUL byte", what)))
}

extern "C" fn progress_trampoline(progress: f32, total_bytes_written: u64, user_data: *mut c_void) {
    if user_data.is_null() {
        return;
    }
    // SAFETY: user_data is the ProgressForwarder owned by the session, which
    // outlives every engine call.
    let forwarder = unsafe { &*(user_data as *const ProgressForwarder) };
    let result = catch_unwind(AssertUnwindSafe(|| {
        forwarder.report(progress, total_bytes_written)
    }));
    if result.is_err() {
        log::error!("Progress callback panicked; panic suppressed at the engine boundary");
    }
}

impl Engine for NativeEngine {
    fn create(
        &self,
        params: &CreateParams<'_>,
        progress: Arc<ProgressForwarder>,
    ) -> Result<Box<dyn EngineSession>> {
        let output = params
            .output_path
            .to_str()
            .ok_or_else(|| ImsError::Configuration("Output path is not valid UTF-8".to_string()))?;
        let output = c_string(output, "Output path")?;
        let application_name = c_string(params.application_name, "Application name")?;
        let application_version = c_string(params.application_version, "Application version")?;

        let image_size = CSize5D::from(&params.image_size);
        let sample_size = CSize5D::from(&params.sample_size);
        let block_size = CSize5D::from(&params.block_size);
        let dimension_sequence = CDimensionSequence5D::from(&params.dimension_sequence);
        let options = COptions::from(params.options);
        let user_data = Arc::as_ptr(&progress) as *mut c_void;

        // SAFETY: every pointer refers to a local that lives until the call returns;
        // user_data stays valid because the session keeps `progress` alive.
        let handle = unsafe {
            (self.api.create)(
                params.data_type as c_int,
                &image_size,
                &sample_size,
                &dimension_sequence,
                &block_size,
                output.as_ptr(),
                &options,
                application_name.as_ptr(),
                application_version.as_ptr(),
                progress_trampoline,
                user_data,
            )
        };

        if handle.is_null() {
            return Err(ImsError::Engine(
                "Engine did not return a converter handle".to_string(),
            ));
        }

        Ok(Box::new(NativeSession {
            api: Arc::clone(&self.api),
            handle,
            marshal_error: None,
            _progress: progress,
        }))
    }
}

struct NativeSession {
    api: Arc<NativeApi>,
    handle: *mut c_void,
    /// Set when metadata could not be passed to the engine at all
    marshal_error: Option<String>,
    _progress: Arc<ProgressForwarder>,
}

// SAFETY: the handle is owned exclusively by this session and the engine
// does not tie it to the creating thread.
unsafe impl Send for NativeSession {}

/// Parameters laid out as the engine expects; owns every string it points to
struct MarshalledParameters {
    _strings: Vec<CString>,
    _entries: Vec<Vec<CParameter>>,
    sections: Vec<CParameterSection>,
}

impl MarshalledParameters {
    fn new(parameters: &Parameters) -> Result<Self> {
        let mut strings = Vec::new();
        let mut entries = Vec::new();
        let mut section_names = Vec::new();

        for (section, values) in parameters.sections() {
            let name = c_string(section, "Parameter section")?;
            section_names.push(name.as_ptr());
            strings.push(name);

            let mut section_entries = Vec::with_capacity(values.len());
            for (key, value) in values {
                let key = c_string(key, "Parameter name")?;
                let value = c_string(value.as_str(), "Parameter value")?;
                section_entries.push(CParameter {
                    name: key.as_ptr(),
                    value: value.as_ptr(),
                });
                strings.push(key);
                strings.push(value);
            }
            entries.push(section_entries);
        }

        let sections = section_names
            .into_iter()
            .zip(&entries)
            .map(|(name, values)| CParameterSection {
                name,
                values: values.as_ptr(),
                values_count: values.len() as c_uint,
            })
            .collect();

        Ok(Self {
            _strings: strings,
            _entries: entries,
            sections,
        })
    }

    fn as_c(&self) -> CParameters {
        CParameters {
            values: self.sections.as_ptr(),
            values_count: self.sections.len() as c_uint,
        }
    }
}

fn marshal_time_infos(time_infos: &[TimeInfo]) -> Vec<CTimeInfo> {
    time_infos
        .iter()
        .map(|t| CTimeInfo {
            julian_day: t.julian_day,
            nanoseconds_of_day: t.nanoseconds_of_day,
        })
        .collect()
}

fn to_c_color(color: &crate::metadata::Color) -> CColor {
    CColor {
        red: color.red,
        green: color.green,
        blue: color.blue,
        alpha: color.alpha,
    }
}

/// Color infos plus the lookup tables they point into
struct MarshalledColorInfos {
    _tables: Vec<Vec<CColor>>,
    infos: Vec<CColorInfo>,
}

impl MarshalledColorInfos {
    fn new(color_infos: &[ColorInfo]) -> Self {
        let tables: Vec<Vec<CColor>> = color_infos
            .iter()
            .map(|info| match info.mode() {
                ColorMode::ColorTable(table) => table.iter().map(to_c_color).collect(),
                ColorMode::BaseColor(_) => Vec::new(),
            })
            .collect();

        let infos = color_infos
            .iter()
            .zip(&tables)
            .map(|(info, table)| CColorInfo {
                is_base_color_mode: info.is_base_color_mode(),
                base_color: info
                    .base_color()
                    .map(to_c_color)
                    .unwrap_or(CColor {
                        red: 1.0,
                        green: 1.0,
                        blue: 1.0,
                        alpha: 1.0,
                    }),
                color_table: if table.is_empty() {
                    ptr::null()
                } else {
                    table.as_ptr()
                },
                color_table_size: table.len() as c_uint,
                opacity: info.opacity,
                range_min: info.range_min,
                range_max: info.range_max,
                gamma_correction: info.gamma_correction,
            })
            .collect();

        Self {
            _tables: tables,
            infos,
        }
    }
}

impl EngineSession for NativeSession {
    fn copy_block(&mut self, block: BlockBuffer<'_>, index: &Index5D) {
        let index = CSize5D::from(index);
        // SAFETY: the converter checked the buffer length against the block size.
        unsafe {
            match block {
                BlockBuffer::U8(d) => (self.api.copy_block_u8)(self.handle, d.as_ptr(), &index),
                BlockBuffer::U16(d) => (self.api.copy_block_u16)(self.handle, d.as_ptr(), &index),
                BlockBuffer::U32(d) => (self.api.copy_block_u32)(self.handle, d.as_ptr(), &index),
                BlockBuffer::F32(d) => (self.api.copy_block_f32)(self.handle, d.as_ptr(), &index),
            }
        }
    }

    fn finish(&mut self, params: &FinishParams<'_>) {
        let parameters = match MarshalledParameters::new(params.parameters) {
            Ok(parameters) => parameters,
            Err(e) => {
                self.marshal_error = Some(e.to_string());
                return;
            }
        };
        let c_parameters = parameters.as_c();

        let time_infos = marshal_time_infos(params.time_infos);
        let c_time_infos = CTimeInfos {
            values: time_infos.as_ptr(),
            values_count: time_infos.len() as c_uint,
        };

        let color_infos = MarshalledColorInfos::new(params.color_infos);
        let c_color_infos = CColorInfos {
            values: color_infos.infos.as_ptr(),
            values_count: color_infos.infos.len() as c_uint,
        };

        let extent = CImageExtent::from(params.image_extents);

        // SAFETY: all marshalled data lives until the end of this function.
        unsafe {
            (self.api.finish)(
                self.handle,
                &extent,
                &c_parameters,
                &c_time_infos,
                &c_color_infos,
                params.adjust_color_range,
            )
        }
    }

    fn destroy(&mut self) {
        if self.handle.is_null() {
            return;
        }
        // SAFETY: the handle came from create and is destroyed once.
        unsafe { (self.api.destroy)(self.handle) };
        self.handle = ptr::null_mut();
    }

    fn last_error(&self) -> Option<String> {
        if let Some(message) = &self.marshal_error {
            return Some(message.clone());
        }
        if self.handle.is_null() {
            return None;
        }
        // SAFETY: the engine returns null or a NUL-terminated string owned by the converter.
        unsafe {
            let message = (self.api.last_error)(self.handle);
            if message.is_null() {
                None
            } else {
                Some(CStr::from_ptr(message).to_string_lossy().into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Color;

    #[test]
    fn test_missing_library() {
        let result = NativeEngine::load("/nonexistent/libbpImarisWriter96.so");
        assert!(matches!(result, Err(ImsError::LibraryLoad(_))));
    }

    #[test]
    fn test_parameters_marshalled_by_section() {
        let mut parameters = Parameters::new();
        parameters.set_value("Image", "ImageSizeInMB", 2400);
        parameters.set_channel_name(0, "DAPI");

        let marshalled = MarshalledParameters::new(&parameters).unwrap();
        let c = marshalled.as_c();
        assert_eq!(c.values_count, 2);

        // SAFETY: pointers refer into `marshalled`, which is still alive.
        unsafe {
            let first = &*c.values;
            assert_eq!(CStr::from_ptr(first.name).to_str().unwrap(), "Channel 0");
            assert_eq!(first.values_count, 1);
            let entry = &*first.values;
            assert_eq!(CStr::from_ptr(entry.value).to_str().unwrap(), "DAPI");

            let second = &*c.values.add(1);
            let entry = &*second.values;
            assert_eq!(CStr::from_ptr(entry.name).to_str().unwrap(), "ImageSizeInMB");
            assert_eq!(CStr::from_ptr(entry.value).to_str().unwrap(), "2400");
        }

        let mut bad = Parameters::new();
        bad.set_value("Image", "Info", "nul\0byte");
        assert!(MarshalledParameters::new(&bad).is_err());
    }

    #[test]
    fn test_color_infos_marshalled() {
        let mut table = ColorInfo::new();
        table
            .set_color_table(vec![Color::WHITE, Color::new(0.0, 0.5, 1.0, 1.0).unwrap()])
            .unwrap();
        let base = ColorInfo::new();

        let marshalled = MarshalledColorInfos::new(&[table, base]);
        assert!(!marshalled.infos[0].is_base_color_mode);
        assert_eq!(marshalled.infos[0].color_table_size, 2);
        assert!(marshalled.infos[1].is_base_color_mode);
        assert!(marshalled.infos[1].color_table.is_null());

        // SAFETY: the table is owned by `marshalled`.
        let second = unsafe { *marshalled.infos[0].color_table.add(1) };
        assert_eq!(second.green, 0.5);
    }

    #[test]
    fn test_dimension_sequence_codes() {
        let sequence: DimensionSequence = "tczyx".parse().unwrap();
        assert_eq!(CDimensionSequence5D::from(&sequence).values, [4, 3, 2, 1, 0]);
    }
}
