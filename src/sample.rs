//! Typed sample buffers and numeric conversion into the declared data type

use crate::error::{ImsError, Result};
use crate::types::DataType;
use num_traits::{NumCast, ToPrimitive};

mod private {
    pub trait Sealed {}

    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for f32 {}
}

/// A Rust type that maps one-to-one onto an engine data type.
///
/// Sealed: the set of implementors is exactly the engine's native entry points.
pub trait Sample: private::Sealed + Copy + Default + NumCast + Send + Sync + 'static {
    /// Engine data type stored for this sample type
    const DATA_TYPE: DataType;

    /// Wrap a slice of samples in the matching buffer variant
    fn buffer(data: &[Self]) -> BlockBuffer<'_>;
}

impl Sample for u8 {
    const DATA_TYPE: DataType = DataType::U8;

    fn buffer(data: &[Self]) -> BlockBuffer<'_> {
        BlockBuffer::U8(data)
    }
}

impl Sample for u16 {
    const DATA_TYPE: DataType = DataType::U16;

    fn buffer(data: &[Self]) -> BlockBuffer<'_> {
        BlockBuffer::U16(data)
    }
}

impl Sample for u32 {
    const DATA_TYPE: DataType = DataType::U32;

    fn buffer(data: &[Self]) -> BlockBuffer<'_> {
        BlockBuffer::U32(data)
    }
}

impl Sample for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    fn buffer(data: &[Self]) -> BlockBuffer<'_> {
        BlockBuffer::F32(data)
    }
}

/// Borrowed block data, tagged with its data type.
///
/// Each variant corresponds to one engine copy-block entry point.
#[derive(Debug, Clone, Copy)]
pub enum BlockBuffer<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
    F32(&'a [f32]),
}

impl BlockBuffer<'_> {
    pub fn data_type(&self) -> DataType {
        match self {
            BlockBuffer::U8(_) => DataType::U8,
            BlockBuffer::U16(_) => DataType::U16,
            BlockBuffer::U32(_) => DataType::U32,
            BlockBuffer::F32(_) => DataType::F32,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            BlockBuffer::U8(d) => d.len(),
            BlockBuffer::U16(d) => d.len(),
            BlockBuffer::U32(d) => d.len(),
            BlockBuffer::F32(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every sample to f64 (lossless for all supported types)
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            BlockBuffer::U8(d) => d.iter().map(|&v| v as f64).collect(),
            BlockBuffer::U16(d) => d.iter().map(|&v| v as f64).collect(),
            BlockBuffer::U32(d) => d.iter().map(|&v| v as f64).collect(),
            BlockBuffer::F32(d) => d.iter().map(|&v| v as f64).collect(),
        }
    }
}

/// Owned block data produced by converting foreign samples
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedBlockBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl OwnedBlockBuffer {
    /// Convert samples of any numeric type into `data_type`, element by element.
    ///
    /// Values are converted numerically, never reinterpreted. A value the target
    /// type cannot represent (e.g. 300 into u8, a negative number or NaN into an
    /// unsigned type) is an error. Fractional parts are truncated toward zero when
    /// converting floats into integer types.
    pub fn convert<S, I>(data_type: DataType, samples: I) -> Result<Self>
    where
        S: ToPrimitive + Copy,
        I: IntoIterator<Item = S>,
    {
        Ok(match data_type {
            DataType::U8 => OwnedBlockBuffer::U8(convert_samples(samples)?),
            DataType::U16 => OwnedBlockBuffer::U16(convert_samples(samples)?),
            DataType::U32 => OwnedBlockBuffer::U32(convert_samples(samples)?),
            DataType::F32 => OwnedBlockBuffer::F32(convert_samples(samples)?),
        })
    }

    pub fn as_buffer(&self) -> BlockBuffer<'_> {
        match self {
            OwnedBlockBuffer::U8(d) => BlockBuffer::U8(d),
            OwnedBlockBuffer::U16(d) => BlockBuffer::U16(d),
            OwnedBlockBuffer::U32(d) => BlockBuffer::U32(d),
            OwnedBlockBuffer::F32(d) => BlockBuffer::F32(d),
        }
    }
}

/// Convert each sample into `T`, failing on the first value `T` cannot hold
pub fn convert_samples<S, T, I>(samples: I) -> Result<Vec<T>>
where
    S: ToPrimitive + Copy,
    T: Sample,
    I: IntoIterator<Item = S>,
{
    samples
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            <T as NumCast>::from(value).ok_or_else(|| {
                ImsError::DataConversion(format!(
                    "Sample {} ({:?}) does not fit into {}",
                    i,
                    value.to_f64(),
                    T::DATA_TYPE
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_tags() {
        let data = [1u16, 2, 3];
        let buffer = u16::buffer(&data);
        assert_eq!(buffer.data_type(), DataType::U16);
        assert_eq!(buffer.len(), 3);
        assert_eq!(f32::DATA_TYPE, DataType::F32);
    }

    #[test]
    fn test_widening_conversion() {
        let converted = OwnedBlockBuffer::convert(DataType::U16, [0u8, 130, 255]).unwrap();
        assert_eq!(converted, OwnedBlockBuffer::U16(vec![0, 130, 255]));

        let converted = OwnedBlockBuffer::convert(DataType::F32, [10u16, 240]).unwrap();
        assert_eq!(converted.as_buffer().to_f64_vec(), vec![10.0, 240.0]);
    }

    #[test]
    fn test_conversion_is_numeric_not_bitwise() {
        let converted: Vec<f32> = convert_samples([1u32, 1_000_000]).unwrap();
        assert_eq!(converted, vec![1.0, 1_000_000.0]);

        let converted: Vec<u8> = convert_samples([2.9f64, 0.0]).unwrap();
        assert_eq!(converted, vec![2, 0]);
    }

    #[test]
    fn test_out_of_range_conversion_fails() {
        assert!(convert_samples::<u16, u8, _>([10u16, 300]).is_err());
        assert!(convert_samples::<i32, u16, _>([-1i32]).is_err());
        assert!(matches!(
            OwnedBlockBuffer::convert(DataType::U32, [f64::NAN]),
            Err(ImsError::DataConversion(_))
        ));
    }
}
