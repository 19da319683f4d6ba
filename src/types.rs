//! Core value types: 5D sizes and indices, axis order and sample data types

use crate::error::{ImsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five image axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Dimension {
    X = 0,
    Y = 1,
    Z = 2,
    C = 3,
    T = 4,
}

impl Dimension {
    /// All axes in their canonical x, y, z, c, t order
    pub const ALL: [Dimension; 5] = [
        Dimension::X,
        Dimension::Y,
        Dimension::Z,
        Dimension::C,
        Dimension::T,
    ];

    /// Parse a single axis label, ignoring case
    pub fn from_char(label: char) -> Option<Self> {
        match label.to_ascii_lowercase() {
            'x' => Some(Dimension::X),
            'y' => Some(Dimension::Y),
            'z' => Some(Dimension::Z),
            'c' => Some(Dimension::C),
            't' => Some(Dimension::T),
            _ => None,
        }
    }

    /// Lowercase label of this axis
    pub fn label(&self) -> char {
        match self {
            Dimension::X => 'x',
            Dimension::Y => 'y',
            Dimension::Z => 'z',
            Dimension::C => 'c',
            Dimension::T => 't',
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Extent of an image (or block, or block grid) along all five axes.
///
/// Axes are only ever addressed by name. Build it with a struct literal,
/// `FromStr` or serde; each requires every axis to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Size5D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub c: u32,
    pub t: u32,
}

impl Size5D {
    /// Size of one along every axis
    pub const ONE: Size5D = Size5D {
        x: 1,
        y: 1,
        z: 1,
        c: 1,
        t: 1,
    };

    /// Value along a given axis
    pub fn get(&self, dim: Dimension) -> u32 {
        match dim {
            Dimension::X => self.x,
            Dimension::Y => self.y,
            Dimension::Z => self.z,
            Dimension::C => self.c,
            Dimension::T => self.t,
        }
    }

    /// Total number of voxels (product of all axes), saturating at `usize::MAX`
    pub fn voxel_count(&self) -> usize {
        self.checked_voxel_count().unwrap_or(usize::MAX)
    }

    /// Total number of voxels, or `None` if it does not fit in `usize`
    pub fn checked_voxel_count(&self) -> Option<usize> {
        Dimension::ALL
            .iter()
            .try_fold(1usize, |count, &d| count.checked_mul(self.get(d) as usize))
    }

    /// True when every axis is at least one
    pub fn is_non_empty(&self) -> bool {
        Dimension::ALL.iter().all(|&d| self.get(d) > 0)
    }

    /// Component-wise ceiling division.
    ///
    /// Turns an image size and a block size into the number of blocks along each axis.
    pub fn div_ceil(&self, divisor: &Size5D) -> Result<Size5D> {
        if let Some(dim) = Dimension::ALL.iter().find(|&&d| divisor.get(d) == 0) {
            return Err(ImsError::InvalidDimensions(format!(
                "Division by zero along axis {}",
                dim
            )));
        }

        Ok(Size5D {
            x: self.x.div_ceil(divisor.x),
            y: self.y.div_ceil(divisor.y),
            z: self.z.div_ceil(divisor.z),
            c: self.c.div_ceil(divisor.c),
            t: self.t.div_ceil(divisor.t),
        })
    }
}

impl fmt::Display for Size5D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={},y={},z={},c={},t={}",
            self.x, self.y, self.z, self.c, self.t
        )
    }
}

/// Parses `x=512,y=512,z=32,c=2,t=4` (any order, axis names case-insensitive).
impl FromStr for Size5D {
    type Err = ImsError;

    fn from_str(s: &str) -> Result<Self> {
        let mut values: [Option<u32>; 5] = [None; 5];

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                ImsError::InvalidDimensions(format!("Expected axis=value, got '{}'", part))
            })?;

            let name = name.trim();
            let mut chars = name.chars();
            let dim = match (chars.next(), chars.next()) {
                (Some(label), None) => Dimension::from_char(label),
                _ => None,
            }
            .ok_or_else(|| ImsError::InvalidDimensions(format!("Unknown axis '{}'", name)))?;

            let value: u32 = value.trim().parse().map_err(|_| {
                ImsError::InvalidDimensions(format!(
                    "Axis {} must be a non-negative integer, got '{}'",
                    dim,
                    value.trim()
                ))
            })?;

            let slot = &mut values[dim as usize];
            if slot.is_some() {
                return Err(ImsError::InvalidDimensions(format!(
                    "Axis {} given more than once",
                    dim
                )));
            }
            *slot = Some(value);
        }

        let axis = |dim: Dimension| {
            values[dim as usize]
                .ok_or_else(|| ImsError::MissingField(format!("axis {}", dim)))
        };

        Ok(Size5D {
            x: axis(Dimension::X)?,
            y: axis(Dimension::Y)?,
            z: axis(Dimension::Z)?,
            c: axis(Dimension::C)?,
            t: axis(Dimension::T)?,
        })
    }
}

/// Position of a block in the block grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Index5D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub c: u32,
    pub t: u32,
}

impl Index5D {
    pub fn get(&self, dim: Dimension) -> u32 {
        match dim {
            Dimension::X => self.x,
            Dimension::Y => self.y,
            Dimension::Z => self.z,
            Dimension::C => self.c,
            Dimension::T => self.t,
        }
    }

    pub fn get_mut(&mut self, dim: Dimension) -> &mut u32 {
        match dim {
            Dimension::X => &mut self.x,
            Dimension::Y => &mut self.y,
            Dimension::Z => &mut self.z,
            Dimension::C => &mut self.c,
            Dimension::T => &mut self.t,
        }
    }
}

impl fmt::Display for Index5D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.x, self.y, self.z, self.c, self.t
        )
    }
}

/// Memory order of the axes inside each block buffer, fastest-varying first.
///
/// Always a permutation of x, y, z, c, t.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DimensionSequence {
    order: [Dimension; 5],
}

impl DimensionSequence {
    /// Build from five axes; fails on duplicates
    pub fn new(order: [Dimension; 5]) -> Result<Self> {
        for (i, dim) in order.iter().enumerate() {
            if order[..i].contains(dim) {
                return Err(ImsError::InvalidDimensionSequence(format!(
                    "Axis {} appears more than once",
                    dim
                )));
            }
        }
        Ok(Self { order })
    }

    /// Build from five single-character tokens such as `["X", "y", "Z", "c", "T"]`
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        if tokens.len() != 5 {
            return Err(ImsError::InvalidDimensionSequence(format!(
                "Expected 5 axes, got {}",
                tokens.len()
            )));
        }

        let mut order = [Dimension::X; 5];
        for (slot, token) in order.iter_mut().zip(tokens) {
            let token = token.as_ref();
            let mut chars = token.chars();
            *slot = match (chars.next(), chars.next()) {
                (Some(label), None) => Dimension::from_char(label),
                _ => None,
            }
            .ok_or_else(|| {
                ImsError::InvalidDimensionSequence(format!("Unknown axis '{}'", token))
            })?;
        }

        Self::new(order)
    }

    /// The axes, fastest-varying first
    pub fn order(&self) -> &[Dimension; 5] {
        &self.order
    }

    /// Lowercase labels, e.g. `['x', 'y', 'z', 'c', 't']`
    pub fn labels(&self) -> [char; 5] {
        self.order.map(|d| d.label())
    }
}

impl Default for DimensionSequence {
    fn default() -> Self {
        Self {
            order: Dimension::ALL,
        }
    }
}

impl fmt::Display for DimensionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in self.labels() {
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

/// Parses `xyzct` or `x,y,z,c,t`
impl FromStr for DimensionSequence {
    type Err = ImsError;

    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<String> = if s.contains(',') {
            s.split(',').map(|t| t.trim().to_string()).collect()
        } else {
            s.trim().chars().map(String::from).collect()
        };
        Self::from_tokens(&tokens)
    }
}

impl TryFrom<String> for DimensionSequence {
    type Error = ImsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DimensionSequence> for String {
    fn from(value: DimensionSequence) -> Self {
        value.to_string()
    }
}

/// Sample data types the engine can store.
///
/// Discriminants match the engine's datatype enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 0,
    /// Unsigned 16-bit integer
    U16 = 1,
    /// Unsigned 32-bit integer
    U32 = 2,
    /// 32-bit floating point
    F32 = 3,
}

impl DataType {
    /// Size in bytes of one sample
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 | DataType::F32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32)
    }

    /// Conventional lowercase name, as accepted by `FromStr`
    pub fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::F32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = ImsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8" | "u8" => Ok(DataType::U8),
            "uint16" | "u16" => Ok(DataType::U16),
            "uint32" | "u32" => Ok(DataType::U32),
            "float32" | "float" | "f32" => Ok(DataType::F32),
            other => Err(ImsError::UnsupportedDataType(other.to_string())),
        }
    }
}

/// Physical bounds of the dataset, independent of the voxel count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageExtents {
    pub min_x: f32,
    pub min_y: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub max_z: f32,
}

impl ImageExtents {
    pub fn new(min_x: f32, min_y: f32, min_z: f32, max_x: f32, max_y: f32, max_z: f32) -> Self {
        Self {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }

    /// Extents starting at the origin for an image with the given voxel spacing
    pub fn from_voxel_size(size: &Size5D, voxel_size_xy: f32, voxel_size_z: f32) -> Self {
        Self::new(
            0.0,
            0.0,
            0.0,
            size.x as f32 * voxel_size_xy,
            size.y as f32 * voxel_size_xy,
            size.z as f32 * voxel_size_z,
        )
    }

    pub fn is_valid(&self) -> bool {
        let pairs = [
            (self.min_x, self.max_x),
            (self.min_y, self.max_y),
            (self.min_z, self.max_z),
        ];
        pairs
            .iter()
            .all(|(min, max)| min.is_finite() && max.is_finite() && min <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(x: u32, y: u32, z: u32, c: u32, t: u32) -> Size5D {
        Size5D { x, y, z, c, t }
    }

    #[test]
    fn test_size_division() {
        let image = size(2048, 2048, 100, 3, 1);
        let block = size(512, 512, 1, 1, 1);
        assert_eq!(image.div_ceil(&block).unwrap(), size(4, 4, 100, 3, 1));

        let uneven = size(600, 400, 5, 1, 1).div_ceil(&size(256, 256, 2, 1, 1)).unwrap();
        assert_eq!(uneven, size(3, 2, 3, 1, 1));
    }

    #[test]
    fn test_voxel_count_overflow() {
        let huge = size(u32::MAX, u32::MAX, u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(huge.checked_voxel_count(), None);
        assert_eq!(huge.voxel_count(), usize::MAX);
        assert_eq!(size(2, 3, 4, 5, 6).checked_voxel_count(), Some(720));
    }

    #[test]
    fn test_size_division_by_zero() {
        let err = size(10, 10, 10, 1, 1)
            .div_ceil(&size(1, 0, 1, 1, 1))
            .unwrap_err();
        assert!(matches!(err, ImsError::InvalidDimensions(_)));
    }

    #[test]
    fn test_size_from_str_any_order() {
        let parsed: Size5D = "y=1024, X=2048, z=100, c=3, t=1".parse().unwrap();
        assert_eq!(parsed.x, 2048);
        assert_eq!(parsed.y, 1024);
        assert_eq!(parsed.voxel_count(), 2048 * 1024 * 100 * 3);
    }

    #[test]
    fn test_size_from_str_rejects_bad_input() {
        assert!("x=2048,y=2048".parse::<Size5D>().is_err());
        assert!("x=abc,y=2048,z=100,c=3,t=1".parse::<Size5D>().is_err());
        assert!("x=2048,y=2048,z=100,c=3,f=1".parse::<Size5D>().is_err());
        assert!("x=1,y=1,z=1,c=1,t=1,x=2".parse::<Size5D>().is_err());
        assert!("x=-1,y=1,z=1,c=1,t=1".parse::<Size5D>().is_err());
        assert!("x=1.5,y=1,z=1,c=1,t=1".parse::<Size5D>().is_err());
    }

    #[test]
    fn test_size_serde_requires_all_axes() {
        let ok: Size5D = serde_json::from_str(r#"{"x":1,"y":2,"z":3,"c":4,"t":5}"#).unwrap();
        assert_eq!(ok, size(1, 2, 3, 4, 5));

        assert!(serde_json::from_str::<Size5D>(r#"{"x":1,"y":2,"z":3,"c":4}"#).is_err());
        assert!(serde_json::from_str::<Size5D>(r#"{"x":1,"y":2,"z":3,"c":4,"f":5}"#).is_err());
        assert!(serde_json::from_str::<Size5D>(r#"{"x":"a","y":2,"z":3,"c":4,"t":5}"#).is_err());
    }

    #[test]
    fn test_dimension_sequence_normalizes_case() {
        let seq = DimensionSequence::from_tokens(&["X", "y", "Z", "c", "T"]).unwrap();
        assert_eq!(seq.labels(), ['x', 'y', 'z', 'c', 't']);

        let seq = DimensionSequence::from_tokens(&["T", "C", "Z", "Y", "X"]).unwrap();
        assert_eq!(seq.labels(), ['t', 'c', 'z', 'y', 'x']);
        assert_eq!(seq.to_string(), "tczyx");
    }

    #[test]
    fn test_dimension_sequence_rejects_malformed() {
        assert!(DimensionSequence::from_tokens(&["x"]).is_err());
        assert!(DimensionSequence::from_tokens(&["x", "y", "z", "c", "x"]).is_err());
        assert!(DimensionSequence::from_tokens(&["x", "y", "z", "c", "s"]).is_err());
        assert!(DimensionSequence::from_tokens(&["x", "y", "z", "c", "t", "t"]).is_err());
        assert!(DimensionSequence::from_tokens(&["xy", "z", "c", "t", "y"]).is_err());
        assert!("xyzc".parse::<DimensionSequence>().is_err());
    }

    #[test]
    fn test_dimension_sequence_parse_and_serde() {
        let seq: DimensionSequence = "z, y, x, c, t".parse().unwrap();
        assert_eq!(seq.order()[0], Dimension::Z);

        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, "\"zyxct\"");
        let back: DimensionSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seq);
        assert!(serde_json::from_str::<DimensionSequence>("\"zzxct\"").is_err());
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!("uint8".parse::<DataType>().unwrap(), DataType::U8);
        assert_eq!("Float32".parse::<DataType>().unwrap(), DataType::F32);
        assert!(matches!(
            "sometype".parse::<DataType>(),
            Err(ImsError::UnsupportedDataType(_))
        ));
        assert_eq!(DataType::U16.size_in_bytes(), 2);
    }

    #[test]
    fn test_image_extents() {
        let extents = ImageExtents::from_voxel_size(&size(512, 512, 32, 2, 4), 1.5, 5.0);
        assert_eq!(extents.max_x, 768.0);
        assert_eq!(extents.max_z, 160.0);
        assert!(extents.is_valid());
        assert!(!ImageExtents::new(1.0, 0.0, 0.0, 0.0, 1.0, 1.0).is_valid());
    }
}
