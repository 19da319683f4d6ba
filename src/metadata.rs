//! Metadata handed to the engine when a conversion finishes

use crate::error::{ImsError, Result};
use crate::time::{to_julian_day_and_time, NANOSECONDS_PER_DAY};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Textual form of a parameter value.
///
/// The engine stores every parameter as text. Numbers are converted here,
/// once, using their `Display` representation (`2400` becomes `"2400"`,
/// `1.5f32` becomes `"1.5"`, `true` becomes `"true"`), so every caller
/// produces the same text for the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterValue(String);

impl ParameterValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&String> for ParameterValue {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

macro_rules! parameter_value_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParameterValue {
                fn from(value: $t) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

parameter_value_from_display!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, bool, char);

/// Free-form parameters, grouped into named sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    sections: BTreeMap<String, BTreeMap<String, ParameterValue>>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, creating the section if needed; replaces an existing value
    pub fn set_value(
        &mut self,
        section: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<ParameterValue>,
    ) {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Set the display name of a channel (section `Channel <index>`, key `Name`)
    pub fn set_channel_name(&mut self, channel: u32, name: impl Into<String>) {
        let name: String = name.into();
        self.set_value(Self::channel_section(channel), "Name", name);
    }

    /// Section name used for a channel's parameters
    pub fn channel_section(channel: u32) -> String {
        format!("Channel {}", channel)
    }

    /// Get a value
    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(name))
            .map(|v| v.as_str())
    }

    /// All key/value pairs of a section
    pub fn section(&self, section: &str) -> Option<&BTreeMap<String, ParameterValue>> {
        self.sections.get(section)
    }

    /// Iterate over sections in name order
    pub fn sections(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, ParameterValue>)> {
        self.sections.iter().map(|(name, values)| (name.as_str(), values))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total number of values across all sections
    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }
}

/// Acquisition time of one time point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    pub julian_day: u32,
    pub nanoseconds_of_day: u64,
}

impl TimeInfo {
    pub fn new(julian_day: u32, nanoseconds_of_day: u64) -> Result<Self> {
        let info = Self {
            julian_day,
            nanoseconds_of_day,
        };
        info.validate()?;
        Ok(info)
    }

    /// Nanoseconds of day must lie in [0, one day)
    pub fn validate(&self) -> Result<()> {
        if self.nanoseconds_of_day >= NANOSECONDS_PER_DAY {
            return Err(ImsError::Metadata(format!(
                "Nanoseconds of day must be below {}, got {}",
                NANOSECONDS_PER_DAY, self.nanoseconds_of_day
            )));
        }
        Ok(())
    }

    /// Convert a calendar timestamp (proleptic Gregorian, no time zone)
    pub fn from_datetime(timestamp: NaiveDateTime) -> Result<Self> {
        let (julian_day, nanoseconds_of_day) = to_julian_day_and_time(timestamp);
        let julian_day = u32::try_from(julian_day).map_err(|_| {
            ImsError::Metadata(format!(
                "Timestamp {} is outside the representable Julian day range",
                timestamp
            ))
        })?;
        Self::new(julian_day, nanoseconds_of_day)
    }

    /// Convert a UTC timestamp
    pub fn from_utc(timestamp: &DateTime<Utc>) -> Result<Self> {
        Self::from_datetime(timestamp.naive_utc())
    }
}

/// RGBA color, every component in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        red: 1.0,
        green: 1.0,
        blue: 1.0,
        alpha: 1.0,
    };

    pub fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Result<Self> {
        let color = Self {
            red,
            green,
            blue,
            alpha,
        };
        color.validate()?;
        Ok(color)
    }

    pub fn validate(&self) -> Result<()> {
        let components = [
            ("red", self.red),
            ("green", self.green),
            ("blue", self.blue),
            ("alpha", self.alpha),
        ];
        for (name, value) in components {
            if !(0.0..=1.0).contains(&value) {
                return Err(ImsError::InvalidColor(format!(
                    "{} component must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// How a channel is colored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// A single color scaled by intensity
    BaseColor(Color),
    /// Lookup table, never empty
    ColorTable(Vec<Color>),
}

/// Display settings of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorInfo {
    mode: ColorMode,
    pub opacity: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub gamma_correction: f32,
}

impl Default for ColorInfo {
    fn default() -> Self {
        Self {
            mode: ColorMode::BaseColor(Color::WHITE),
            opacity: 0.0,
            range_min: 0.0,
            range_max: 255.0,
            gamma_correction: 1.0,
        }
    }
}

impl ColorInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a single base color
    pub fn set_base_color(&mut self, color: Color) -> Result<()> {
        color.validate()?;
        self.mode = ColorMode::BaseColor(color);
        Ok(())
    }

    /// Use a lookup table; entries keep their order
    pub fn set_color_table(&mut self, table: Vec<Color>) -> Result<()> {
        if table.is_empty() {
            return Err(ImsError::InvalidColor(
                "Color table needs at least one entry".to_string(),
            ));
        }
        table.iter().try_for_each(Color::validate)?;
        self.mode = ColorMode::ColorTable(table);
        Ok(())
    }

    /// Set the display range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.range_min = min;
        self.range_max = max;
        self
    }

    pub fn mode(&self) -> &ColorMode {
        &self.mode
    }

    pub fn is_base_color_mode(&self) -> bool {
        matches!(self.mode, ColorMode::BaseColor(_))
    }

    pub fn base_color(&self) -> Option<&Color> {
        match &self.mode {
            ColorMode::BaseColor(color) => Some(color),
            ColorMode::ColorTable(_) => None,
        }
    }

    pub fn color_table(&self) -> Option<&[Color]> {
        match &self.mode {
            ColorMode::ColorTable(table) => Some(table),
            ColorMode::BaseColor(_) => None,
        }
    }

    /// Check ranges before handing this to the engine
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            ColorMode::BaseColor(color) => color.validate()?,
            ColorMode::ColorTable(table) => {
                if table.is_empty() {
                    return Err(ImsError::InvalidColor("Color table is empty".to_string()));
                }
                for color in table {
                    color.validate()?;
                }
            }
        }
        if !(self.range_min.is_finite() && self.range_max.is_finite()) {
            return Err(ImsError::Metadata("Color range must be finite".to_string()));
        }
        if self.range_min > self.range_max {
            return Err(ImsError::Metadata(format!(
                "Color range min {} exceeds max {}",
                self.range_min, self.range_max
            )));
        }
        if !self.gamma_correction.is_finite() || self.gamma_correction <= 0.0 {
            return Err(ImsError::Metadata(format!(
                "Gamma correction must be positive, got {}",
                self.gamma_correction
            )));
        }
        Ok(())
    }
}
