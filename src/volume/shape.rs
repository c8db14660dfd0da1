//! Tagged shapes, sample types and regions of interest.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::format::tiff::SampleFormat;

// =============================================================================
// TaggedShape
// =============================================================================

/// Per-axis extents keyed by axis label, in storage order.
///
/// Labels are unique and every extent is positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaggedShape {
    axes: Vec<(String, usize)>,
}

impl TaggedShape {
    /// Build a shape from `(label, extent)` pairs in storage order.
    pub fn new<L: Into<String>>(
        axes: impl IntoIterator<Item = (L, usize)>,
    ) -> Result<Self, String> {
        let mut out: Vec<(String, usize)> = Vec::new();
        for (label, extent) in axes {
            let label = label.into();
            if label.is_empty() {
                return Err("axis labels must not be empty".to_string());
            }
            if extent == 0 {
                return Err(format!("axis '{}' has zero extent", label));
            }
            if out.iter().any(|(l, _)| *l == label) {
                return Err(format!("duplicate axis label '{}'", label));
            }
            out.push((label, extent));
        }
        Ok(Self { axes: out })
    }

    /// Number of axes.
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// `(label, extent)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.axes.iter().map(|(l, e)| (l.as_str(), *e))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.axes.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn extents(&self) -> Vec<usize> {
        self.axes.iter().map(|(_, e)| *e).collect()
    }

    /// Extent of the axis called `label`.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.axes.iter().find(|(l, _)| l == label).map(|(_, e)| *e)
    }

    /// Storage position of the axis called `label`.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.axes.iter().position(|(l, _)| l == label)
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.axes.iter().map(|(_, e)| *e).product()
    }

    /// Copy of this shape with one axis set to `extent`.
    ///
    /// Returns `None` if the axis does not exist or `extent` is zero.
    pub fn with_extent(&self, label: &str, extent: usize) -> Option<Self> {
        let pos = self.position(label)?;
        if extent == 0 {
            return None;
        }
        let mut axes = self.axes.clone();
        axes[pos].1 = extent;
        Some(Self { axes })
    }
}

impl fmt::Display for TaggedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (label, extent)) in self.axes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", label, extent)?;
        }
        write!(f, "}}")
    }
}

/// Parses `"z=10,c=1,y=20,x=30"`.
impl FromStr for TaggedShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut axes = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (label, extent) = part
                .split_once('=')
                .ok_or_else(|| format!("expected label=extent, got '{}'", part))?;
            let extent: usize = extent
                .trim()
                .parse()
                .map_err(|_| format!("invalid extent in '{}'", part))?;
            axes.push((label.trim().to_string(), extent));
        }
        if axes.is_empty() {
            return Err("shape must name at least one axis".to_string());
        }
        Self::new(axes)
    }
}

// =============================================================================
// SampleType
// =============================================================================

/// Scalar element type of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Width of one sample in bytes.
    #[inline]
    pub const fn byte_size(self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// TIFF BitsPerSample value.
    #[inline]
    pub const fn bits(self) -> u16 {
        (self.byte_size() * 8) as u16
    }

    /// TIFF SampleFormat value.
    pub const fn sample_format(self) -> SampleFormat {
        match self {
            SampleType::U8 | SampleType::U16 | SampleType::U32 => SampleFormat::Unsigned,
            SampleType::I8 | SampleType::I16 | SampleType::I32 => SampleFormat::Signed,
            SampleType::F32 | SampleType::F64 => SampleFormat::Float,
        }
    }

    pub const fn is_integer(self) -> bool {
        !matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Inverse of [`bits`](Self::bits) and [`sample_format`](Self::sample_format).
    pub fn from_tiff(bits: u16, format: SampleFormat) -> Option<Self> {
        match (format, bits) {
            (SampleFormat::Unsigned, 8) => Some(SampleType::U8),
            (SampleFormat::Unsigned, 16) => Some(SampleType::U16),
            (SampleFormat::Unsigned, 32) => Some(SampleType::U32),
            (SampleFormat::Signed, 8) => Some(SampleType::I8),
            (SampleFormat::Signed, 16) => Some(SampleType::I16),
            (SampleFormat::Signed, 32) => Some(SampleType::I32),
            (SampleFormat::Float, 32) => Some(SampleType::F32),
            (SampleFormat::Float, 64) => Some(SampleType::F64),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::U32 => "u32",
            SampleType::I8 => "i8",
            SampleType::I16 => "i16",
            SampleType::I32 => "i32",
            SampleType::F32 => "f32",
            SampleType::F64 => "f64",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(SampleType::U8),
            "u16" | "uint16" => Ok(SampleType::U16),
            "u32" | "uint32" => Ok(SampleType::U32),
            "i8" | "int8" => Ok(SampleType::I8),
            "i16" | "int16" => Ok(SampleType::I16),
            "i32" | "int32" => Ok(SampleType::I32),
            "f32" | "float32" => Ok(SampleType::F32),
            "f64" | "float64" => Ok(SampleType::F64),
            other => Err(format!("unknown sample type '{}'", other)),
        }
    }
}

// =============================================================================
// Region
// =============================================================================

/// Half-open region of interest `[start, stop)` over every axis of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub start: Vec<usize>,
    pub stop: Vec<usize>,
}

impl Region {
    pub fn new(start: Vec<usize>, stop: Vec<usize>) -> Self {
        Self { start, stop }
    }

    /// The whole volume.
    pub fn full(extents: &[usize]) -> Self {
        Self {
            start: vec![0; extents.len()],
            stop: extents.to_vec(),
        }
    }

    /// Extent of the region along each axis.
    pub fn shape(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(&self.stop)
            .map(|(a, b)| b.saturating_sub(*a))
            .collect()
    }

    /// Shift the region by `times` steps of `step`.
    pub fn offset_by(&self, step: &[usize], times: usize) -> Self {
        Self {
            start: self
                .start
                .iter()
                .zip(step)
                .map(|(s, d)| s + d * times)
                .collect(),
            stop: self
                .stop
                .iter()
                .zip(step)
                .map(|(s, d)| s + d * times)
                .collect(),
        }
    }

    /// Check that the region is non-inverted and lies within `extents`.
    pub fn check_within(&self, extents: &[usize]) -> Result<(), String> {
        if self.start.len() != extents.len() || self.stop.len() != extents.len() {
            return Err(format!(
                "region has {} dimensions, volume has {}",
                self.start.len().max(self.stop.len()),
                extents.len()
            ));
        }
        for (axis, ((a, b), e)) in self.start.iter().zip(&self.stop).zip(extents).enumerate() {
            if a > b || b > e {
                return Err(format!(
                    "axis {} range {}..{} outside extent {}",
                    axis, a, b, e
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (a, b)) in self.start.iter().zip(&self.stop).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", a, b)?;
        }
        write!(f, "]")
    }
}
