//! The volume source seam: metadata plus async region fetches.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SourceError;

use super::shape::{Region, SampleType, TaggedShape};

/// Shape, element type and cost hint of a lazily computed volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMetadata {
    /// Axis labels and extents in storage order
    pub shape: TaggedShape,

    /// Scalar element type
    pub sample_type: SampleType,

    /// Estimated bytes of memory consumed per requested scalar sample while a
    /// fetch is in flight, if the source can tell
    pub ram_per_pixel: Option<f64>,
}

impl VolumeMetadata {
    pub fn new(shape: TaggedShape, sample_type: SampleType) -> Self {
        Self {
            shape,
            sample_type,
            ram_per_pixel: None,
        }
    }

    pub fn with_ram_per_pixel(mut self, bytes: f64) -> Self {
        self.ram_per_pixel = Some(bytes);
        self
    }
}

/// Data returned by a region fetch.
///
/// `shape` is the full-dimensional region shape (singleton axes included),
/// `data` holds little-endian samples in C order.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceBuffer {
    shape: Vec<usize>,
    sample_type: SampleType,
    data: Bytes,
}

impl SliceBuffer {
    /// Wrap fetched bytes, checking the length matches the shape.
    pub fn new(
        shape: Vec<usize>,
        sample_type: SampleType,
        data: impl Into<Bytes>,
    ) -> Result<Self, SourceError> {
        let data = data.into();
        let expected = shape.iter().product::<usize>() * sample_type.byte_size();
        if data.len() != expected {
            return Err(SourceError::InvalidRegion(format!(
                "buffer of {} bytes does not match shape {:?} of {}",
                data.len(),
                shape,
                sample_type
            )));
        }
        Ok(Self {
            shape,
            sample_type,
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// A volume that can only be queried by region.
///
/// Each fetch may be arbitrarily expensive; the exporter overlaps several of
/// them and relies on the source to run them concurrently.
#[async_trait]
pub trait VolumeSource: Send + Sync + 'static {
    /// Shape, element type and memory-cost hint.
    fn metadata(&self) -> &VolumeMetadata;

    /// Compute or read the data for `region`.
    async fn fetch(&self, region: Region) -> Result<SliceBuffer, SourceError>;
}
