//! Raw volume source.
//!
//! Serves region fetches from an uncompressed C-order array stored behind a
//! [`RangeReader`]. A region is split into contiguous runs: the trailing
//! axes the region covers fully are merged into one run, and the leading
//! axes are walked odometer-style, one range read per run.

use async_trait::async_trait;
use bytes::BytesMut;
use tracing::trace;

use crate::error::SourceError;
use crate::io::RangeReader;

use super::shape::Region;
use super::source::{SliceBuffer, VolumeMetadata, VolumeSource};

/// Volume backed by raw little-endian samples.
pub struct RawVolumeSource<R: RangeReader> {
    reader: R,
    metadata: VolumeMetadata,
    data_offset: u64,
}

impl<R: RangeReader> RawVolumeSource<R> {
    /// Create a source over `reader`, with samples starting at byte
    /// `data_offset`.
    ///
    /// Fails if the resource is too small to hold the whole volume.
    pub fn new(reader: R, metadata: VolumeMetadata, data_offset: u64) -> Result<Self, SourceError> {
        let needed = data_offset
            + (metadata.shape.num_elements() * metadata.sample_type.byte_size()) as u64;
        if reader.size() < needed {
            return Err(SourceError::InvalidRegion(format!(
                "{} holds {} bytes, volume {} of {} needs {}",
                reader.identifier(),
                reader.size(),
                metadata.shape,
                metadata.sample_type,
                needed
            )));
        }
        Ok(Self {
            reader,
            metadata,
            data_offset,
        })
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

#[async_trait]
impl<R: RangeReader + 'static> VolumeSource for RawVolumeSource<R> {
    fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    async fn fetch(&self, region: Region) -> Result<SliceBuffer, SourceError> {
        let extents = self.metadata.shape.extents();
        region
            .check_within(&extents)
            .map_err(SourceError::InvalidRegion)?;

        let sample_type = self.metadata.sample_type;
        let region_shape = region.shape();
        let plan = RunPlan::new(&extents, &region, sample_type.byte_size());

        let mut out = BytesMut::with_capacity(plan.total_bytes());
        for offset in plan.run_offsets() {
            let bytes = self
                .reader
                .read_exact_at(self.data_offset + offset, plan.run_bytes)
                .await?;
            out.extend_from_slice(&bytes);
        }

        trace!(
            source = self.reader.identifier(),
            region = %region,
            runs = plan.run_count(),
            "Fetched region"
        );

        SliceBuffer::new(region_shape, sample_type, out.freeze())
    }
}

// =============================================================================
// Run Planning
// =============================================================================

/// Contiguous byte runs covering a region of a C-order array.
#[derive(Debug)]
struct RunPlan {
    /// Byte strides of the volume
    strides: Vec<u64>,
    /// Region start per axis
    start: Vec<usize>,
    /// Region extent per axis
    shape: Vec<usize>,
    /// Axes before this one are iterated; this one and later form a run
    split: usize,
    run_bytes: usize,
}

impl RunPlan {
    fn new(extents: &[usize], region: &Region, sample_bytes: usize) -> Self {
        let ndim = extents.len();
        let shape = region.shape();

        let mut strides = vec![sample_bytes as u64; ndim];
        for axis in (0..ndim.saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * extents[axis + 1] as u64;
        }

        // Merge trailing axes the region spans completely; the first
        // partially covered axis still belongs to the run.
        let mut split = ndim;
        while split > 0 {
            split -= 1;
            if shape[split] != extents[split] {
                break;
            }
        }

        let run_elems: usize = shape[split.min(ndim)..].iter().product();
        Self {
            strides,
            start: region.start.clone(),
            shape,
            split,
            run_bytes: run_elems * sample_bytes,
        }
    }

    fn run_count(&self) -> usize {
        if self.shape.iter().any(|&e| e == 0) {
            return 0;
        }
        self.shape[..self.split].iter().product()
    }

    fn total_bytes(&self) -> usize {
        self.run_count() * self.run_bytes
    }

    /// Byte offsets of each run, in C order.
    fn run_offsets(&self) -> Vec<u64> {
        let count = self.run_count();
        let base: u64 = self
            .start
            .iter()
            .zip(&self.strides)
            .map(|(s, st)| *s as u64 * st)
            .sum();

        let outer = &self.shape[..self.split];
        let mut index = vec![0usize; outer.len()];
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let delta: u64 = index
                .iter()
                .zip(&self.strides)
                .map(|(i, st)| *i as u64 * st)
                .sum();
            offsets.push(base + delta);

            for axis in (0..outer.len()).rev() {
                index[axis] += 1;
                if index[axis] < outer[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        offsets
    }
}
