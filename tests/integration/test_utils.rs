//! Test utilities for integration tests.
//!
//! Provides an in-memory range reader, a synthetic volume whose fetch timing
//! and failures can be scripted, and helpers for checking written pages.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tiff_stack_export::error::{IoError, SourceError};
use tiff_stack_export::io::RangeReader;
use tiff_stack_export::{
    ProgressSignal, Region, SampleType, SliceBuffer, TaggedShape, VolumeMetadata, VolumeSource,
};

// =============================================================================
// In-Memory Range Reader
// =============================================================================

/// A range reader over a byte buffer that counts read requests.
pub struct MemoryReader {
    data: Bytes,
    identifier: String,
    request_count: AtomicUsize,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeReader for MemoryReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Synthetic Volume
// =============================================================================

type DelayFn = Box<dyn Fn(usize) -> u64 + Send + Sync>;

/// A u16 volume where every sample holds its own flat C-order index.
///
/// Fetch latency and failure are scripted per slice index (the region start
/// along the first non-singleton axis).
pub struct SyntheticVolume {
    metadata: VolumeMetadata,
    step_position: usize,
    delay_ms: DelayFn,
    fail_at: Option<usize>,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SyntheticVolume {
    pub fn new(axes: &[(&str, usize)]) -> Self {
        let shape = TaggedShape::new(axes.iter().copied()).expect("valid test shape");
        let step_position = shape.extents().iter().position(|&e| e > 1).unwrap_or(0);
        Self {
            metadata: VolumeMetadata::new(shape, SampleType::U16),
            step_position,
            delay_ms: Box::new(|_| 0),
            fail_at: None,
            fetches: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Later slices finish first.
    pub fn reverse_completion(self, ms_per_slice: u64) -> Self {
        let slices = self.metadata.shape.extents()[self.step_position];
        self.with_delay(move |i| (slices - i) as u64 * ms_per_slice)
    }

    pub fn with_delay(mut self, delay_ms: impl Fn(usize) -> u64 + Send + Sync + 'static) -> Self {
        self.delay_ms = Box::new(delay_ms);
        self
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn with_ram_per_pixel(mut self, bytes: f64) -> Self {
        self.metadata.ram_per_pixel = Some(bytes);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Expected samples of slice `index`, already in page order when the
    /// slice axes are rows then columns.
    pub fn slice_values(&self, index: usize) -> Vec<u16> {
        let extents = self.metadata.shape.extents();
        let per_slice: usize = extents[self.step_position + 1..].iter().product();
        let start = index * per_slice;
        (start..start + per_slice).map(|v| v as u16).collect()
    }
}

#[async_trait]
impl VolumeSource for SyntheticVolume {
    fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    async fn fetch(&self, region: Region) -> Result<SliceBuffer, SourceError> {
        let extents = self.metadata.shape.extents();
        region
            .check_within(&extents)
            .map_err(SourceError::InvalidRegion)?;

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let index = region.start[self.step_position];
        let delay = (self.delay_ms)(index);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_at == Some(index) {
            return Err(SourceError::Failed(format!("scripted failure at {}", index)));
        }

        let shape = region.shape();
        let total: usize = shape.iter().product();
        let mut data = Vec::with_capacity(total * 2);
        let mut coord = region.start.clone();
        for _ in 0..total {
            let flat = coord
                .iter()
                .zip(&extents)
                .fold(0usize, |acc, (c, e)| acc * e + c);
            data.extend_from_slice(&(flat as u16).to_le_bytes());

            for axis in (0..coord.len()).rev() {
                coord[axis] += 1;
                if coord[axis] < region.stop[axis] {
                    break;
                }
                coord[axis] = region.start[axis];
            }
        }

        SliceBuffer::new(shape, SampleType::U16, data)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Record every progress emission.
pub fn record_progress(signal: &ProgressSignal) -> Arc<Mutex<Vec<u8>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    signal.subscribe(move |p| sink.lock().unwrap().push(p));
    seen
}

/// Decode little-endian u16 samples.
pub fn u16_samples(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Raw little-endian bytes of a u16 volume holding its own flat indices.
pub fn raw_u16_volume(len: usize) -> Vec<u8> {
    (0..len).flat_map(|v| (v as u16).to_le_bytes()).collect()
}
