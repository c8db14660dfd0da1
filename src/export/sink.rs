//! Turning fetched slices into TIFF pages.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::axes::SliceLayout;
use crate::error::{ExportError, TiffError};
use crate::format::tiff::{Page, TiffPageWriter};
use crate::volume::SliceBuffer;

/// Append-only page destination driven by the pipeline.
pub trait PageSink: Send {
    /// Write one page after all previously written pages.
    fn write_page(&mut self, page: &Page) -> Result<(), TiffError>;
}

/// Collects pages in memory.
impl PageSink for Vec<Page> {
    fn write_page(&mut self, page: &Page) -> Result<(), TiffError> {
        self.push(page.clone());
        Ok(())
    }
}

/// File-backed sink writing a multipage TIFF.
#[derive(Debug)]
pub struct TiffPageSink {
    writer: TiffPageWriter,
}

impl TiffPageSink {
    /// Prepare `path` for a fresh export, deleting any file already there.
    ///
    /// The file itself is created by the first appended page.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed previous export"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ExportError::Io(format!(
                    "cannot remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        Ok(Self {
            writer: TiffPageWriter::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    pub fn pages_written(&self) -> usize {
        self.writer.pages_written()
    }
}

impl PageSink for TiffPageSink {
    fn write_page(&mut self, page: &Page) -> Result<(), TiffError> {
        self.writer.append(page)
    }
}

/// Squeeze a fetched slice and lay it out as a page.
///
/// Singleton axes are dropped; what remains must match `layout` exactly.
/// Samples are reordered to rows, columns, then interleaved channels.
pub fn slice_to_page(
    index: usize,
    slice: SliceBuffer,
    layout: &SliceLayout,
) -> Result<Page, ExportError> {
    let actual: Vec<usize> = slice.shape().iter().copied().filter(|&e| e != 1).collect();
    if actual != layout.extents {
        return Err(ExportError::ShapeMismatch {
            index,
            expected: layout.extents.clone(),
            actual,
        });
    }

    let (rows, cols) = layout.spatial_axes();
    let (height, width, samples) = layout.page_dims();
    let sample_type = slice.sample_type();

    let mut order = vec![rows, cols];
    order.extend(layout.channel);
    let in_order = order.iter().enumerate().all(|(i, &axis)| i == axis);

    let data = if in_order {
        slice.into_data()
    } else {
        let elem = sample_type.byte_size();
        let strides = c_order_strides(&layout.extents);
        let src = slice.data();
        let mut out = Vec::with_capacity(src.len());
        for r in 0..height {
            for c in 0..width {
                let pixel = r * strides[rows] + c * strides[cols];
                for s in 0..samples {
                    let at = pixel + layout.channel.map_or(0, |ch| s * strides[ch]);
                    out.extend_from_slice(&src[at * elem..(at + 1) * elem]);
                }
            }
        }
        out.into()
    };

    let dim = |value: usize, what: &str| {
        u32::try_from(value).map_err(|_| {
            TiffError::InvalidPage(format!("{} {} exceeds the TIFF limit", what, value))
        })
    };
    let height = dim(height, "height")?;
    let width = dim(width, "width")?;
    let samples = u16::try_from(samples).map_err(|_| {
        TiffError::InvalidPage(format!("{} samples per pixel exceeds the TIFF limit", samples))
    })?;

    Ok(Page::new(height, width, samples, sample_type, data)?)
}

fn c_order_strides(extents: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; extents.len()];
    for i in (0..extents.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * extents[i + 1];
    }
    strides
}
