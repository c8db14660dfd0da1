//! Stack export entry point.
//!
//! [`StackExporter`] classifies a volume once, sizes the admission window
//! from available memory, and drives a [`PrefetchPipeline`] into a TIFF file
//! or any other [`PageSink`].

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::admission::{admission_window, AdmissionPolicy};
use super::axes::{classify, AxisSet, DEFAULT_CHANNEL_AXIS};
use super::memory::MemoryProbe;
use super::pipeline::{ExportSummary, PrefetchPipeline};
use super::progress::ProgressSignal;
use super::sink::{PageSink, TiffPageSink};
use crate::error::ExportError;
use crate::volume::VolumeSource;

/// Knobs of a stack export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Label of the axis allowed to become page channels
    pub channel_axis: String,

    /// Admission sizing parameters
    pub policy: AdmissionPolicy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            channel_axis: DEFAULT_CHANNEL_AXIS.to_string(),
            policy: AdmissionPolicy::default(),
        }
    }
}

/// Exports a volume as a multipage TIFF, one page per step-axis index.
///
/// The volume is classified when the exporter is built, so an unexportable
/// shape is reported before any fetch is issued or any file is touched.
pub struct StackExporter<S: VolumeSource + ?Sized> {
    source: Arc<S>,
    axes: AxisSet,
    options: ExportOptions,
    progress: ProgressSignal,
}

impl<S: VolumeSource + ?Sized> StackExporter<S> {
    pub fn new(source: Arc<S>, options: ExportOptions) -> Result<Self, ExportError> {
        options.policy.validate().map_err(ExportError::InvalidOptions)?;
        let axes = classify(&source.metadata().shape, &options.channel_axis)?;

        Ok(Self {
            source,
            axes,
            options,
            progress: ProgressSignal::new(),
        })
    }

    /// Progress observer; subscribe before starting an export.
    pub fn progress(&self) -> &ProgressSignal {
        &self.progress
    }

    pub fn axes(&self) -> &AxisSet {
        &self.axes
    }

    /// Number of pages an export produces.
    pub fn page_count(&self) -> usize {
        self.axes.step_extent()
    }

    /// Admission bound given the memory currently reported by `memory`.
    pub fn window_size(&self, memory: &dyn MemoryProbe) -> usize {
        let metadata = self.source.metadata();
        let slice_shape = metadata
            .shape
            .with_extent(self.axes.step_axis(), 1)
            .map(|s| s.extents())
            .unwrap_or_default();
        let channel_extent = metadata.shape.get(&self.options.channel_axis);

        admission_window(
            metadata.ram_per_pixel,
            &slice_shape,
            channel_extent,
            memory.available_bytes(),
            &self.options.policy,
        )
    }

    /// Export to a TIFF file at `path`, replacing any existing file.
    pub async fn export_to(
        &self,
        path: impl AsRef<Path>,
        memory: &dyn MemoryProbe,
    ) -> Result<ExportSummary, ExportError> {
        let path = path.as_ref();
        info!(
            path = %path.display(),
            shape = %self.source.metadata().shape,
            pages = self.page_count(),
            "Starting stack export"
        );

        let mut sink = TiffPageSink::create(path)?;
        let summary = self.export_with(&mut sink, memory).await?;

        info!(
            path = %path.display(),
            pages = summary.pages,
            window = summary.window_size,
            "Stack export finished"
        );
        Ok(summary)
    }

    /// Export into any append-only page sink.
    pub async fn export_with<K>(
        &self,
        sink: &mut K,
        memory: &dyn MemoryProbe,
    ) -> Result<ExportSummary, ExportError>
    where
        K: PageSink + ?Sized,
    {
        let window = self.window_size(memory);
        debug!(
            ram_per_pixel = ?self.source.metadata().ram_per_pixel,
            window,
            "Admission window computed"
        );

        PrefetchPipeline::new(Arc::clone(&self.source), &self.axes, window, &self.progress)
            .run(sink)
            .await
    }
}
