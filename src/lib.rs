//! # TIFF Stack Export
//!
//! Exports N-dimensional volumes as ordered multipage TIFF files, one page
//! per index along the first non-singleton axis.
//!
//! Volumes are only reachable through region fetches that may be expensive
//! (computed on demand, or read from object storage). The exporter keeps a
//! bounded number of fetches in flight, sized from the available memory, and
//! writes pages strictly in index order as fetches complete.
//!
//! ## Architecture
//!
//! - [`export`] - Axis classification, admission sizing, prefetch pipeline, page sink
//! - [`volume`] - Tagged shapes, regions and the [`VolumeSource`] trait
//! - [`mod@format`] - TIFF page writer and page index
//! - [`io`] - Range readers for local files and S3
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiff_stack_export::{
//!     ExportOptions, FileRangeReader, RawVolumeSource, SampleType, StackExporter,
//!     SystemMemory, TaggedShape, VolumeMetadata,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shape: TaggedShape = "z=10,c=1,y=20,x=30".parse()?;
//!     let reader = FileRangeReader::open("volume.raw").await?;
//!     let source = RawVolumeSource::new(reader, VolumeMetadata::new(shape, SampleType::U16), 0)?;
//!
//!     let exporter = StackExporter::new(Arc::new(source), ExportOptions::default())?;
//!     exporter.progress().subscribe(|percent| println!("{}%", percent));
//!     exporter.export_to("stack.tif", &SystemMemory::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod io;
pub mod volume;

// Re-export commonly used types
pub use config::{Cli, Command, ExportConfig, InspectConfig, InspectFormat};
pub use error::{ExportError, IoError, SourceError, TiffError};
pub use export::{
    admission_window, classify, AdmissionPolicy, AxisSet, ExportOptions, ExportSummary,
    FixedMemory, MemoryProbe, PageSink, ProgressSignal, SliceLayout, StackExporter,
    SubscriptionId, SystemMemory, TiffPageSink,
};
pub use format::tiff::{Page, PageIndex, PageInfo, TiffPageWriter};
pub use io::{create_s3_client, FileRangeReader, RangeReader, S3RangeReader};
pub use volume::{
    RawVolumeSource, Region, SampleType, SliceBuffer, TaggedShape, VolumeMetadata, VolumeSource,
};
