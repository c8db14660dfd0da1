//! Volume abstraction layer.
//!
//! The exporter only sees a volume through [`VolumeSource`]: a metadata
//! query plus an async region fetch. Everything behind that (caching,
//! computation, storage) is the source's business.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             StackExporter               │
//! └────────────────────┬────────────────────┘
//!                      │ fetch(Region)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          VolumeSource Trait             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  RawVolumeSource<R: RangeReader>        │
//! │  (local file or S3 object)              │
//! └─────────────────────────────────────────┘
//! ```

mod raw;
mod shape;
mod source;

pub use raw::RawVolumeSource;
pub use shape::{Region, SampleType, TaggedShape};
pub use source::{SliceBuffer, VolumeMetadata, VolumeSource};
