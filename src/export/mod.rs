//! Ordered multipage TIFF export of lazily computed volumes.
//!
//! ```text
//! ┌──────────────┐  classify   ┌──────────────┐  admission_window
//! │ VolumeSource │ ──────────► │   AxisSet    │ ◄──────────────── MemoryProbe
//! └──────┬───────┘             └──────┬───────┘
//!        │ fetch(Region)              │ SliceLayout
//!        ▼                            ▼
//! ┌──────────────────┐  in order  ┌──────────┐
//! │ PrefetchPipeline │ ─────────► │ PageSink │ ──► multipage TIFF
//! └────────┬─────────┘            └──────────┘
//!          │ 0 .. 100
//!          ▼
//!   ProgressSignal
//! ```
//!
//! [`StackExporter`] ties the pieces together: it classifies the volume
//! once, sizes the window from the memory reading, and runs the pipeline.

mod admission;
mod axes;
mod exporter;
mod memory;
mod pipeline;
mod progress;
mod sink;

pub use admission::{admission_window, AdmissionPolicy, DEFAULT_RESERVE_FRACTION, DEFAULT_WINDOW};
pub use axes::{classify, nonsingleton_axes, AxisSet, SliceLayout, DEFAULT_CHANNEL_AXIS};
pub use exporter::{ExportOptions, StackExporter};
pub use memory::{FixedMemory, MemoryProbe, SystemMemory};
pub use pipeline::{ExportSummary, InFlightRequest, PrefetchPipeline, Window};
pub use progress::{percent_done, ProgressSignal, SubscriptionId};
pub use sink::{slice_to_page, PageSink, TiffPageSink};
