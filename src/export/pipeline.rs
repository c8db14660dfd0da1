//! Ordered prefetch pipeline.
//!
//! Slice fetches are issued ahead of the writer, up to the admission window,
//! and consumed strictly in index order:
//!
//! ```text
//!            issue i+w                         pop head (index i)
//!   source ──────────────► [ i | i+1 | ... | i+w-1 ] ──────────────► sink
//!            (spawned)          Window (FIFO)          await, write
//! ```
//!
//! Only the head is ever awaited, so a slow fetch at the head delays the
//! writer even if later fetches are done. Memory stays bounded by the window.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::axes::AxisSet;
use super::progress::{percent_done, ProgressSignal};
use super::sink::{slice_to_page, PageSink};
use crate::error::{ExportError, SourceError};
use crate::volume::{Region, SliceBuffer, VolumeSource};

/// Outcome of a completed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Pages written
    pub pages: usize,

    /// Admission bound computed for the export. Fetches in flight never
    /// exceed it nor the page count.
    pub window_size: usize,

    /// Largest number of fetches that were in flight at once
    pub peak_in_flight: usize,
}

/// A fetch that has been issued but not yet consumed.
#[derive(Debug)]
pub struct InFlightRequest {
    index: usize,
    handle: JoinHandle<Result<SliceBuffer, SourceError>>,
}

impl InFlightRequest {
    /// Start fetching `region` on the runtime. Returns immediately.
    pub fn issue<S>(source: &Arc<S>, index: usize, region: Region) -> Self
    where
        S: VolumeSource + ?Sized,
    {
        let source = Arc::clone(source);
        let handle = tokio::spawn(async move { source.fetch(region).await });
        Self { index, handle }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Cancel the fetch without waiting for it.
    pub fn abort(self) {
        self.handle.abort();
    }

    /// Wait for the fetch to finish.
    pub async fn complete(self) -> Result<SliceBuffer, ExportError> {
        let index = self.index;
        match self.handle.await {
            Ok(Ok(slice)) => Ok(slice),
            Ok(Err(source)) => Err(ExportError::SourceFetch { index, source }),
            Err(join) => Err(ExportError::FetchTask {
                index,
                message: join.to_string(),
            }),
        }
    }
}

/// FIFO of in-flight requests, capped at the admission bound.
///
/// Dropping the window detaches its requests; they run to completion and
/// their results are discarded.
#[derive(Debug)]
pub struct Window {
    requests: VecDeque<InFlightRequest>,
    capacity: usize,
    peak: usize,
}

impl Window {
    /// Storage grows with occupancy, so `capacity` may be any bound.
    pub fn new(capacity: usize) -> Self {
        Self {
            requests: VecDeque::new(),
            capacity: capacity.max(1),
            peak: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.requests.len() >= self.capacity
    }

    /// Highest occupancy seen so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Append at the tail.
    ///
    /// The request is handed back if the window is full or its index does
    /// not follow the current tail.
    pub fn push(&mut self, request: InFlightRequest) -> Result<(), InFlightRequest> {
        let in_order = self
            .requests
            .back()
            .map_or(true, |last| last.index < request.index);
        if self.is_full() || !in_order {
            return Err(request);
        }
        self.requests.push_back(request);
        self.peak = self.peak.max(self.requests.len());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<InFlightRequest> {
        self.requests.pop_front()
    }
}

/// Drives one export of a classified volume into a [`PageSink`].
pub struct PrefetchPipeline<'a, S: ?Sized> {
    source: Arc<S>,
    axes: &'a AxisSet,
    window_size: usize,
    progress: &'a ProgressSignal,
}

impl<'a, S> PrefetchPipeline<'a, S>
where
    S: VolumeSource + ?Sized,
{
    pub fn new(
        source: Arc<S>,
        axes: &'a AxisSet,
        window_size: usize,
        progress: &'a ProgressSignal,
    ) -> Self {
        Self {
            source,
            axes,
            window_size: window_size.max(1),
            progress,
        }
    }

    /// Region of slice `index`: one step along the step axis, everything else
    /// in full.
    pub fn slice_region(&self, index: usize) -> Region {
        let extents = self.source.metadata().shape.extents();
        let step = self.axes.step_position();

        let mut template = Region::full(&extents);
        template.stop[step] = 1;
        let mut unit = vec![0; extents.len()];
        unit[step] = 1;

        template.offset_by(&unit, index)
    }

    /// Export every slice in order.
    ///
    /// On failure, pages already appended stay in the sink and requests still
    /// in flight are left to finish unobserved.
    pub async fn run<K>(&self, sink: &mut K) -> Result<ExportSummary, ExportError>
    where
        K: PageSink + ?Sized,
    {
        let total = self.axes.step_extent();
        let layout = self.axes.layout();
        let mut window = Window::new(self.window_size.min(total));

        debug!(
            step_axis = self.axes.step_axis(),
            slice_axes = ?self.axes.slice_axes(),
            slices = total,
            window = self.window_size,
            "Exporting stack"
        );
        self.progress.emit(0);

        let mut next = 0;
        self.fill(&mut window, &mut next, total);

        while let Some(head) = window.pop() {
            let index = head.index();
            self.progress.emit(percent_done(index, total));

            let slice = head.complete().await?;
            self.fill(&mut window, &mut next, total);

            let page = slice_to_page(index, slice, layout)?;
            sink.write_page(&page)?;
            trace!(index, in_flight = window.len(), "Slice written");
        }

        self.progress.emit(100);

        Ok(ExportSummary {
            pages: total,
            window_size: self.window_size,
            peak_in_flight: window.peak(),
        })
    }

    /// Issue fetches from `next` until the window is full or the stack is
    /// exhausted.
    fn fill(&self, window: &mut Window, next: &mut usize, total: usize) {
        while *next < total && !window.is_full() {
            let request = InFlightRequest::issue(&self.source, *next, self.slice_region(*next));
            if let Err(rejected) = window.push(request) {
                rejected.abort();
                break;
            }
            *next += 1;
        }
    }
}
