//! Step axis selection and slice shape validation.
//!
//! The first non-singleton axis is walked one index at a time; the
//! remaining non-singleton axes form each page. A page can only hold a plain
//! 2D image, or a 2D image with a channel axis, so exactly three
//! non-singleton axes are accepted, or four when one of the trailing three
//! is the channel axis.

use crate::error::ExportError;
use crate::volume::TaggedShape;

/// Conventional label of the channel axis.
pub const DEFAULT_CHANNEL_AXIS: &str = "c";

/// Labels of the axes with extent > 1, in storage order.
pub fn nonsingleton_axes(shape: &TaggedShape) -> Vec<String> {
    shape
        .iter()
        .filter(|(_, extent)| *extent > 1)
        .map(|(label, _)| label.to_string())
        .collect()
}

/// Per-page axes fixed at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceLayout {
    /// Slice axes in original relative order
    pub axes: Vec<String>,

    /// Extent of each slice axis
    pub extents: Vec<usize>,

    /// Position of the channel axis within `axes`, if it is one
    pub channel: Option<usize>,
}

impl SliceLayout {
    /// Positions within `axes` of the row and column axes.
    pub fn spatial_axes(&self) -> (usize, usize) {
        let mut spatial = (0..self.axes.len()).filter(|&i| Some(i) != self.channel);
        let rows = spatial.next().unwrap_or(0);
        let cols = spatial.next().unwrap_or(rows);
        (rows, cols)
    }

    /// `(height, width, samples_per_pixel)` of the resulting page.
    pub fn page_dims(&self) -> (usize, usize, usize) {
        let (rows, cols) = self.spatial_axes();
        let samples = self.channel.map(|c| self.extents[c]).unwrap_or(1);
        (self.extents[rows], self.extents[cols], samples)
    }
}

/// Result of classifying a volume for page-stack export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSet {
    step_axis: String,
    step_position: usize,
    step_extent: usize,
    layout: SliceLayout,
}

impl AxisSet {
    /// Label of the axis walked to produce pages.
    pub fn step_axis(&self) -> &str {
        &self.step_axis
    }

    /// Storage position of the step axis in the full shape.
    pub fn step_position(&self) -> usize {
        self.step_position
    }

    /// Number of pages.
    pub fn step_extent(&self) -> usize {
        self.step_extent
    }

    pub fn slice_axes(&self) -> &[String] {
        &self.layout.axes
    }

    /// Label of the channel axis, if the pages carry channels.
    pub fn channel_axis(&self) -> Option<&str> {
        self.layout.channel.map(|c| self.layout.axes[c].as_str())
    }

    pub fn layout(&self) -> &SliceLayout {
        &self.layout
    }
}

/// Pick the step axis and validate the per-slice shape.
///
/// `channel_label` names the axis allowed to ride along as page channels.
pub fn classify(shape: &TaggedShape, channel_label: &str) -> Result<AxisSet, ExportError> {
    let axes = nonsingleton_axes(shape);
    let invalid = |reason: String| ExportError::InvalidShape {
        shape: shape.to_string(),
        reason,
    };

    let channel_pos = axes.iter().position(|a| a == channel_label);
    if channel_pos == Some(0) {
        return Err(invalid(format!(
            "channel axis '{}' cannot be the step axis",
            channel_label
        )));
    }

    let channel = match (axes.len(), channel_pos) {
        (3, _) => None,
        (4, Some(pos)) => Some(pos - 1),
        (4, None) => {
            return Err(invalid(format!(
                "4 non-singleton axes {:?} need a channel axis '{}'",
                axes, channel_label
            )))
        }
        (n, _) => {
            return Err(invalid(format!(
                "stacks need 3 non-singleton axes besides the channel axis, got {} {:?}",
                n, axes
            )))
        }
    };

    let step_axis = axes[0].clone();
    let extent_of = |label: &str| shape.get(label).unwrap_or(1);
    let slice_axes: Vec<String> = axes[1..].to_vec();
    let extents = slice_axes.iter().map(|a| extent_of(a)).collect();

    Ok(AxisSet {
        step_position: shape.position(&step_axis).unwrap_or(0),
        step_extent: extent_of(&step_axis),
        step_axis,
        layout: SliceLayout {
            axes: slice_axes,
            extents,
            channel,
        },
    })
}
