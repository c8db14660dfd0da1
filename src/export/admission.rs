//! Admission sizing: how many slice fetches may be in flight at once.
//!
//! The bound comes from the source's per-pixel memory-cost hint and the
//! memory currently available, read once per export. It is a heuristic: a
//! later spike in memory pressure from other processes goes unnoticed.

/// Window size used when the source gives no memory-cost hint.
pub const DEFAULT_WINDOW: usize = 4;

/// Share of available memory left for everything other than in-flight
/// fetches.
pub const DEFAULT_RESERVE_FRACTION: f64 = 0.5;

/// Tunable knobs of the admission heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionPolicy {
    /// Window when no cost hint is available (or the hint is unusable)
    pub default_window: usize,

    /// Fraction of available memory to keep in reserve, in `[0, 1)`
    pub reserve_fraction: f64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            default_window: DEFAULT_WINDOW,
            reserve_fraction: DEFAULT_RESERVE_FRACTION,
        }
    }
}

impl AdmissionPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_window == 0 {
            return Err("default window must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.reserve_fraction) {
            return Err("reserve fraction must be in [0, 1)".to_string());
        }
        Ok(())
    }
}

/// Compute the maximum number of in-flight slice fetches.
///
/// # Arguments
///
/// * `ram_per_pixel` - Bytes per requested scalar sample, if known
/// * `slice_shape` - Extents of one slice region (step axis = 1)
/// * `channel_extent` - Extent of the channel axis, if the volume has one;
///   the cost hint is per scalar, not per channel vector
/// * `available_bytes` - Memory currently available
/// * `policy` - Default window and reserve fraction
///
/// The result is at least 1.
pub fn admission_window(
    ram_per_pixel: Option<f64>,
    slice_shape: &[usize],
    channel_extent: Option<usize>,
    available_bytes: u64,
    policy: &AdmissionPolicy,
) -> usize {
    let default_window = policy.default_window.max(1);
    let Some(cost) = ram_per_pixel else {
        return default_window;
    };

    let mut pixels = slice_shape.iter().map(|&e| e as f64).product::<f64>();
    if let Some(channels) = channel_extent.filter(|&c| c > 0) {
        pixels /= channels as f64;
    }

    let bytes_per_slice = pixels * cost;
    if !bytes_per_slice.is_finite() || bytes_per_slice <= 0.0 {
        return default_window;
    }

    let usable = available_bytes as f64 * (1.0 - policy.reserve_fraction.clamp(0.0, 1.0));
    let window = (usable / bytes_per_slice).floor();

    // `as` saturates for huge values
    (window as usize).max(1)
}
