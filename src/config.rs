//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `TSE_` prefix:
//!
//! - `TSE_SHAPE` - Axis labels and extents of the input volume (`z=10,y=20,x=30`)
//! - `TSE_DTYPE` - Sample type of the input volume (default: u8)
//! - `TSE_OUTPUT` - Output TIFF path
//! - `TSE_DATA_OFFSET` - Bytes to skip before the first sample (default: 0)
//! - `TSE_CHANNEL_AXIS` - Label of the channel axis (default: c)
//! - `TSE_RAM_PER_PIXEL` - Memory cost per requested sample, in bytes
//! - `TSE_DEFAULT_WINDOW` - Window when no cost is known (default: 4)
//! - `TSE_RESERVE_FRACTION` - Share of available memory kept free (default: 0.5)
//! - `TSE_AVAILABLE_MEMORY` - Override the available-memory reading, in bytes
//! - `TSE_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `TSE_S3_REGION` - AWS region (default: us-east-1)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::export::{
    AdmissionPolicy, ExportOptions, DEFAULT_CHANNEL_AXIS, DEFAULT_RESERVE_FRACTION, DEFAULT_WINDOW,
};
use crate::io::parse_s3_url;
use crate::volume::{SampleType, TaggedShape};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default sample type of raw input volumes.
pub const DEFAULT_DTYPE: &str = "u8";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Export N-dimensional volumes as ordered multipage TIFF stacks.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiff-stack-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Export a raw volume as a multipage TIFF, one page per step-axis index.
    Export(ExportConfig),

    /// List the pages of a TIFF file.
    Inspect(InspectConfig),
}

#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    /// Raw volume: local path or s3://bucket/key.
    #[arg(env = "TSE_INPUT")]
    pub input: String,

    /// Axis labels and extents in storage order, e.g. `z=10,c=1,y=20,x=30`.
    #[arg(long, env = "TSE_SHAPE")]
    pub shape: TaggedShape,

    /// Sample type (u8, u16, u32, i8, i16, i32, f32, f64).
    #[arg(long, default_value = DEFAULT_DTYPE, env = "TSE_DTYPE")]
    pub dtype: SampleType,

    /// Output TIFF path. An existing file is replaced.
    #[arg(short, long, env = "TSE_OUTPUT")]
    pub output: PathBuf,

    /// Bytes to skip before the first sample (file header).
    #[arg(long, default_value_t = 0, env = "TSE_DATA_OFFSET")]
    pub data_offset: u64,

    // =========================================================================
    // Export Tuning
    // =========================================================================
    /// Label of the axis exported as page channels.
    #[arg(long, default_value = DEFAULT_CHANNEL_AXIS, env = "TSE_CHANNEL_AXIS")]
    pub channel_axis: String,

    /// Estimated memory cost per requested sample, in bytes.
    ///
    /// Without it the window falls back to `--default-window`.
    #[arg(long, env = "TSE_RAM_PER_PIXEL")]
    pub ram_per_pixel: Option<f64>,

    /// Number of concurrent fetches when no memory cost is known.
    #[arg(long, default_value_t = DEFAULT_WINDOW, env = "TSE_DEFAULT_WINDOW")]
    pub default_window: usize,

    /// Fraction of available memory kept free, in [0, 1).
    #[arg(long, default_value_t = DEFAULT_RESERVE_FRACTION, env = "TSE_RESERVE_FRACTION")]
    pub reserve_fraction: f64,

    /// Use this many bytes as available memory instead of asking the OS.
    #[arg(long, env = "TSE_AVAILABLE_MEMORY")]
    pub available_memory: Option<u64>,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "TSE_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "TSE_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Do not draw a progress bar.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ExportConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.is_empty() {
            return Err("Input path is required".to_string());
        }
        if self.input.starts_with("s3://") && parse_s3_url(&self.input).is_none() {
            return Err(format!(
                "Invalid S3 URL '{}': expected s3://bucket/key",
                self.input
            ));
        }

        if self.output.as_os_str().is_empty() {
            return Err("Output path is required. Set --output or TSE_OUTPUT".to_string());
        }

        if self.channel_axis.is_empty() {
            return Err("channel_axis must not be empty".to_string());
        }

        if let Some(cost) = self.ram_per_pixel {
            if !cost.is_finite() || cost <= 0.0 {
                return Err("ram_per_pixel must be a positive number".to_string());
            }
        }

        self.policy().validate()
    }

    /// Whether the input is an S3 object rather than a local file.
    pub fn is_s3_input(&self) -> bool {
        self.input.starts_with("s3://")
    }

    pub fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            default_window: self.default_window,
            reserve_fraction: self.reserve_fraction,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            channel_axis: self.channel_axis.clone(),
            policy: self.policy(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// TIFF file to inspect.
    pub path: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = InspectFormat::Text)]
    pub format: InspectFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectFormat {
    /// One line per page
    Text,
    /// Page list as JSON
    Json,
}

// =============================================================================
// Tests
// =============================================================================
