//! TIFF Stack Export - exports volumes as ordered multipage TIFF files.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiff_stack_export::{
    config::{Cli, Command, ExportConfig, InspectConfig, InspectFormat},
    create_s3_client,
    io::parse_s3_url,
    FileRangeReader, FixedMemory, MemoryProbe, PageIndex, RawVolumeSource, S3RangeReader,
    StackExporter, SystemMemory, VolumeMetadata, VolumeSource,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Export(config) => run_export(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match open_source(&config).await {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot open {}: {}", config.input, e);
            return ExitCode::FAILURE;
        }
    };

    let exporter = match StackExporter::new(source, config.export_options()) {
        Ok(exporter) => exporter,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let memory: Box<dyn MemoryProbe> = match config.available_memory {
        Some(bytes) => Box::new(FixedMemory(bytes)),
        None => Box::new(SystemMemory::new()),
    };

    info!(
        "Exporting {} pages along '{}' to {}",
        exporter.page_count(),
        exporter.axes().step_axis(),
        config.output.display()
    );

    let bar = (!config.no_progress).then(progress_bar);
    if let Some(ref bar) = bar {
        let bar = bar.clone();
        exporter
            .progress()
            .subscribe(move |percent| bar.set_position(u64::from(percent)));
    }

    let result = exporter.export_to(&config.output, memory.as_ref()).await;

    match result {
        Ok(summary) => {
            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }
            info!(
                "Wrote {} pages (window {}, peak in flight {})",
                summary.pages, summary.window_size, summary.peak_in_flight
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(bar) = bar {
                bar.abandon_with_message("failed");
            }
            error!("Export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Open the raw input volume, local or on S3.
async fn open_source(config: &ExportConfig) -> Result<Arc<dyn VolumeSource>, String> {
    let mut metadata = VolumeMetadata::new(config.shape.clone(), config.dtype);
    metadata.ram_per_pixel = config.ram_per_pixel;

    if config.is_s3_input() {
        let (bucket, key) = parse_s3_url(&config.input)
            .ok_or_else(|| format!("invalid S3 URL '{}'", config.input))?;
        if let Some(ref endpoint) = config.s3_endpoint {
            info!("S3 endpoint: {}", endpoint);
        }
        let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
        let reader = S3RangeReader::new(client, bucket, key)
            .await
            .map_err(|e| e.to_string())?;
        let source = RawVolumeSource::new(reader, metadata, config.data_offset)
            .map_err(|e| e.to_string())?;
        Ok(Arc::new(source))
    } else {
        let reader = FileRangeReader::open(&config.input)
            .await
            .map_err(|e| e.to_string())?;
        let source = RawVolumeSource::new(reader, metadata, config.data_offset)
            .map_err(|e| e.to_string())?;
        Ok(Arc::new(source))
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiff_stack_export=debug"
    } else {
        "tiff_stack_export=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let reader = match FileRangeReader::open(&config.path).await {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let index = match PageIndex::read(&reader).await {
        Ok(index) => index,
        Err(e) => {
            eprintln!("Error: {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match config.format {
        InspectFormat::Text => {
            println!("{}: {} page(s)", config.path.display(), index.len());
            for page in index.pages() {
                let sample_type = page
                    .sample_type()
                    .map(|t| t.name())
                    .unwrap_or("unknown");
                println!(
                    "  [{}] {}x{} x{} {} {} ({} bytes)",
                    page.index,
                    page.width,
                    page.height,
                    page.samples_per_pixel,
                    sample_type,
                    page.compression_name(),
                    page.data_len()
                );
            }
        }
        InspectFormat::Json => {
            let json = serde_json::json!({
                "path": config.path.display().to_string(),
                "bigtiff": index.header().is_bigtiff,
                "pages": index.pages(),
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}
