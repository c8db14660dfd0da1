use thiserror::Error;

/// I/O errors that can occur when reading from local or remote storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object or file not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("File error: {0}")]
    File(String),
}

/// Errors that can occur when reading or appending TIFF pages
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// IFD chain loops back on itself
    #[error("IFD chain contains a cycle at offset {0}")]
    IfdCycle(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Appending only supports classic little-endian TIFF
    #[error("Cannot append to this file: {0}")]
    UnsupportedAppend(String),

    /// Page would place data beyond the 32-bit offset range of classic TIFF
    #[error("Classic TIFF offset overflow: page would end at byte {0}")]
    OffsetOverflow(u64),

    /// Page buffer does not match its declared geometry
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    /// Error writing the output file
    #[error("Write error: {0}")]
    Write(String),
}

/// Errors raised by a volume source while answering a region fetch
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Underlying storage read failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Region does not fit the volume
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Source-defined failure (computation error, upstream failure, ...)
    #[error("{0}")]
    Failed(String),
}

/// Errors that terminate an export
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    /// Non-singleton axes cannot be reduced to a page shape
    #[error("Invalid stack shape {shape}: {reason}")]
    InvalidShape { shape: String, reason: String },

    /// Export options out of range
    #[error("Invalid export options: {0}")]
    InvalidOptions(String),

    /// A slice fetch failed when it reached the head of the window
    #[error("Fetch for slice {index} failed: {source}")]
    SourceFetch {
        index: usize,
        #[source]
        source: SourceError,
    },

    /// A fetch task panicked or was aborted
    #[error("Fetch task for slice {index} did not complete: {message}")]
    FetchTask { index: usize, message: String },

    /// Fetched slice does not have the shape the classifier fixed
    #[error("Slice {index} has shape {actual:?} after squeezing, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Writing a page failed
    #[error("Output error: {0}")]
    Output(#[from] TiffError),

    /// Filesystem error outside page writing (removing a previous export)
    #[error("I/O error: {0}")]
    Io(String),
}
