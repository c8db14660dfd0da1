//! TIFF tag and field type definitions.
//!
//! Only the vocabulary needed to write and index uncompressed strip pages is
//! defined here. Unknown tags and types are carried through as raw numbers.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer (1 byte)
    Byte = 1,

    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Undefined byte data (1 byte per element)
    Undefined = 7,

    /// Unsigned 64-bit integer (8 bytes) - BigTIFF only
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Long8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Check if `count` values of this type fit in the entry's value field.
    ///
    /// The value field is 4 bytes in classic TIFF and 8 bytes in BigTIFF.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        self.size_in_bytes() as u64 * count <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs used by the page writer and page index.
///
/// Discriminants are the on-disk tag numbers; IFD entries must be written in
/// ascending tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum TiffTag {
    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample, one value per sample
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Photometric interpretation
    PhotometricInterpretation = 262,

    /// Byte offsets of strips
    StripOffsets = 273,

    /// Number of components per pixel
    SamplesPerPixel = 277,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte counts of strips
    StripByteCounts = 279,

    /// How components are organized (chunky vs planar)
    PlanarConfiguration = 284,

    /// Meaning of samples beyond the photometric ones
    ExtraSamples = 338,

    /// Numeric interpretation of each sample
    SampleFormat = 339,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            338 => Some(TiffTag::ExtraSamples),
            339 => Some(TiffTag::SampleFormat),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Tag name for error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::ExtraSamples => "ExtraSamples",
            TiffTag::SampleFormat => "SampleFormat",
        }
    }
}

// =============================================================================
// Enumerated Values
// =============================================================================

/// TIFF compression scheme identifiers.
///
/// Pages are always written uncompressed; other schemes are only recognized
/// so the page index can report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    Jpeg = 7,
    Deflate = 8,
    PackBits = 32773,
    AdobeDeflate = 32946,
}

impl Compression {
    /// Create a Compression from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32773 => Some(Compression::PackBits),
            32946 => Some(Compression::AdobeDeflate),
            _ => None,
        }
    }

    /// Human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::PackBits => "PackBits",
            Compression::AdobeDeflate => "Adobe Deflate",
        }
    }
}

/// PhotometricInterpretation values written by the page writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Photometric {
    MinIsBlack = 1,
    Rgb = 2,
}

/// SampleFormat values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SampleFormat {
    Unsigned = 1,
    Signed = 2,
    Float = 3,
}

impl SampleFormat {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(SampleFormat::Unsigned),
            2 => Some(SampleFormat::Signed),
            3 => Some(SampleFormat::Float),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
