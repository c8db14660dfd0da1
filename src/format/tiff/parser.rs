//! TIFF header and IFD parsing.
//!
//! These functions work on byte slices so that both the async page index
//! (reading through a [`RangeReader`](crate::io::RangeReader)) and the
//! synchronous page appender (reading a local file) can share them.
//!
//! # Header Layout
//!
//! ```text
//! Classic TIFF (8 bytes):  II|MM, 42, u32 first IFD offset
//! BigTIFF     (16 bytes):  II|MM, 43, u16 8, u16 0, u64 first IFD offset
//! ```
//!
//! A classic IFD is a u16 entry count, 12-byte entries, and a u32 offset to
//! the next IFD (0 terminates the chain). BigTIFF widens these to u64 count,
//! 20-byte entries and a u64 next offset.

use crate::error::TiffError;
use crate::io::{read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le};

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
pub const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF
pub const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset to the first IFD; 0 when the file holds no pages yet
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// A first IFD offset of 0 is accepted: the page appender writes such a
    /// header before the first page is linked in.
    ///
    /// # Errors
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `InvalidVersion` if version is not 42 or 43
    /// - `InvalidBigTiffOffsetSize` if BigTIFF offset size is not 8
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset != 0 && first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of the header itself.
    #[inline]
    pub const fn header_size(&self) -> usize {
        if self.is_bigtiff {
            BIGTIFF_HEADER_SIZE
        } else {
            TIFF_HEADER_SIZE
        }
    }

    /// Position of the first-IFD offset field within the header.
    #[inline]
    pub const fn first_link_position(&self) -> u64 {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of an IFD entry in bytes (12 classic, 20 BigTIFF).
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count field at the start of an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next IFD offset field at the end of an IFD.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Read the entry count from the leading bytes of an IFD.
    pub fn read_entry_count(&self, bytes: &[u8]) -> Result<u64, TiffError> {
        let needed = self.ifd_count_size();
        if bytes.len() < needed {
            return Err(TiffError::FileTooSmall {
                required: needed as u64,
                actual: bytes.len() as u64,
            });
        }
        Ok(if self.is_bigtiff {
            self.byte_order.read_u64(&bytes[..8])
        } else {
            self.byte_order.read_u16(&bytes[..2]) as u64
        })
    }

    /// Total size of an IFD with `entry_count` entries, count and next
    /// offset included.
    #[inline]
    pub fn ifd_size(&self, entry_count: u64) -> u64 {
        self.ifd_count_size() as u64
            + entry_count * self.ifd_entry_size() as u64
            + self.ifd_next_offset_size() as u64
    }

    /// Position of the next-IFD offset field for the IFD at `ifd_offset`.
    #[inline]
    pub fn next_link_position(&self, ifd_offset: u64, entry_count: u64) -> u64 {
        ifd_offset + self.ifd_count_size() as u64 + entry_count * self.ifd_entry_size() as u64
    }

    /// Read a next-IFD offset field.
    pub fn read_link(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }
}

// =============================================================================
// IFD
// =============================================================================

/// One entry of an Image File Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Raw tag number
    pub tag_raw: u16,

    /// Known tag, if recognized
    pub tag: Option<TiffTag>,

    /// Raw field type number
    pub field_type_raw: u16,

    /// Known field type, if recognized
    pub field_type: Option<FieldType>,

    /// Number of values
    pub count: u64,

    /// Raw value/offset field (4 or 8 bytes)
    pub value_offset_bytes: Vec<u8>,

    /// Whether the value is stored inline in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Parse a single entry; `bytes` must hold at least one entry.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let order = header.byte_order;
        let tag_raw = order.read_u16(&bytes[0..2]);
        let field_type_raw = order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, value_bytes) = if header.is_bigtiff {
            (order.read_u64(&bytes[4..12]), &bytes[12..20])
        } else {
            (order.read_u32(&bytes[4..8]) as u64, &bytes[8..12])
        };

        let is_inline = field_type
            .map(|ft| ft.fits_inline(count, header.is_bigtiff))
            .unwrap_or(false);

        Self {
            tag_raw,
            tag: TiffTag::from_u16(tag_raw),
            field_type_raw,
            field_type,
            count,
            value_offset_bytes: value_bytes.to_vec(),
            is_inline,
        }
    }

    /// Total size of the value in bytes, if the field type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }

    /// Interpret the value field as an offset into the file.
    pub fn value_offset(&self, order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() == 8 {
            order.read_u64(&self.value_offset_bytes)
        } else {
            order.read_u32(&self.value_offset_bytes) as u64
        }
    }
}

/// A parsed Image File Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// Offset of this IFD in the file
    pub offset: u64,

    /// Entries in file order
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD, 0 if this is the last one
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Parse an IFD from bytes starting at its entry count.
    ///
    /// `bytes` must cover the full IFD as given by
    /// [`TiffHeader::ifd_size`].
    pub fn parse(bytes: &[u8], offset: u64, header: &TiffHeader) -> Result<Self, TiffError> {
        let count = header.read_entry_count(bytes)?;
        let size = header.ifd_size(count);
        if (bytes.len() as u64) < size {
            return Err(TiffError::FileTooSmall {
                required: size,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let start = header.ifd_count_size();
        let entries = (0..count as usize)
            .map(|i| {
                let at = start + i * entry_size;
                IfdEntry::parse(&bytes[at..at + entry_size], header)
            })
            .collect();

        let link_at = start + count as usize * entry_size;
        let next_ifd_offset = header.read_link(&bytes[link_at..]);

        Ok(Self {
            offset,
            entries,
            next_ifd_offset,
        })
    }

    /// Find the entry for a known tag.
    pub fn entry(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == Some(tag))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn classic_le() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    #[test]
    fn test_parse_classic_little_endian() {
        let header = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let parsed = TiffHeader::parse(&header, 100).unwrap();
        assert_eq!(parsed.byte_order, ByteOrder::LittleEndian);
        assert!(!parsed.is_bigtiff);
        assert_eq!(parsed.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_classic_big_endian() {
        let header = [0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
        let parsed = TiffHeader::parse(&header, 100).unwrap();
        assert_eq!(parsed.byte_order, ByteOrder::BigEndian);
        assert_eq!(parsed.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_bigtiff() {
        let header = [
            0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00, //
            0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let parsed = TiffHeader::parse(&header, 100).unwrap();
        assert!(parsed.is_bigtiff);
        assert_eq!(parsed.first_ifd_offset, 16);
        assert_eq!(parsed.first_link_position(), 8);
    }

    #[test]
    fn test_parse_header_without_pages() {
        let header = [0x49, 0x49, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00];
        let parsed = TiffHeader::parse(&header, 8).unwrap();
        assert_eq!(parsed.first_ifd_offset, 0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            TiffHeader::parse(&[0x49, 0x49, 0x2A, 0x00], 100),
            Err(TiffError::FileTooSmall {
                required: 8,
                actual: 4
            })
        ));
        assert!(matches!(
            TiffHeader::parse(&[0, 0, 0x2A, 0, 8, 0, 0, 0], 100),
            Err(TiffError::InvalidMagic(0))
        ));
        assert!(matches!(
            TiffHeader::parse(&[0x49, 0x49, 0x07, 0, 8, 0, 0, 0], 100),
            Err(TiffError::InvalidVersion(7))
        ));
        assert!(matches!(
            TiffHeader::parse(&[0x49, 0x49, 0x2A, 0, 0xE8, 0x03, 0, 0], 500),
            Err(TiffError::InvalidIfdOffset(1000))
        ));
    }

    #[test]
    fn test_ifd_geometry() {
        let header = classic_le();
        assert_eq!(header.ifd_size(10), 2 + 120 + 4);
        assert_eq!(header.next_link_position(100, 10), 222);
    }

    #[test]
    fn test_parse_ifd() {
        let header = classic_le();
        let mut bytes = vec![0x02, 0x00];
        // ImageWidth LONG 1 = 640
        bytes.extend_from_slice(&[0x00, 0x01, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&640u32.to_le_bytes());
        // BitsPerSample SHORT 3 -> offset 200
        bytes.extend_from_slice(&[0x02, 0x01, 0x03, 0x00, 0x03, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&200u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let ifd = Ifd::parse(&bytes, 8, &header).unwrap();
        assert_eq!(ifd.entries.len(), 2);
        assert_eq!(ifd.next_ifd_offset, 0);

        let width = ifd.entry(TiffTag::ImageWidth).unwrap();
        assert!(width.is_inline);
        assert_eq!(width.value_offset(ByteOrder::LittleEndian), 640);

        let bits = ifd.entry(TiffTag::BitsPerSample).unwrap();
        assert!(!bits.is_inline);
        assert_eq!(bits.value_byte_size(), Some(6));
        assert_eq!(bits.value_offset(ByteOrder::LittleEndian), 200);
    }

    #[test]
    fn test_parse_truncated_ifd() {
        let header = classic_le();
        let bytes = [0x05, 0x00, 0x00, 0x01];
        assert!(matches!(
            Ifd::parse(&bytes, 8, &header),
            Err(TiffError::FileTooSmall { .. })
        ));
    }
}
