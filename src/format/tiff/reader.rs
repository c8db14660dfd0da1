//! Page index for multipage TIFF files.
//!
//! Walks the IFD chain through a [`RangeReader`] and resolves the tags that
//! describe each page's geometry and strip layout. Values stored out of line
//! are fetched with one range request per array.

use std::collections::HashSet;

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::volume::SampleType;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, FieldType, SampleFormat, TiffTag};

// =============================================================================
// PageInfo
// =============================================================================

/// Geometry and strip layout of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub index: usize,
    pub ifd_offset: u64,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u16,
    pub bits_per_sample: Vec<u16>,
    pub sample_format: u16,
    pub compression: u16,
    pub photometric: Option<u16>,
    pub strip_offsets: Vec<u64>,
    pub strip_byte_counts: Vec<u64>,
}

impl PageInfo {
    /// Element type, when all samples share one supported encoding.
    pub fn sample_type(&self) -> Option<SampleType> {
        let bits = *self.bits_per_sample.first()?;
        if self.bits_per_sample.iter().any(|&b| b != bits) {
            return None;
        }
        SampleType::from_tiff(bits, SampleFormat::from_u16(self.sample_format)?)
    }

    pub fn compression_name(&self) -> &'static str {
        Compression::from_u16(self.compression)
            .map(Compression::name)
            .unwrap_or("Unknown")
    }

    /// Total bytes across all strips.
    pub fn data_len(&self) -> u64 {
        self.strip_byte_counts.iter().sum()
    }
}

// =============================================================================
// PageIndex
// =============================================================================

/// All pages of a TIFF file, in chain order.
#[derive(Debug, Clone)]
pub struct PageIndex {
    header: TiffHeader,
    pages: Vec<PageInfo>,
}

impl PageIndex {
    /// Read the header and every IFD reachable from it.
    pub async fn read<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let size = reader.size();
        let head_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let head = reader.read_exact_at(0, head_len).await?;
        let header = TiffHeader::parse(&head, size)?;

        let mut ifds = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;
        while offset != 0 {
            if !visited.insert(offset) {
                return Err(TiffError::IfdCycle(offset));
            }
            let ifd = read_ifd(reader, &header, offset).await?;
            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        let mut pages = Vec::with_capacity(ifds.len());
        for (index, ifd) in ifds.iter().enumerate() {
            pages.push(page_from_ifd(reader, &header, ifd, index).await?);
        }

        Ok(Self { header, pages })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Read the raw (still encoded) strip bytes of page `index`.
    pub async fn read_page_data<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        index: usize,
    ) -> Result<Bytes, TiffError> {
        let page = self.pages.get(index).ok_or_else(|| TiffError::InvalidTagValue {
            tag: "page",
            message: format!("page {} out of range ({} pages)", index, self.pages.len()),
        })?;

        let mut out = BytesMut::with_capacity(page.data_len() as usize);
        for (&offset, &count) in page.strip_offsets.iter().zip(&page.strip_byte_counts) {
            let strip = reader.read_exact_at(offset, count as usize).await?;
            out.extend_from_slice(&strip);
        }
        Ok(out.freeze())
    }
}

async fn read_ifd<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    offset: u64,
) -> Result<Ifd, TiffError> {
    let count_size = header.ifd_count_size();
    if offset + count_size as u64 > reader.size() {
        return Err(TiffError::InvalidIfdOffset(offset));
    }
    let count_bytes = reader.read_exact_at(offset, count_size).await?;
    let count = header.read_entry_count(&count_bytes)?;

    let size = header.ifd_size(count);
    if offset + size > reader.size() {
        return Err(TiffError::InvalidIfdOffset(offset));
    }
    let bytes = reader.read_exact_at(offset, size as usize).await?;
    Ifd::parse(&bytes, offset, header)
}

async fn page_from_ifd<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
    index: usize,
) -> Result<PageInfo, TiffError> {
    let width = read_single(reader, header, ifd, TiffTag::ImageWidth)
        .await?
        .ok_or(TiffError::MissingTag("ImageWidth"))?;
    let height = read_single(reader, header, ifd, TiffTag::ImageLength)
        .await?
        .ok_or(TiffError::MissingTag("ImageLength"))?;
    let samples_per_pixel = read_single(reader, header, ifd, TiffTag::SamplesPerPixel)
        .await?
        .unwrap_or(1);
    let compression = read_single(reader, header, ifd, TiffTag::Compression)
        .await?
        .unwrap_or(Compression::None as u64);
    let sample_format = read_single(reader, header, ifd, TiffTag::SampleFormat)
        .await?
        .unwrap_or(SampleFormat::Unsigned as u64);
    let photometric = read_single(reader, header, ifd, TiffTag::PhotometricInterpretation)
        .await?
        .map(|p| p as u16);
    let bits_per_sample = match ifd.entry(TiffTag::BitsPerSample) {
        Some(entry) => read_values(reader, header, entry, TiffTag::BitsPerSample)
            .await?
            .into_iter()
            .map(|b| b as u16)
            .collect(),
        None => vec![1],
    };

    let offsets_entry = ifd
        .entry(TiffTag::StripOffsets)
        .ok_or(TiffError::MissingTag("StripOffsets"))?;
    let counts_entry = ifd
        .entry(TiffTag::StripByteCounts)
        .ok_or(TiffError::MissingTag("StripByteCounts"))?;
    let strip_offsets = read_values(reader, header, offsets_entry, TiffTag::StripOffsets).await?;
    let strip_byte_counts =
        read_values(reader, header, counts_entry, TiffTag::StripByteCounts).await?;

    if strip_offsets.len() != strip_byte_counts.len() {
        return Err(TiffError::InvalidTagValue {
            tag: "StripByteCounts",
            message: format!(
                "{} offsets but {} byte counts",
                strip_offsets.len(),
                strip_byte_counts.len()
            ),
        });
    }

    Ok(PageInfo {
        index,
        ifd_offset: ifd.offset,
        width: width as u32,
        height: height as u32,
        samples_per_pixel: samples_per_pixel as u16,
        bits_per_sample,
        sample_format: sample_format as u16,
        compression: compression as u16,
        photometric,
        strip_offsets,
        strip_byte_counts,
    })
}

/// First value of `tag`, or `None` if the IFD does not carry it.
async fn read_single<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Option<u64>, TiffError> {
    let Some(entry) = ifd.entry(tag) else {
        return Ok(None);
    };
    let values = read_values(reader, header, entry, tag).await?;
    match values.first() {
        Some(&value) => Ok(Some(value)),
        None => Err(TiffError::InvalidTagValue {
            tag: tag.name(),
            message: "no values".to_string(),
        }),
    }
}

/// Read every value of an unsigned integer entry, widening to u64.
async fn read_values<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    entry: &IfdEntry,
    tag: TiffTag,
) -> Result<Vec<u64>, TiffError> {
    let field_type = entry
        .field_type
        .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
    if !matches!(
        field_type,
        FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Long8
    ) {
        return Err(TiffError::InvalidTagValue {
            tag: tag.name(),
            message: format!("expected an unsigned integer type, got {:?}", field_type),
        });
    }

    let size = field_type.size_in_bytes();
    let total = size * entry.count as usize;
    let bytes = if entry.is_inline {
        Bytes::copy_from_slice(&entry.value_offset_bytes[..total])
    } else {
        let offset = entry.value_offset(header.byte_order);
        if offset + total as u64 > reader.size() {
            return Err(TiffError::InvalidTagValue {
                tag: tag.name(),
                message: format!("value array at {} runs past end of file", offset),
            });
        }
        reader.read_exact_at(offset, total).await?
    };

    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| decode(header.byte_order, field_type, chunk))
        .collect())
}

fn decode(order: ByteOrder, field_type: FieldType, chunk: &[u8]) -> u64 {
    match field_type {
        FieldType::Short => order.read_u16(chunk) as u64,
        FieldType::Long => order.read_u32(chunk) as u64,
        FieldType::Long8 => order.read_u64(chunk),
        _ => chunk[0] as u64,
    }
}
