//! Append-only multipage TIFF writer.
//!
//! Each [`Page`] is written as one uncompressed strip followed by its IFD at
//! the end of the file. Only after both are on disk is the previous IFD's
//! next-offset (or the header's first-IFD offset) patched to point at the
//! new IFD, so an interrupted export leaves a readable file holding every
//! page appended so far.
//!
//! ```text
//! ┌────────┬───────────┬─────────┬──────┬───────────┬─────────┬──────┐
//! │ header │ page 0    │ arrays  │ IFD0 │ page 1    │ arrays  │ IFD1 │ ...
//! │ II*\0  │ strip     │ (opt.)  │ ──┐  │ strip     │ (opt.)  │      │
//! └───┬────┴───────────┴─────────┴───│──┴───────────┴─────────┴──────┘
//!     └─────────────► IFD0           └─────────────► IFD1
//! ```

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::volume::SampleType;

use super::parser::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, VERSION_TIFF};
use super::tags::{Compression, FieldType, Photometric, TiffTag};

/// Offset field of the classic header, patched when the first page lands.
const HEADER_LINK_POSITION: u64 = 4;

// =============================================================================
// Page
// =============================================================================

/// One image page in chunky (interleaved) row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    height: u32,
    width: u32,
    samples_per_pixel: u16,
    sample_type: SampleType,
    data: Bytes,
}

impl Page {
    /// Create a page, checking that `data` holds exactly
    /// `height * width * samples_per_pixel` little-endian samples.
    pub fn new(
        height: u32,
        width: u32,
        samples_per_pixel: u16,
        sample_type: SampleType,
        data: impl Into<Bytes>,
    ) -> Result<Self, TiffError> {
        let data = data.into();
        if height == 0 || width == 0 || samples_per_pixel == 0 {
            return Err(TiffError::InvalidPage(format!(
                "empty geometry {}x{}x{}",
                height, width, samples_per_pixel
            )));
        }
        let expected = height as usize
            * width as usize
            * samples_per_pixel as usize
            * sample_type.byte_size();
        if data.len() != expected {
            return Err(TiffError::InvalidPage(format!(
                "{} bytes for {}x{}x{} {} samples, expected {}",
                data.len(),
                height,
                width,
                samples_per_pixel,
                sample_type,
                expected
            )));
        }
        Ok(Self {
            height,
            width,
            samples_per_pixel,
            sample_type,
            data,
        })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// RGB for 3 or 4 integer channels, grayscale otherwise.
    pub fn photometric(&self) -> Photometric {
        if matches!(self.samples_per_pixel, 3 | 4) && self.sample_type.is_integer() {
            Photometric::Rgb
        } else {
            Photometric::MinIsBlack
        }
    }

    /// Number of samples beyond those the photometric interpretation uses.
    pub fn extra_samples(&self) -> u16 {
        match self.photometric() {
            Photometric::Rgb => self.samples_per_pixel - 3,
            Photometric::MinIsBlack => self.samples_per_pixel - 1,
        }
    }
}

// =============================================================================
// IFD Encoding
// =============================================================================

/// A classic little-endian IFD entry, value inline or in the array block.
struct EntrySpec {
    tag: TiffTag,
    field_type: FieldType,
    values: Vec<u32>,
}

impl EntrySpec {
    fn short(tag: TiffTag, values: Vec<u16>) -> Self {
        Self {
            tag,
            field_type: FieldType::Short,
            values: values.into_iter().map(u32::from).collect(),
        }
    }

    fn long(tag: TiffTag, value: u32) -> Self {
        Self {
            tag,
            field_type: FieldType::Long,
            values: vec![value],
        }
    }

    fn encoded_values(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * 4);
        for &v in &self.values {
            match self.field_type {
                FieldType::Short => out.extend_from_slice(&(v as u16).to_le_bytes()),
                _ => out.extend_from_slice(&v.to_le_bytes()),
            }
        }
        out
    }

    fn is_inline(&self) -> bool {
        self.field_type
            .fits_inline(self.values.len() as u64, false)
    }
}

/// Encoded bytes that follow a page's pixel data.
struct PageTail {
    /// Padding, out-of-line arrays and the IFD, written contiguously
    bytes: Vec<u8>,
    /// Absolute offset of the IFD
    ifd_offset: u64,
    /// Absolute offset of the IFD's next-IFD field
    next_link: u64,
}

/// Lay out the arrays and IFD for `page` whose strip starts at `data_offset`.
fn encode_page_tail(page: &Page, data_offset: u64) -> Result<PageTail, TiffError> {
    let data_len = page.data.len() as u64;
    let spp = page.samples_per_pixel;

    let mut entries = vec![
        EntrySpec::long(TiffTag::ImageWidth, page.width),
        EntrySpec::long(TiffTag::ImageLength, page.height),
        EntrySpec::short(TiffTag::BitsPerSample, vec![page.sample_type.bits(); spp as usize]),
        EntrySpec::short(TiffTag::Compression, vec![Compression::None as u16]),
        EntrySpec::short(
            TiffTag::PhotometricInterpretation,
            vec![page.photometric() as u16],
        ),
        EntrySpec::long(TiffTag::StripOffsets, to_u32(data_offset)?),
        EntrySpec::short(TiffTag::SamplesPerPixel, vec![spp]),
        EntrySpec::long(TiffTag::RowsPerStrip, page.height),
        EntrySpec::long(TiffTag::StripByteCounts, to_u32(data_len)?),
        EntrySpec::short(TiffTag::PlanarConfiguration, vec![1]),
    ];
    let extra = page.extra_samples();
    if extra > 0 {
        // 0 = unspecified data
        entries.push(EntrySpec::short(
            TiffTag::ExtraSamples,
            vec![0; extra as usize],
        ));
    }
    entries.push(EntrySpec::short(
        TiffTag::SampleFormat,
        vec![page.sample_type.sample_format() as u16; spp as usize],
    ));
    entries.sort_by_key(|e| e.tag.as_u16());

    let data_end = data_offset + data_len;
    let arrays_offset = align_word(data_end);
    let mut bytes = vec![0u8; (arrays_offset - data_end) as usize];

    // Out-of-line arrays first, remembering where each one landed
    let mut array_offsets = Vec::with_capacity(entries.len());
    for entry in &entries {
        if entry.is_inline() {
            array_offsets.push(None);
        } else {
            let at = data_end + bytes.len() as u64;
            bytes.extend_from_slice(&entry.encoded_values());
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            array_offsets.push(Some(at));
        }
    }

    let ifd_offset = data_end + bytes.len() as u64;
    bytes.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (entry, array_offset) in entries.iter().zip(&array_offsets) {
        bytes.extend_from_slice(&entry.tag.as_u16().to_le_bytes());
        bytes.extend_from_slice(&(entry.field_type as u16).to_le_bytes());
        bytes.extend_from_slice(&(entry.values.len() as u32).to_le_bytes());
        let mut field = match array_offset {
            Some(at) => to_u32(*at)?.to_le_bytes().to_vec(),
            None => entry.encoded_values(),
        };
        field.resize(4, 0);
        bytes.extend_from_slice(&field);
    }
    let next_link = data_end + bytes.len() as u64;
    bytes.extend_from_slice(&0u32.to_le_bytes());

    to_u32(data_end + bytes.len() as u64)?;

    Ok(PageTail {
        bytes,
        ifd_offset,
        next_link,
    })
}

#[inline]
fn align_word(offset: u64) -> u64 {
    offset + (offset & 1)
}

fn to_u32(offset: u64) -> Result<u32, TiffError> {
    u32::try_from(offset).map_err(|_| TiffError::OffsetOverflow(offset))
}

fn write_error(path: &Path, err: std::io::Error) -> TiffError {
    TiffError::Write(format!("{}: {}", path.display(), err))
}

// =============================================================================
// TiffPageWriter
// =============================================================================

/// Appends pages to a TIFF file, creating it on the first append.
///
/// If the file already exists it must be a classic little-endian TIFF; new
/// pages are linked after its last IFD.
#[derive(Debug)]
pub struct TiffPageWriter {
    path: PathBuf,
    file: Option<File>,
    /// Position of the next-IFD field to patch on the next append
    tail_link: u64,
    pages_written: usize,
}

impl TiffPageWriter {
    /// Create a writer for `path`. Nothing is touched until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            tail_link: HEADER_LINK_POSITION,
            pages_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pages appended through this writer.
    pub fn pages_written(&self) -> usize {
        self.pages_written
    }

    /// Append one page.
    pub fn append(&mut self, page: &Page) -> Result<(), TiffError> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                let (file, tail_link) = open_for_append(&self.path)?;
                self.tail_link = tail_link;
                file
            }
        };

        let result = self.append_to(&mut file, page);
        self.file = Some(file);
        result
    }

    fn append_to(&mut self, file: &mut File, page: &Page) -> Result<(), TiffError> {
        let path = self.path.clone();
        let io = |e| write_error(&path, e);

        let end = file.seek(SeekFrom::End(0)).map_err(io)?;
        let data_offset = align_word(end);
        let tail = encode_page_tail(page, data_offset)?;

        if data_offset > end {
            file.write_all(&[0]).map_err(io)?;
        }
        file.write_all(page.data()).map_err(io)?;
        file.write_all(&tail.bytes).map_err(io)?;

        file.seek(SeekFrom::Start(self.tail_link)).map_err(io)?;
        file.write_all(&to_u32(tail.ifd_offset)?.to_le_bytes())
            .map_err(io)?;
        file.flush().map_err(io)?;

        debug!(
            path = %self.path.display(),
            page = self.pages_written,
            ifd_offset = tail.ifd_offset,
            "Appended TIFF page"
        );

        self.tail_link = tail.next_link;
        self.pages_written += 1;
        Ok(())
    }
}

/// Open `path` for appending and find the next-IFD field to patch.
fn open_for_append(path: &Path) -> Result<(File, u64), TiffError> {
    let io = |e| write_error(path, e);

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(io)?;
    let len = file.metadata().map_err(io)?.len();

    if len == 0 {
        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(b"II");
        header.extend_from_slice(&VERSION_TIFF.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        file.write_all(&header).map_err(io)?;
        return Ok((file, HEADER_LINK_POSITION));
    }

    let link = locate_tail_link(&mut file, len)?;
    Ok((file, link))
}

/// Walk the IFD chain of an existing file and return the position of the
/// last next-IFD field.
fn locate_tail_link(file: &mut File, len: u64) -> Result<u64, TiffError> {
    let io = |e: std::io::Error| TiffError::Write(e.to_string());

    let mut head = vec![0u8; BIGTIFF_HEADER_SIZE.min(len as usize)];
    file.seek(SeekFrom::Start(0)).map_err(io)?;
    file.read_exact(&mut head).map_err(io)?;
    let header = TiffHeader::parse(&head, len)?;

    if header.is_bigtiff || header.byte_order != ByteOrder::LittleEndian {
        return Err(TiffError::UnsupportedAppend(
            "only classic little-endian TIFF files can be extended".to_string(),
        ));
    }

    let mut link = header.first_link_position();
    let mut offset = header.first_ifd_offset;
    let mut visited = HashSet::new();
    while offset != 0 {
        if !visited.insert(offset) {
            return Err(TiffError::IfdCycle(offset));
        }
        if offset + header.ifd_count_size() as u64 > len {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let mut count_bytes = [0u8; 2];
        file.seek(SeekFrom::Start(offset)).map_err(io)?;
        file.read_exact(&mut count_bytes).map_err(io)?;
        let count = header.read_entry_count(&count_bytes)?;

        link = header.next_link_position(offset, count);
        if link + header.ifd_next_offset_size() as u64 > len {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let mut next = [0u8; 4];
        file.seek(SeekFrom::Start(link)).map_err(io)?;
        file.read_exact(&mut next).map_err(io)?;
        offset = header.read_link(&next);
    }

    Ok(link)
}

// =============================================================================
// Tests
// =============================================================================
