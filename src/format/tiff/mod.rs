//! Multipage TIFF output.
//!
//! Exported stacks are written as classic little-endian TIFF, one
//! uncompressed strip per page, appended in order. The same header and IFD
//! parsing serves the page index used to inspect finished exports.
//!
//! # Key Concepts
//!
//! - **IFD chain**: every page has an Image File Directory whose last field
//!   points to the next page's IFD. Appending a page means writing its data
//!   and IFD, then patching the previous link.
//!
//! - **Inline vs offset values**: values up to 4 bytes (8 in BigTIFF) live
//!   inside the IFD entry; longer arrays are stored elsewhere and referenced
//!   by offset.

mod parser;
mod reader;
mod tags;
mod writer;

pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE, VERSION_BIGTIFF,
    VERSION_TIFF,
};
pub use reader::{PageIndex, PageInfo};
pub use tags::{Compression, FieldType, Photometric, SampleFormat, TiffTag};
pub use writer::{Page, TiffPageWriter};
