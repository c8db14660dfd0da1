//! Byte-range access to volume data and TIFF files.
//!
//! Raw volumes are never loaded whole: every slice fetch becomes one or more
//! positioned reads through [`RangeReader`], which is implemented for local
//! files and for S3 objects.

mod file_reader;
mod range_reader;
mod s3_reader;

pub use file_reader::FileRangeReader;
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
pub use s3_reader::{create_s3_client, parse_s3_url, S3RangeReader};
