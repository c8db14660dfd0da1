//! Output formats for exported stacks.
//!
//! Only multipage TIFF is supported: it is the one widely read image format
//! that can be grown one page at a time without rewriting earlier pages.

pub mod tiff;
