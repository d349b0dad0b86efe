//! PDF processing layer
//!
//! Structural operations (merge, page extraction, compression) go through
//! qpdf; page dictionary edits (rotation, watermarks) use lopdf.

mod pages;
mod qpdf;
mod ranges;

pub use pages::{
    add_watermark, page_rotations, parse_hex_color, rotate_pages, WatermarkOptions, VALID_ANGLES,
};
pub use qpdf::QpdfWrapper;
pub use ranges::{format_page_range, parse_page_selection, parse_split_ranges};
