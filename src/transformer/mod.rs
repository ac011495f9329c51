//! Header transformations applied to intercepted responses.

mod header;

pub use header::{merge_headers, HeaderMerger, DEFAULT_ORIGIN, HTTP_ORIGIN_PLACEHOLDER};
