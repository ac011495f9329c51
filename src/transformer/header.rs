//! Response header merging.

use crate::config::HeaderDirective;
use crate::context::Header;

/// Directive value replaced by the origin of the request.
pub const HTTP_ORIGIN_PLACEHOLDER: &str = "HTTP_ORIGIN";

/// Origin used when none was recorded for the request.
pub const DEFAULT_ORIGIN: &str = "*";

/// Applies a rule's directives to a response header set.
pub struct HeaderMerger<'a> {
    /// Directives, applied in order
    directives: &'a [HeaderDirective],
}

impl<'a> HeaderMerger<'a> {
    pub fn new(directives: &'a [HeaderDirective]) -> Self {
        Self { directives }
    }

    /// Merge the directives into a copy of `original`.
    ///
    /// A directive replaces the first header with exactly the same name,
    /// keeping its position, or is appended. The placeholder value resolves
    /// to `origin`, or `*` when no origin is known.
    pub fn merge(&self, original: &[Header], origin: Option<&str>) -> Vec<Header> {
        let origin = origin.unwrap_or(DEFAULT_ORIGIN);
        let mut merged = original.to_vec();

        for directive in self.directives.iter().filter(|d| !d.is_blank()) {
            let value = if directive.value == HTTP_ORIGIN_PLACEHOLDER {
                origin
            } else {
                directive.value.as_str()
            };
            let header = Header::new(directive.name.as_str(), value);

            let existing = merged.iter().position(|h| h.name == header.name);
            match existing {
                Some(pos) => merged[pos] = header,
                None => merged.push(header),
            }
        }

        merged
    }
}

/// Merge `directives` into `original`, resolving the placeholder to
/// `resolved_origin`.
pub fn merge_headers(
    original: &[Header],
    directives: &[HeaderDirective],
    resolved_origin: &str,
) -> Vec<Header> {
    HeaderMerger::new(directives).merge(original, Some(resolved_origin))
}
