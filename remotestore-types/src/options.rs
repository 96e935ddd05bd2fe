//! Per-file and per-call option overrides.
//!
//! Every operation accepts an [`Options`] value. A file handle stores the options it was created
//! with, and each call on the handle merges the call-specific options on top of those. Merging is
//! shallow and never mutates either side: a field set in the overrides wins, otherwise the base
//! value is kept.

use std::time::Duration;

/// A byte range within an object's content.
///
/// `start` is inclusive and `end` is exclusive, mirroring slice semantics. An `end` of `None` reads
/// until the end of the content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub start: u64,
    /// Offset one past the last byte.
    pub end: Option<u64>,
}

impl ByteRange {
    /// Creates a new range.
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Returns `true` if the range cannot contain any bytes.
    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end <= self.start)
    }

    /// Selects a sub-range, with `start` and `end` relative to the start of this range.
    ///
    /// The result never extends past the end of this range.
    pub fn slice(&self, start: u64, end: Option<u64>) -> Self {
        let end = match (end.map(|end| self.start.saturating_add(end)), self.end) {
            (Some(end), Some(limit)) => Some(end.min(limit)),
            (end, limit) => end.or(limit),
        };
        Self::new(self.start.saturating_add(start), end)
    }

    /// Formats the range as an HTTP `Range` header value.
    ///
    /// HTTP ranges are inclusive on both ends. Returns `None` for empty ranges, which cannot be
    /// expressed on the wire.
    pub fn to_header(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        Some(match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end - 1),
            None => format!("bytes={}-", self.start),
        })
    }
}

/// Optional overrides applied to a single file or a single call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Overrides the configured collection.
    pub bucket: Option<String>,

    /// Overrides the configured branch (GitLab only).
    pub branch: Option<String>,

    /// Content type used when uploading and reported for downloaded content.
    pub content_type: Option<String>,

    /// Restricts content reads to a byte range.
    pub range: Option<ByteRange>,

    /// Whether presigned links should display inline instead of downloading as attachment.
    pub inline: Option<bool>,

    /// Lifetime of presigned links (Alfresco only).
    pub expires_in: Option<Duration>,

    /// Commit message used for writes and deletes (GitLab only).
    pub commit_message: Option<String>,
}

impl Options {
    /// Creates empty options that override nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the collection override.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Sets the branch override.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the byte range for reads.
    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets whether presigned links display inline.
    pub fn with_inline(mut self, inline: bool) -> Self {
        self.inline = Some(inline);
        self
    }

    /// Sets the lifetime of presigned links.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Sets the commit message.
    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    /// Returns a new set of options where every field set in `overrides` replaces the value in
    /// `self`.
    pub fn merge(&self, overrides: &Options) -> Options {
        Options {
            bucket: overrides.bucket.clone().or_else(|| self.bucket.clone()),
            branch: overrides.branch.clone().or_else(|| self.branch.clone()),
            content_type: overrides
                .content_type
                .clone()
                .or_else(|| self.content_type.clone()),
            range: overrides.range.or(self.range),
            inline: overrides.inline.or(self.inline),
            expires_in: overrides.expires_in.or(self.expires_in),
            commit_message: overrides
                .commit_message
                .clone()
                .or_else(|| self.commit_message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win() {
        let base = Options::new()
            .with_bucket("base")
            .with_inline(true)
            .with_content_type("text/plain");
        let overrides = Options::new().with_inline(false).with_branch("dev");

        let merged = base.merge(&overrides);

        assert_eq!(merged.bucket.as_deref(), Some("base"));
        assert_eq!(merged.branch.as_deref(), Some("dev"));
        assert_eq!(merged.inline, Some(false));
        assert_eq!(merged.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn merge_leaves_base_untouched() {
        let base = Options::new().with_bucket("base");
        let _ = base.merge(&Options::new().with_bucket("other"));
        assert_eq!(base.bucket.as_deref(), Some("base"));
    }

    #[test]
    fn sub_ranges_are_relative() {
        let parent = ByteRange::new(6, Some(11));
        assert_eq!(parent.slice(1, Some(3)), ByteRange::new(7, Some(9)));
        assert_eq!(parent.slice(2, None), ByteRange::new(8, Some(11)));
        assert_eq!(parent.slice(0, Some(100)), ByteRange::new(6, Some(11)));
        assert!(parent.slice(10, None).is_empty());

        let open = ByteRange::new(6, None);
        assert_eq!(open.slice(1, None), ByteRange::new(7, None));
        assert_eq!(open.slice(1, Some(2)), ByteRange::new(7, Some(8)));
    }

    #[test]
    fn range_headers() {
        assert_eq!(
            ByteRange::new(0, Some(5)).to_header().as_deref(),
            Some("bytes=0-4")
        );
        assert_eq!(
            ByteRange::new(6, None).to_header().as_deref(),
            Some("bytes=6-")
        );
        assert!(ByteRange::new(4, Some(4)).is_empty());
        assert_eq!(ByteRange::new(4, Some(2)).to_header(), None);
    }
}
