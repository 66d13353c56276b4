//! Options for opening archives.

use crate::codec::pipeline::PipelineOptions;
use crate::format::streams::ResourceLimits;

/// Options controlling how an archive is located and parsed.
///
/// # Example
///
/// ```rust
/// use zesven_core::read::OpenOptions;
/// use zesven_core::ResourceLimits;
///
/// let options = OpenOptions::new()
///     .search_limit(Some(1 << 20))
///     .limits(ResourceLimits::new().max_entries(10_000));
/// assert_eq!(options.search_limit, Some(1 << 20));
/// ```
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Limits applied while parsing headers and decoding folders.
    pub limits: ResourceLimits,
    /// How many bytes past the first 32 to scan for a signature when the
    /// input does not start with one. `None` disables the scan.
    pub search_limit: Option<u64>,
    /// Locate the header by scanning the file tail when the start header is
    /// all zeros (default: true).
    pub recover_zeroed_start_header: bool,
    /// Options for folder decoding.
    pub pipeline: PipelineOptions,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            search_limit: None,
            recover_zeroed_start_header: true,
            pipeline: PipelineOptions::default(),
        }
    }
}

impl OpenOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the signature scan budget.
    pub fn search_limit(mut self, limit: Option<u64>) -> Self {
        self.search_limit = limit;
        self
    }

    /// Enables or disables zeroed start header recovery.
    pub fn recover_zeroed_start_header(mut self, recover: bool) -> Self {
        self.recover_zeroed_start_header = recover;
        self
    }

    /// Sets the pipeline options.
    pub fn pipeline(mut self, pipeline: PipelineOptions) -> Self {
        self.pipeline = pipeline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = OpenOptions::default();
        assert_eq!(options.search_limit, None);
        assert!(options.recover_zeroed_start_header);
        assert!(options.pipeline.verify_crc);
        assert_eq!(options.limits.max_entries, 1_000_000);
    }

    #[test]
    fn test_builder_chain() {
        let options = OpenOptions::new()
            .search_limit(Some(4096))
            .recover_zeroed_start_header(false)
            .pipeline(PipelineOptions::new().verify_crc(false));
        assert_eq!(options.search_limit, Some(4096));
        assert!(!options.recover_zeroed_start_header);
        assert!(!options.pipeline.verify_crc);
    }
}
