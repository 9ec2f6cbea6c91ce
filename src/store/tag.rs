//! Entity tags for embedded content
//!
//! A tag is the URL-safe base64 (no padding) SHA-1 of the uncompressed
//! content. On the wire it always carries the `-gz` marker; the marker is
//! dropped when the content is served decoded.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha1::{Digest, Sha1};
use std::fmt;

/// Marker appended to tags that describe the gzip variant of a file
pub const GZIP_MARKER: &str = "-gz";

/// Structured entity tag
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct EntityTag {
    base: String,
    gzip_variant: bool,
}

impl EntityTag {
    /// Compute the tag for uncompressed content, marked as the gzip variant
    pub fn compute(content: &[u8]) -> Self {
        let hash = Sha1::digest(content);
        Self {
            base: URL_SAFE_NO_PAD.encode(hash),
            gzip_variant: true,
        }
    }

    pub fn new(base: impl Into<String>, gzip_variant: bool) -> Self {
        Self {
            base: base.into(),
            gzip_variant,
        }
    }

    /// Parse the wire form, splitting off a trailing `-gz` marker
    pub fn parse(value: &str) -> Self {
        match value.strip_suffix(GZIP_MARKER) {
            Some(base) => Self::new(base, true),
            None => Self::new(value, false),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_gzip_variant(&self) -> bool {
        self.gzip_variant
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && !self.gzip_variant
    }

    /// Tag describing the decoded representation
    pub fn plain(&self) -> Self {
        Self::new(self.base.clone(), false)
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        if self.gzip_variant {
            f.write_str(GZIP_MARKER)?;
        }
        Ok(())
    }
}

impl From<&str> for EntityTag {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_known_value() {
        // sha1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        let tag = EntityTag::compute(b"");
        assert_eq!(tag.to_string(), "2jmj7l5rSw0yVb_vlWAYkK_YBwk-gz");
        assert_eq!(tag.plain().to_string(), "2jmj7l5rSw0yVb_vlWAYkK_YBwk");
    }

    #[test]
    fn test_parse() {
        let tag = EntityTag::parse("abc-gz");
        assert_eq!(tag.base(), "abc");
        assert!(tag.is_gzip_variant());

        let tag = EntityTag::parse("abc");
        assert_eq!(tag.base(), "abc");
        assert!(!tag.is_gzip_variant());

        // Shorter than the marker
        let tag = EntityTag::parse("gz");
        assert_eq!(tag.to_string(), "gz");
        assert_eq!(tag.plain().to_string(), "gz");

        assert!(EntityTag::parse("").is_empty());
        assert!(!EntityTag::parse("-gz").is_empty());
        assert_eq!(EntityTag::parse("-gz").plain().to_string(), "");
    }
}
