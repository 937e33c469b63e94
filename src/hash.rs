use base64::Engine;
use md5::{Digest, Md5};

/// Which digests to compute and compare while moving object data.
///
/// Validation covers the bytes as the server stores them: for gzip transfers that is the
/// compressed representation, not what a consumer ends up with.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Validation {
    /// Verify both the crc32c and the md5 digest. The default.
    #[default]
    Both,
    /// Verify only the crc32c digest. Every object has one.
    Crc32c,
    /// Verify only the md5 digest. Composite objects do not carry one.
    Md5,
    /// Don't verify anything. Required for ranged downloads, where the server digest describes
    /// the whole object and can never match a slice of it.
    None,
}

impl Validation {
    pub(crate) fn wants_crc32c(self) -> bool {
        matches!(self, Validation::Both | Validation::Crc32c)
    }

    pub(crate) fn wants_md5(self) -> bool {
        matches!(self, Validation::Both | Validation::Md5)
    }

    pub(crate) fn enabled(self) -> bool {
        self != Validation::None
    }
}

/// The digest algorithms an `ObjectHasher` can run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Algorithm {
    Crc32c,
    Md5,
}

impl Algorithm {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Algorithm::Crc32c => "crc32c",
            Algorithm::Md5 => "md5",
        }
    }
}

/// Running crc32c and md5 digests over every byte fed to it.
///
/// Construction is gated on the requested validation so that a `Validation::None` transfer never
/// pays for hashing at all.
#[derive(Debug, Clone)]
pub(crate) struct ObjectHasher {
    crc32c: Option<u32>,
    md5: Option<Md5>,
}

impl ObjectHasher {
    /// Returns a hasher for the algorithms `validation` asks for, or `None` when validation is
    /// disabled altogether.
    pub fn for_validation(validation: Validation) -> Option<Self> {
        if !validation.enabled() {
            return None;
        }
        Some(Self {
            crc32c: validation.wants_crc32c().then_some(0),
            md5: validation.wants_md5().then(Md5::new),
        })
    }

    pub fn update(&mut self, bytes: &[u8]) {
        if let Some(crc) = self.crc32c.as_mut() {
            *crc = crc32c::crc32c_append(*crc, bytes);
        }
        if let Some(md5) = self.md5.as_mut() {
            md5.update(bytes);
        }
    }

    /// The computed digest in base64, `None` when the algorithm was not requested.
    pub fn digest(&self, algorithm: Algorithm) -> Option<String> {
        let engine = &base64::engine::general_purpose::STANDARD;
        match algorithm {
            Algorithm::Crc32c => self.crc32c.map(|crc| engine.encode(crc.to_be_bytes())),
            Algorithm::Md5 => self
                .md5
                .as_ref()
                .map(|md5| engine.encode(md5.clone().finalize())),
        }
    }

    /// Compares the computed digest against a base64 expectation. Returns `None` when the
    /// algorithm was not requested or the expectation does not decode.
    pub fn test(&self, algorithm: Algorithm, expected_base64: &str) -> Option<bool> {
        let expected = base64::engine::general_purpose::STANDARD
            .decode(expected_base64.trim())
            .ok()?;
        let expected = match algorithm {
            // The service historically wraps the crc in a longer value of which only the
            // trailing four bytes are the checksum.
            Algorithm::Crc32c if expected.len() > 4 => expected[expected.len() - 4..].to_vec(),
            _ => expected,
        };
        let computed = match algorithm {
            Algorithm::Crc32c => self.crc32c?.to_be_bytes().to_vec(),
            Algorithm::Md5 => self.md5.as_ref()?.clone().finalize().to_vec(),
        };
        Some(expected == computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher_over(bytes: &[u8]) -> ObjectHasher {
        let mut hasher = ObjectHasher::for_validation(Validation::Both).unwrap();
        hasher.update(bytes);
        hasher
    }

    #[test]
    fn digests_match_known_values() {
        let hasher = hasher_over(b"hello");
        assert_eq!(hasher.digest(Algorithm::Crc32c).unwrap(), "mnG7TA==");
        assert_eq!(hasher.digest(Algorithm::Md5).unwrap(), "XUFAKrxLKna5cZ2REBfFkg==");
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_digest() {
        let mut chunked = ObjectHasher::for_validation(Validation::Both).unwrap();
        chunked.update(b"he");
        chunked.update(b"");
        chunked.update(b"llo");
        assert_eq!(chunked.digest(Algorithm::Crc32c), hasher_over(b"hello").digest(Algorithm::Crc32c));
        assert_eq!(chunked.digest(Algorithm::Md5), hasher_over(b"hello").digest(Algorithm::Md5));
    }

    #[test]
    fn test_accepts_matching_digests() {
        let hasher = hasher_over(b"hello");
        assert_eq!(hasher.test(Algorithm::Crc32c, "mnG7TA=="), Some(true));
        assert_eq!(hasher.test(Algorithm::Md5, "XUFAKrxLKna5cZ2REBfFkg=="), Some(true));
        assert_eq!(hasher.test(Algorithm::Crc32c, "XuUYyA=="), Some(false));
    }

    #[test]
    fn test_slices_the_trailing_four_bytes_of_a_long_crc() {
        // 4 bytes of junk followed by the real checksum of b"hello".
        let hasher = hasher_over(b"hello");
        assert_eq!(hasher.test(Algorithm::Crc32c, "AAECA5pxu0w="), Some(true));
    }

    #[test]
    fn validation_none_builds_no_hasher() {
        assert!(ObjectHasher::for_validation(Validation::None).is_none());
    }

    #[test]
    fn partial_validation_runs_one_algorithm() {
        let mut hasher = ObjectHasher::for_validation(Validation::Crc32c).unwrap();
        hasher.update(b"hello");
        assert_eq!(hasher.digest(Algorithm::Crc32c).unwrap(), "mnG7TA==");
        assert_eq!(hasher.digest(Algorithm::Md5), None);
        assert_eq!(hasher.test(Algorithm::Md5, "XUFAKrxLKna5cZ2REBfFkg=="), None);
    }
}
