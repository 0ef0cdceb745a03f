//! SHA-256 digests in the `sha256:<hex>` form.
use sha2::{Digest, Sha256};

const PREFIX: &str = "sha256:";

/// Digest of `content`.
#[must_use]
pub fn sha256(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{PREFIX}{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        assert_eq!(
            sha256(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn differs_on_reordering() {
        assert_ne!(sha256(b"a\nb\n"), sha256(b"b\na\n"));
    }
}
