//! Collision suffixes for cluster object names.

use std::sync::Arc;

use rand::Rng;

pub const SUFFIX_LEN: usize = 5;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of name suffixes; replaceable for deterministic tests.
pub type SuffixFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Five lowercase alphanumerics, valid inside any DNS-1123 name.
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_shape() {
        for _ in 0..64 {
            let s = random_suffix();
            assert_eq!(s.len(), SUFFIX_LEN);
            assert!(s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }
}
