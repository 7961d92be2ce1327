//! Subscription id generation and validation.

use rand::Rng;

/// Alphabet for generated subscription ids, exactly these 60 characters:
/// `A`..`W`, `a`..`z`, `0`..`9` and `_`.
pub const SUBID_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWabcdefghijklmnopqrstuvwxyz0123456789_";

/// Length of generated ids, comfortably above [`MIN_SUBID_LEN`].
pub const SUBID_LEN: usize = 38;

/// Minimum length accepted anywhere for a subscription id.
pub const MIN_SUBID_LEN: usize = 32;

/// Generates a fresh random subscription id.
pub fn generate() -> String {
    let alphabet = SUBID_ALPHABET.as_bytes();
    let mut rng = rand::thread_rng();

    (0..SUBID_LEN)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_is_exact() {
        assert_eq!(SUBID_ALPHABET.len(), 60);
        assert!(!SUBID_ALPHABET.contains('X'));
        assert!(!SUBID_ALPHABET.contains('Y'));
        assert!(!SUBID_ALPHABET.contains('Z'));
        assert!(SUBID_ALPHABET.contains('W'));
        assert!(SUBID_ALPHABET.contains('_'));
    }

    #[test]
    fn generated_length_and_alphabet() {
        let id = generate();
        assert_eq!(id.len(), SUBID_LEN);
        assert!(id.len() >= MIN_SUBID_LEN);
        assert!(id.chars().all(|c| SUBID_ALPHABET.contains(c)));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(generate(), generate());
    }
}
