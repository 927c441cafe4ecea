//! CSPRNG byte generation, used for DEKs, IVs, transfer tokens, refresh
//! tokens, and anything else that needs unguessable bytes.

use rand::RngCore;

/// Returns `n` cryptographically random bytes from the OS CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(32).len(), 32);
        assert_eq!(random_bytes(0).len(), 0);
    }

    #[test]
    fn test_random_bytes_are_not_constant() {
        let a = random_bytes(32);
        let b = random_bytes(32);
        assert_ne!(a, b);
    }
}
