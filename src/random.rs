use rand::{rngs::OsRng, RngCore};

/// A source of cryptographically secure random bytes.
///
/// Every layer owns its source, so tests can swap in a deterministic one
/// without touching process-wide state. Implementations must be safe to call
/// from many requests at once.
pub trait RandomSource: Send + Sync {
    /// Fills `dest` entirely or fails.
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand::Error>;
}

/// Reads from the operating system's generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_whole_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];

        OsRandom.fill(&mut a).expect("os random failed");
        OsRandom.fill(&mut b).expect("os random failed");

        assert_ne!(a, [0u8; 32]);
        assert_ne!(a, b);
    }
}
