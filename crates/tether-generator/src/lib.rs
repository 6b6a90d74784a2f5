//! Short code generation.
//!
//! Generators are pure: the caller owns the entropy source and is
//! responsible for rejecting codes that collide with existing ones.

use jiff::Timestamp;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tether_core::ShortCode;
use typed_builder::TypedBuilder;

/// Length of codes minted when no other length is configured.
pub const DEFAULT_CODE_LENGTH: usize = 7;

const LETTERS: u8 = 26;
/// Codepoints between `Z` and `a` that are not letters.
const GAP_BETWEEN_CASES: u8 = b'a' - b'Z' - 1;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
pub trait Generator: Send + Sync + 'static {
    /// Draws a candidate code from the given entropy source.
    ///
    /// The candidate is not guaranteed to be unique.
    fn generate(&self, rng: &mut dyn RngCore) -> ShortCode;
}

/// Generates fixed-length codes of upper and lower case ASCII letters.
#[derive(Debug, Clone, TypedBuilder)]
pub struct AlphabeticGenerator {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    length: usize,
}

impl AlphabeticGenerator {
    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for AlphabeticGenerator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Generator for AlphabeticGenerator {
    fn generate(&self, rng: &mut dyn RngCore) -> ShortCode {
        ShortCode::new_unchecked(random_letters(self.length, rng))
    }
}

/// Returns `length` letters drawn uniformly from `A-Z` and `a-z`.
pub fn random_letters<R: RngCore + ?Sized>(length: usize, rng: &mut R) -> String {
    (0..length)
        .map(|_| {
            let mut offset = rng.random_range(0..LETTERS * 2);
            if offset >= LETTERS {
                offset += GAP_BETWEEN_CASES;
            }
            char::from(b'A' + offset)
        })
        .collect()
}

/// Builds the entropy source for one create call.
///
/// An explicit seed gives reproducible codes; otherwise the source is
/// seeded from the wall clock.
pub fn entropy(seed: Option<u64>) -> StdRng {
    // Only the low 64 bits of the nanosecond clock feed the seed.
    let seed = seed.unwrap_or_else(|| Timestamp::now().as_nanosecond() as u64);
    StdRng::seed_from_u64(seed)
}
