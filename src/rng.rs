//! Seeded linear congruential generator driving level generation.
//!
//! Park–Miller "minimal standard" parameters: `state = state * 16807 mod (2^31 - 1)`.
//! The sequence depends only on the seed, so a level seed reproduces the same
//! level on every platform.

const MODULUS: u64 = 2_147_483_647;
const MULTIPLIER: u64 = 16_807;

#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of the recurrence.
        let state = match seed % MODULUS {
            0 => MODULUS - 1,
            s => s,
        };
        Self { state }
    }

    /// Next value in `1..MODULUS`.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state * MULTIPLIER % MODULUS;
        self.state as u32
    }

    /// Value in `0..bound`. `bound` must be non-zero.
    pub fn below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0, "empty range");
        self.next_u32() as usize % bound.max(1)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.below(items.len()))
    }

    /// Fisher–Yates shuffle.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.below(i + 1);
            slice.swap(i, j);
        }
    }
}
