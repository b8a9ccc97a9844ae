//! Seedable linear-congruential generator used to order questions.
//!
//! The generator is a plain `Copy` value: every draw returns the next state
//! alongside the value, so a game can persist the seed and replay the exact
//! same question order later.

const MULTIPLIER: i64 = 0x5DEE_CE66D;
const INCREMENT: i64 = 11;
const MODULUS: i64 = 1 << 48;

/// Deterministic pseudo-random generator with a single 64-bit state word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRng {
    state: i64,
}

impl QuestionRng {
    /// Build a generator whose first draw is derived from `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            state: seed as i64,
        }
    }

    /// Current internal state, suitable for persisting and restoring.
    pub fn state(&self) -> i64 {
        self.state
    }

    /// Pure transition: compute the next 32-bit value and the following generator.
    pub fn advance(self) -> (i32, Self) {
        let state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT)
            % MODULUS;
        let next = Self { state };
        (next.top_bits(32), next)
    }

    /// Draw the top `bits` bits of the 48-bit state.
    pub fn next_bits(&mut self, bits: u32) -> i32 {
        let (_, next) = self.advance();
        *self = next;
        self.top_bits(bits)
    }

    /// Draw a full-width signed 32-bit value.
    pub fn next_i32(&mut self) -> i32 {
        self.next_bits(32)
    }

    /// Draw a value in `[min, max)`. Returns `min` when the range is empty.
    pub fn next_bounded(&mut self, min: i32, max: i32) -> i32 {
        let span = i64::from(max) - i64::from(min);
        if span <= 0 {
            return min;
        }
        let offset = i64::from(self.next_i32()).rem_euclid(span);
        (i64::from(min) + offset) as i32
    }

    /// Shuffle `items` in place, walking from the back.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for len in (2..=items.len()).rev() {
            let bound = i32::try_from(len).unwrap_or(i32::MAX);
            let pick = self.next_bounded(0, bound) as usize;
            items.swap(len - 1, pick);
        }
    }

    fn top_bits(&self, bits: u32) -> i32 {
        ((self.state as u64) >> (48 - bits)) as i32
    }
}
