use serde::{Deserialize, Serialize};

/// Cyclic sequence-number range `[0, length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSpace {
    length: u32,
}

impl SequenceSpace {
    /// `length` must be non-zero; [`crate::WindowConfig`] enforces this.
    pub fn new(length: u32) -> Self {
        debug_assert!(length > 0, "sequence space must not be empty");
        Self { length }
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn contains(&self, number: u32) -> bool {
        number < self.length
    }

    /// The number following `number`, wrapping at the end of the range.
    pub fn next(&self, number: u32) -> u32 {
        self.cyclic_shift(number, 1)
    }

    /// `(number + shift) mod length`, always non-negative.
    pub fn cyclic_shift(&self, number: u32, shift: i64) -> u32 {
        let modulo = i64::from(self.length);
        (i64::from(number) + shift).rem_euclid(modulo) as u32
    }

    /// Position of `number` relative to `window_start`.
    pub fn position(&self, number: u32, window_start: u32) -> u32 {
        self.cyclic_shift(number, -i64::from(window_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_wraps_at_length() {
        let space = SequenceSpace::new(5);
        assert_eq!(space.next(0), 1);
        assert_eq!(space.next(3), 4);
        assert_eq!(space.next(4), 0);
    }

    #[test]
    fn negative_shift_is_normalized() {
        let space = SequenceSpace::new(8);
        assert_eq!(space.cyclic_shift(2, -3), 7);
        assert_eq!(space.cyclic_shift(0, -8), 0);
        assert_eq!(space.cyclic_shift(0, -17), 7);
    }

    #[test]
    fn position_relative_to_window_start() {
        let space = SequenceSpace::new(5);
        assert_eq!(space.position(3, 3), 0);
        assert_eq!(space.position(0, 3), 2);
        // one behind the window start lands at the far end
        assert_eq!(space.position(2, 3), 4);
    }

    #[test]
    fn single_number_space() {
        let space = SequenceSpace::new(1);
        assert_eq!(space.next(0), 0);
        assert!(space.contains(0));
        assert!(!space.contains(1));
    }
}
