use crate::constants::HIGH_LOAD_COUNTER;

/// Saturating up/down counter tracking how long load has stayed high.
///
/// Each sample at or above the threshold adds one (capped at
/// [`HIGH_LOAD_COUNTER`]), each sample below it removes one (floored at 0).
/// Decisions look at a lower crossing point, so short spikes and dips
/// don't flip the core on and off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounter {
    value: u8,
}

impl LoadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, load: u32, threshold: u32) -> u8 {
        if load >= threshold {
            if self.value < HIGH_LOAD_COUNTER {
                self.value += 1;
            }
        } else {
            self.value = self.value.saturating_sub(1);
        }
        self.value
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up_on_high_load() {
        let mut c = LoadCounter::new();
        assert_eq!(c.update(60, 55), 1);
        assert_eq!(c.update(55, 55), 2);
    }

    #[test]
    fn floors_at_zero() {
        let mut c = LoadCounter::new();
        assert_eq!(c.update(0, 55), 0);
        c.update(90, 55);
        assert_eq!(c.update(10, 55), 0);
        assert_eq!(c.update(10, 55), 0);
    }

    #[test]
    fn saturates_at_high_load_counter() {
        let mut c = LoadCounter::new();
        for _ in 0..50 {
            c.update(100, 55);
        }
        assert_eq!(c.value(), HIGH_LOAD_COUNTER);
        assert_eq!(c.update(54, 55), HIGH_LOAD_COUNTER - 1);
    }

    #[test]
    fn stays_in_bounds_for_mixed_sequences() {
        let mut c = LoadCounter::new();
        // deterministic pseudo-random loads
        let mut x: u32 = 0x2545_f491;
        for _ in 0..10_000 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            let v = c.update(x % 101, 55);
            assert!(v <= HIGH_LOAD_COUNTER);
        }
    }

    #[test]
    fn reset_clears() {
        let mut c = LoadCounter::new();
        c.update(99, 1);
        c.reset();
        assert_eq!(c.value(), 0);
    }
}
