//! Injectable random source for the priority-rollout decision.
//!
//! The naive "fetch manifest, compare version, update" flow has no room for staged
//! rollouts. This trait lets the priority check draw from a `rand`-backed source in
//! production while tests inject a fixed draw, the same kind of injectable-strategy
//! pattern `upgrade::self_updater`'s `ChecksumPolicy` enum already uses.

use rand::Rng;

/// Produces a uniform value in `[0, 100)` used to compare against a manifest's
/// rollout `priority`.
pub trait RandomSource: Send + Sync {
    /// Draw a fresh uniform value in `[0, 100)`.
    fn next_priority_roll(&self) -> u8;
}

/// The production random source, backed by the thread-local `rand` RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn next_priority_roll(&self) -> u8 {
        rand::thread_rng().gen_range(0..100)
    }
}

/// A deterministic test double that always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u8);

impl RandomSource for FixedRandom {
    fn next_priority_roll(&self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_random_always_returns_same_value() {
        let source = FixedRandom(42);
        assert_eq!(source.next_priority_roll(), 42);
        assert_eq!(source.next_priority_roll(), 42);
    }

    #[test]
    fn system_random_stays_in_range() {
        let source = SystemRandom;
        for _ in 0..100 {
            assert!(source.next_priority_roll() < 100);
        }
    }
}
