// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Well-known host input values: the update phase and the frame clock.

/// The host's frame time, in seconds since the host was created.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default)]
pub struct Time(f64);

impl Time {
    /// Time zero.
    pub const ZERO: Self = Self(0.0);

    /// A time `seconds` after [`Time::ZERO`].
    #[must_use]
    pub const fn new(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Seconds since [`Time::ZERO`].
    #[must_use]
    pub const fn seconds(self) -> f64 {
        self.0
    }
}

/// The host's update phase.
///
/// Packed into one `u32`: the low bit records whether the subtree reading
/// the phase is being removed, the remaining bits are a counter bumped
/// whenever transient per-update caches must be discarded. Rules that
/// depend on the phase attribute re-evaluate whenever either part changes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Phase(u32);

impl Phase {
    const REMOVED_BIT: u32 = 1;

    /// The counter part of the phase.
    #[must_use]
    pub const fn reset_seed(self) -> u32 {
        self.0 >> 1
    }

    /// `true` while the reading subtree is being torn out of the tree.
    #[must_use]
    pub const fn is_being_removed(self) -> bool {
        self.0 & Self::REMOVED_BIT != 0
    }

    /// Returns the phase with the counter bumped.
    #[must_use]
    pub const fn incremented(self) -> Self {
        Self(self.0.wrapping_add(2))
    }

    /// Returns the phase with the removal flag set or cleared.
    #[must_use]
    pub const fn with_being_removed(self, removed: bool) -> Self {
        if removed {
            Self(self.0 | Self::REMOVED_BIT)
        } else {
            Self(self.0 & !Self::REMOVED_BIT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_packs_seed_and_removal_independently() {
        let phase = Phase::default();
        assert_eq!(phase.reset_seed(), 0);
        assert!(!phase.is_being_removed());

        let bumped = phase.incremented().incremented();
        assert_eq!(bumped.reset_seed(), 2);
        assert!(!bumped.is_being_removed());

        let removing = bumped.with_being_removed(true);
        assert!(removing.is_being_removed());
        assert_eq!(removing.reset_seed(), 2);
        assert_eq!(removing.with_being_removed(false), bumped);
    }

    #[test]
    fn time_is_ordered() {
        assert!(Time::new(1.5) > Time::ZERO);
        assert_eq!(Time::new(2.0).seconds(), 2.0);
    }
}
