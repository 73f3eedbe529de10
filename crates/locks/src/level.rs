//! Lock level classification.
//!
//! A lock level is a small bitmask: one base bit (`READ`, `WRITE`,
//! `CONCURRENT`) plus an orthogonal `GREEDY` modifier. Which levels may be
//! held together is decided by the lock manager, not here.

use std::fmt;

bitflags::bitflags! {
    /// Requested or held lock level.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LockLevel: u8 {
        /// Shared read access.
        const READ = 1;
        /// Exclusive write access.
        const WRITE = 1 << 1;
        /// Concurrent access without mutual exclusion.
        const CONCURRENT = 1 << 2;
        /// Retained by the holder across uses without re-requesting.
        const GREEDY = 1 << 7;
    }
}

impl LockLevel {
    /// Level with no bits set.
    pub const NIL: Self = Self::empty();

    /// Interpret a raw integer level. Values `<= 0` carry no level.
    ///
    /// # Panics
    ///
    /// Panics if `raw` sets bits outside `READ | WRITE | CONCURRENT | GREEDY`.
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        if raw <= 0 {
            return Self::NIL;
        }
        u8::try_from(raw)
            .ok()
            .and_then(Self::from_bits)
            .unwrap_or_else(|| panic!("invalid lock level {raw:#x}"))
    }

    /// Raw integer form
    #[must_use]
    pub fn to_raw(self) -> i32 {
        i32::from(self.bits())
    }

    /// Whether the READ bit is set
    #[must_use]
    pub const fn is_read(self) -> bool {
        self.contains(Self::READ)
    }

    /// Whether the WRITE bit is set
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Whether the CONCURRENT bit is set
    #[must_use]
    pub const fn is_concurrent(self) -> bool {
        self.contains(Self::CONCURRENT)
    }

    /// Whether the GREEDY modifier is set
    #[must_use]
    pub const fn is_greedy(self) -> bool {
        self.contains(Self::GREEDY)
    }

    /// True only for exactly `READ`, `WRITE` or `CONCURRENT`.
    #[must_use]
    pub fn is_discrete(self) -> bool {
        self == Self::READ || self == Self::WRITE || self == Self::CONCURRENT
    }

    /// Base level with the GREEDY modifier stripped
    #[must_use]
    pub const fn base(self) -> Self {
        self.difference(Self::GREEDY)
    }

    /// Set the GREEDY modifier.
    #[must_use]
    pub const fn make_greedy(self) -> Self {
        self.union(Self::GREEDY)
    }

    /// Clear the GREEDY modifier. Levels without it are returned unchanged.
    #[must_use]
    pub const fn make_not_greedy(self) -> Self {
        self.difference(Self::GREEDY)
    }

    /// Flip the GREEDY modifier.
    ///
    /// Only meaningful when the caller knows GREEDY is set: on a non-greedy
    /// level this *sets* the bit. Prefer [`Self::make_not_greedy`].
    #[must_use]
    pub const fn toggle_greedy_unchecked(self) -> Self {
        self.symmetric_difference(Self::GREEDY)
    }
}

impl fmt::Debug for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockLevel({self})")
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NIL");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("|"))
    }
}
