//! Structural reference counter carried by every node.
//!
//! The counter only tracks edges coming from other nodes. The single external reference held by
//! whoever owns a root is tracked separately (see [`Root`](crate::graph::Root)).

/// Number of live parent edges pointing into a node.
///
/// A decrement that would go below zero is refused and reported by
/// [`decrement`](Self::decrement) instead of being stored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefCount(u32);

/// Returned by [`RefCount::decrement`] when the counter is already zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Underflow;

impl RefCount {
    pub const ZERO: RefCount = RefCount(0);

    #[inline]
    pub fn new(count: u32) -> Self {
        RefCount(count)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Add one edge. Saturates at `u32::MAX`, which no acyclic graph can reach in practice.
    #[inline]
    pub fn increment(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    /// Remove one edge, returning the new count. The counter is left untouched on underflow.
    #[inline]
    pub fn decrement(&mut self) -> Result<u32, Underflow> {
        match self.0.checked_sub(1) {
            Some(count) => {
                self.0 = count;
                Ok(count)
            }
            None => Err(Underflow),
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RefCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_and_decrements_pair_up() {
        let mut rc = RefCount::default();
        assert!(rc.is_zero());
        assert_eq!(rc.increment(), 1);
        assert_eq!(rc.increment(), 2);
        assert_eq!(rc.decrement(), Ok(1));
        assert_eq!(rc.decrement(), Ok(0));
        assert!(rc.is_zero());
    }

    #[test]
    fn decrement_below_zero_is_refused() {
        let mut rc = RefCount::ZERO;
        assert_eq!(rc.decrement(), Err(Underflow));
        assert_eq!(rc.get(), 0);
        assert!(rc.is_zero());
    }

    #[test]
    fn increment_saturates() {
        let mut rc = RefCount::new(u32::MAX);
        assert_eq!(rc.increment(), u32::MAX);
        assert_eq!(rc.to_string(), u32::MAX.to_string());
    }
}
