//! Change tracking for CPU-side data mirrored in video memory.
//!
//! Voxel buffers and color maps carry a [`ChangeTracker`]. An uploaded
//! resource remembers the version it was built from and is re-uploaded once
//! the tracker has moved past it.

/// Monotonic version counter of one piece of CPU-side data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    version: u64,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one modification.
    pub fn changed(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether data uploaded at version `uploaded` is stale.
    #[must_use]
    pub fn is_newer_than(&self, uploaded: u64) -> bool {
        self.version != uploaded
    }
}

/// Write access to tracked data; records a single modification when dropped,
/// however many elements were written through it.
#[must_use]
pub struct MutGuard<'a, T> {
    data: &'a mut T,
    tracker: &'a mut ChangeTracker,
}

impl<'a, T> MutGuard<'a, T> {
    pub(crate) fn new(data: &'a mut T, tracker: &'a mut ChangeTracker) -> Self {
        Self { data, tracker }
    }
}

impl<T> std::ops::Deref for MutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data
    }
}

impl<T> std::ops::DerefMut for MutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}

impl<T> Drop for MutGuard<'_, T> {
    fn drop(&mut self) {
        self.tracker.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_counts_as_one_change() {
        let mut data = vec![0_u8; 4];
        let mut tracker = ChangeTracker::new();
        {
            let mut guard = MutGuard::new(&mut data, &mut tracker);
            guard[0] = 1;
            guard[3] = 2;
        }
        assert_eq!(tracker.version(), 1);
        assert!(tracker.is_newer_than(0));
        assert!(!tracker.is_newer_than(1));
        assert_eq!(data, [1, 0, 0, 2]);
    }
}
