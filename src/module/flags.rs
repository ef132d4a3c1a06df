//! Module state bits

use bitflags::bitflags;

bitflags! {
    /// Independent state bits carried by every module record
    ///
    /// Combine with bitwise OR: `StateFlags::RESOLVED | StateFlags::SINGLETON`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFlags: u32 {
        /// Module has been resolved
        const RESOLVED           = 1 << 0;
        /// Only one module with this name may resolve
        const SINGLETON          = 1 << 1;
        /// Module has been removed but something may still depend on it
        const REMOVAL_PENDING    = 1 << 2;
        /// Facet bundle is present in memory
        const FULLY_LOADED       = 1 << 3;
        /// Facet bundle is owned by a backing store and may be evicted
        const LAZY_LOADED        = 1 << 4;
        /// At least one declared import uses dynamic resolution
        const HAS_DYNAMIC_IMPORT = 1 << 5;
        /// Fragments may attach to this module
        const ATTACH_FRAGMENTS   = 1 << 6;
        /// Fragments may attach after this module resolved
        const DYNAMIC_FRAGMENTS  = 1 << 7;
    }
}

impl Default for StateFlags {
    /// Freshly constructed, not yet persisted module
    fn default() -> Self {
        Self::FULLY_LOADED | Self::ATTACH_FRAGMENTS | Self::DYNAMIC_FRAGMENTS
    }
}

impl StateFlags {
    /// Initial bits for a module summary loaded from a backing store
    pub fn lazy() -> Self {
        (Self::default() - Self::FULLY_LOADED) | Self::LAZY_LOADED
    }

    /// Check if the module is resolved
    pub fn is_resolved(&self) -> bool {
        self.contains(Self::RESOLVED)
    }

    /// Check if the bundle may be evicted right now
    pub fn is_evictable(&self) -> bool {
        self.contains(Self::LAZY_LOADED | Self::FULLY_LOADED)
    }

    /// Check if a getter has to hydrate before reading
    pub fn needs_hydration(&self) -> bool {
        self.contains(Self::LAZY_LOADED) && !self.contains(Self::FULLY_LOADED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bits() {
        let flags = StateFlags::default();
        assert!(flags.contains(StateFlags::FULLY_LOADED));
        assert!(flags.contains(StateFlags::ATTACH_FRAGMENTS | StateFlags::DYNAMIC_FRAGMENTS));
        assert!(!flags.is_resolved());
        assert!(!flags.contains(StateFlags::LAZY_LOADED));
    }

    #[test]
    fn test_lazy_bits() {
        let flags = StateFlags::lazy();
        assert!(flags.needs_hydration());
        assert!(!flags.is_evictable());
        assert!((flags | StateFlags::FULLY_LOADED).is_evictable());
    }
}
