//! Bit flags for node rows and simulator options.

use bitflags::bitflags;

/// The raw integer type behind all flag newtypes.
pub type RawFlags = u32;

macro_rules! flag_builder_api {
    ($(#[$attr:meta])* => $name: ident, $flag: ident) => {
        $(#[$attr])*
        pub fn $name(self) -> Self {
            self | Self::$flag
        }
    };
}

bitflags! {
    /// Node flags
    ///
    /// Sample status plus the event-kind bits recorded when the simulator
    /// retains the complete ancestral recombination graph.
    ///
    /// # Examples
    ///
    /// ## Default (empty) flags
    ///
    /// ```
    /// # use coalsim::NodeFlags;
    /// let f = NodeFlags::default();
    /// assert_eq!(f, NodeFlags::NONE);
    /// ```
    ///
    /// ## Create a sample node
    ///
    /// Creating a sample node is such a common task that it is supported
    /// via a constructor:
    ///
    /// ```
    /// # use coalsim::NodeFlags;
    /// let f = NodeFlags::new_sample();
    /// assert_eq!(f, NodeFlags::IS_SAMPLE);
    /// ```
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(transparent)]
    pub struct NodeFlags : RawFlags {
        /// Default (empty)
        const NONE = 0;
        /// Node is a sample
        const IS_SAMPLE = 1;
        /// Node records a common-ancestor event
        const IS_CA_EVENT = 1 << 17;
        /// Node records one side of a recombination event
        const IS_RE_EVENT = 1 << 18;
        /// Node records a migration event
        const IS_MIG_EVENT = 1 << 19;
        /// Node records a census snapshot
        const IS_CEN_EVENT = 1 << 20;
    }
}

impl NodeFlags {
    /// Create a new flags instance with `IS_SAMPLE` set.
    pub fn new_sample() -> Self {
        Self::default().mark_sample()
    }

    flag_builder_api!(
        /// Set [`IS_SAMPLE`](NodeFlags::IS_SAMPLE)
        => mark_sample, IS_SAMPLE);

    flag_builder_api!(
        /// Set [`IS_CA_EVENT`](NodeFlags::IS_CA_EVENT)
        => mark_ca_event, IS_CA_EVENT);

    flag_builder_api!(
        /// Set [`IS_RE_EVENT`](NodeFlags::IS_RE_EVENT)
        => mark_re_event, IS_RE_EVENT);

    flag_builder_api!(
        /// Set [`IS_MIG_EVENT`](NodeFlags::IS_MIG_EVENT)
        => mark_mig_event, IS_MIG_EVENT);

    flag_builder_api!(
        /// Set [`IS_CEN_EVENT`](NodeFlags::IS_CEN_EVENT)
        => mark_census_event, IS_CEN_EVENT);

    /// Returns `true` if flags contains `IS_SAMPLE`.
    pub fn is_sample(&self) -> bool {
        self.contains(NodeFlags::IS_SAMPLE)
    }
}

impl From<RawFlags> for NodeFlags {
    fn from(flags: RawFlags) -> Self {
        Self::from_bits_retain(flags)
    }
}

bitflags! {
    /// Modify behavior of [`Simulator`](crate::Simulator) construction.
    ///
    /// # Examples
    ///
    /// ```
    /// # use coalsim::SimulationOptions;
    /// let f = SimulationOptions::default().store_migrations().store_full_arg();
    /// assert!(f.contains(SimulationOptions::STORE_MIGRATIONS));
    /// assert!(f.contains(SimulationOptions::STORE_FULL_ARG));
    /// ```
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(transparent)]
    pub struct SimulationOptions : RawFlags {
        /// Default behavior
        const NONE = 0;
        /// Emit a migration record for every segment of a migrating lineage.
        const STORE_MIGRATIONS = 1;
        /// Record flagged nodes and unary edges for recombination,
        /// non-coalescing common-ancestor and migration events, preserving
        /// the complete ancestral recombination graph.
        const STORE_FULL_ARG = 1 << 1;
    }
}

impl SimulationOptions {
    flag_builder_api!(
        /// Set [`STORE_MIGRATIONS`](SimulationOptions::STORE_MIGRATIONS)
        => store_migrations, STORE_MIGRATIONS);

    flag_builder_api!(
        /// Set [`STORE_FULL_ARG`](SimulationOptions::STORE_FULL_ARG)
        => store_full_arg, STORE_FULL_ARG);
}

impl From<RawFlags> for SimulationOptions {
    fn from(flags: RawFlags) -> Self {
        Self::from_bits_retain(flags)
    }
}

bitflags! {
    /// Modify behavior of [`MutationGenerator::generate`](crate::MutationGenerator::generate).
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(transparent)]
    pub struct MutationOptions : RawFlags {
        /// Default behavior: discard pre-existing sites and mutations.
        const NONE = 0;
        /// Preserve pre-existing sites and mutations, interleaving the new
        /// mutations in parent order.
        const KEEP_SITES = 1;
    }
}

impl MutationOptions {
    flag_builder_api!(
        /// Set [`KEEP_SITES`](MutationOptions::KEEP_SITES)
        => keep_sites, KEEP_SITES);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_looks_like_zero() {
        let n = NodeFlags::default();
        assert_eq!(n.bits(), 0);
        assert!(n.contains(NodeFlags::NONE));
        let s = SimulationOptions::default();
        assert_eq!(s.bits(), 0);
    }

    #[test]
    fn node_is_not_sample() {
        let n = NodeFlags::default();
        assert!(!n.is_sample());
    }

    #[test]
    fn node_is_sample() {
        let n = NodeFlags::new_sample();
        assert!(n.is_sample());
    }

    #[test]
    fn event_flags_are_disjoint() {
        let all = NodeFlags::IS_CA_EVENT
            | NodeFlags::IS_RE_EVENT
            | NodeFlags::IS_MIG_EVENT
            | NodeFlags::IS_CEN_EVENT;
        assert_eq!(all.bits().count_ones(), 4);
        assert!(!all.is_sample());
    }
}
