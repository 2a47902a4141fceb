//! Backward-in-time coalescent simulation of ancestral recombination
//! graphs.
//!
//! The crate simulates the genealogical history of a sample of
//! chromosomes drawn from one or more interacting populations and
//! records it as a succinct tree-sequence [`TableCollection`] (nodes,
//! edges, migrations, sites, mutations, populations, individuals,
//! provenances) over a one-dimensional sequence interval.
//!
//! The centre of the crate is the event-driven kernel in [`Simulator`]:
//! extant ancestral material lives in segment chains drawn from a block
//! arena, per-population lineage indices and Fenwick mass trees drive
//! event sampling, and a clock-ordered loop mixes common-ancestor,
//! recombination, gene-conversion and migration events with a
//! deterministic queue of demographic events.  Eight interchangeable
//! coalescent models are provided (see [`SimulationModel`]).  A
//! [`MutationGenerator`] overlays a finite-state substitution process on
//! the finished tables, and [`log_arg_likelihood`] evaluates a recorded
//! ARG under the standard coalescent with recombination.
//!
//! # Examples
//!
//! ```
//! use coalsim::{RecombinationMap, Sample, SimulationConfig, Simulator};
//!
//! let mut config = SimulationConfig::new(
//!     vec![Sample::new(0, 0.0); 4],
//!     RecombinationMap::uniform(100.0, 0.01, false).unwrap(),
//! );
//! config.seed = 1234;
//! let mut sim = Simulator::new(config).unwrap();
//! assert!(sim.run_to_completion().unwrap().coalesced());
//! sim.finalise_tables().unwrap();
//! let tables = sim.into_tables();
//! assert!(tables.edges().num_rows() > 0);
//! tables.check_integrity().unwrap();
//! ```

mod _macros;

mod arena;
mod demography;
mod dtwf;
mod error;
mod fenwick;
mod flags;
mod intervalmap;
mod likelihood;
mod model;
mod mutations;
mod newtypes;
mod overlaps;
mod pedigree;
pub mod provenance;
mod recomb_map;
mod recorder;
mod simplify;
mod simulate;
mod sweep;
mod tables;

pub use demography::{DemographicEvent, DemographicEventKind, PopulationConfiguration};
pub use error::{ExitStatus, SimError};
pub use flags::{MutationOptions, NodeFlags, RawFlags, SimulationOptions};
pub use intervalmap::IntervalMap;
pub use likelihood::log_arg_likelihood;
pub use model::{ModelKind, SimulationModel};
pub use mutations::{Alphabet, MutationGenerator};
pub use newtypes::{
    EdgeId, IndividualId, MigrationId, MutationId, NodeId, PopulationId, Position, ProvenanceId,
    SiteId, Time,
};
pub use pedigree::Pedigree;
pub use recomb_map::RecombinationMap;
pub use simplify::simplify_tables;
pub use simulate::{
    AncestorSegment, EventCounters, Sample, SimulationConfig, Simulator,
};
pub use tables::{
    ColumnArray, EdgeTable, EdgeTableRow, IndividualTable, IndividualTableRow, MigrationTable,
    MigrationTableRow, MutationTable, MutationTableRow, NodeTable, NodeTableRow, PopulationTable,
    PopulationTableRow, ProvenanceTable, ProvenanceTableRow, SiteTable, SiteTableRow,
    TableCollection, TableCollectionDict, TableDict,
};
