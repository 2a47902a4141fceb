//! The event-driven simulation kernel.
//!
//! [`Simulator`] owns all per-replicate state: the segment arena, the
//! per-(population, label) lineage indices, the Fenwick mass indices, the
//! overlap counter that detects full coalescence, the recorder, and the
//! output tables.  [`Simulator::run`] drives the clock forward, mixing
//! stochastic events from the active model with the deterministic
//! demographic queue.

use std::collections::{BTreeSet, BinaryHeap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta as BetaDistribution, Binomial, Distribution, Exp1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arena::{Arena, Segment, SegmentIndex};
use crate::demography::{
    validate_demographic_events, validate_migration_matrix, validate_population_configurations,
    DemographicEvent, DemographicEventKind, PopulationConfiguration, PopulationParams,
};
use crate::fenwick::FenwickTree;
use crate::model::{ModelKind, SimulationModel};
use crate::overlaps::OverlapCounter;
use crate::pedigree::Pedigree;
use crate::recomb_map::RecombinationMap;
use crate::recorder::Recorder;
use crate::tables::TableCollection;
use crate::{ExitStatus, IndividualId, NodeFlags, NodeId, PopulationId, SimError, SimulationOptions};

/// One sampled chromosome: the population it is drawn from and the time
/// at which it joins the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub population: i32,
    #[serde(default)]
    pub time: f64,
}

impl Sample {
    pub fn new(population: i32, time: f64) -> Self {
        Self { population, time }
    }
}

/// Everything needed to build a [`Simulator`].
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub samples: Vec<Sample>,
    pub recombination_map: RecombinationMap,
    pub population_configurations: Vec<PopulationConfiguration>,
    /// Row-major `P x P`; the diagonal is ignored.
    pub migration_matrix: Vec<f64>,
    /// Must be sorted by time.
    pub demographic_events: Vec<DemographicEvent>,
    pub model: SimulationModel,
    pub gene_conversion_rate: f64,
    pub gene_conversion_track_length: f64,
    pub start_time: f64,
    pub options: SimulationOptions,
    pub segment_block_size: usize,
    pub max_segment_blocks: Option<usize>,
    /// Required by (and only valid for) the `wf_ped` model.
    pub pedigree: Option<Pedigree>,
    pub seed: u64,
}

impl SimulationConfig {
    /// A single-population Hudson configuration with no recombination
    /// beyond what `recombination_map` carries.
    pub fn new(samples: Vec<Sample>, recombination_map: RecombinationMap) -> Self {
        Self {
            samples,
            recombination_map,
            population_configurations: vec![PopulationConfiguration::new(1.0, 0.0)],
            migration_matrix: vec![0.0],
            demographic_events: Vec::new(),
            model: SimulationModel::hudson(1.0),
            gene_conversion_rate: 0.0,
            gene_conversion_track_length: 1.0,
            start_time: 0.0,
            options: SimulationOptions::NONE,
            segment_block_size: 1024,
            max_segment_blocks: None,
            pedigree: None,
            seed: 1,
        }
    }
}

/// Per-kind event counts, exposed for introspection and testing.
#[derive(Clone, Debug, Default)]
pub struct EventCounters {
    pub num_common_ancestor_events: u64,
    pub num_rejected_common_ancestor_events: u64,
    pub num_recombination_events: u64,
    pub num_gene_conversion_events: u64,
    pub num_multiple_recombination_events: u64,
    /// Row-major `P x P`, indexed `source * P + dest`.
    pub num_migration_events: Vec<u64>,
}

/// A snapshot of one extant ancestral segment, for introspection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AncestorSegment {
    pub left: f64,
    pub right: f64,
    pub node: NodeId,
    pub population: PopulationId,
}

#[derive(Clone, Debug)]
pub(crate) struct PopulationState {
    pub params: PopulationParams,
    /// Chain heads per label.
    pub lineages: Vec<Vec<SegmentIndex>>,
}

impl PopulationState {
    fn new(params: PopulationParams, num_labels: usize) -> Self {
        Self {
            params,
            lineages: vec![Vec::new(); num_labels],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum StochasticEvent {
    CommonAncestor { population: usize },
    Recombination { label: usize },
    GeneConversion { label: usize },
    Migration { source: usize, dest: usize },
}

#[derive(Clone, Debug)]
pub(crate) struct SamplingEvent {
    pub time: f64,
    pub node: NodeId,
    pub population: usize,
}

pub(crate) use crate::sweep::SweepState;

/// The backward-in-time coalescent simulator.
///
/// # Examples
///
/// ```
/// use coalsim::{RecombinationMap, Sample, SimulationConfig, Simulator};
///
/// let mut config = SimulationConfig::new(
///     vec![Sample::new(0, 0.0), Sample::new(0, 0.0)],
///     RecombinationMap::uniform(1.0, 0.0, false).unwrap(),
/// );
/// config.seed = 42;
/// let mut sim = Simulator::new(config).unwrap();
/// let status = sim.run_to_completion().unwrap();
/// assert!(status.coalesced());
/// assert_eq!(sim.tables().nodes().num_rows(), 3);
/// ```
#[derive(Debug)]
pub struct Simulator {
    pub(crate) config: SimulationConfig,
    pub(crate) rng: StdRng,
    pub(crate) time: f64,
    pub(crate) num_labels: usize,
    pub(crate) tables: TableCollection,
    pub(crate) recorder: Recorder,
    pub(crate) arena: Arena<Segment>,
    pub(crate) recomb_mass: Vec<FenwickTree>,
    pub(crate) gc_mass: Vec<FenwickTree>,
    pub(crate) populations: Vec<PopulationState>,
    pub(crate) migration_matrix: Vec<f64>,
    pub(crate) next_demographic_event: usize,
    pub(crate) sampling_events: Vec<SamplingEvent>,
    pub(crate) next_sampling_event: usize,
    pub(crate) counters: EventCounters,
    pub(crate) breakpoints: BTreeSet<u64>,
    pub(crate) overlaps: OverlapCounter,
    pub(crate) sweep: Option<SweepState>,
    pub(crate) pedigree_cursor: usize,
    pub(crate) pedigree_slots: Vec<Vec<Vec<SegmentIndex>>>,
    pub(crate) errored: bool,
}

impl Simulator {
    /// Validate `config` and build a simulator in its initial state.
    ///
    /// # Errors
    ///
    /// [`SimError::Input`] describing the offending configuration
    /// section; no partial state survives a failure.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        Self::validate_config(&config)?;
        let sequence_length = config.recombination_map.sequence_length();
        let num_populations = config.population_configurations.len();
        let num_labels = match config.model.kind() {
            ModelKind::Sweep => 2,
            _ => 1,
        };
        let num_sample_chromosomes = match (&config.pedigree, config.model.kind()) {
            (Some(p), ModelKind::Pedigree) => p.num_samples() * p.ploidy,
            _ => config.samples.len(),
        };
        let rng = StdRng::seed_from_u64(config.seed);
        let mut sim = Self {
            rng,
            time: config.start_time,
            num_labels,
            tables: TableCollection::new(sequence_length)?,
            recorder: Recorder::default(),
            arena: Arena::new(config.segment_block_size, config.max_segment_blocks),
            recomb_mass: vec![FenwickTree::new(); num_labels],
            gc_mass: vec![FenwickTree::new(); num_labels],
            populations: Vec::with_capacity(num_populations),
            migration_matrix: config.migration_matrix.clone(),
            next_demographic_event: 0,
            sampling_events: Vec::new(),
            next_sampling_event: 0,
            counters: EventCounters {
                num_migration_events: vec![0; num_populations * num_populations],
                ..Default::default()
            },
            breakpoints: BTreeSet::new(),
            overlaps: OverlapCounter::new(sequence_length, num_sample_chromosomes as u32),
            sweep: None,
            pedigree_cursor: 0,
            pedigree_slots: Vec::new(),
            errored: false,
            config,
        };
        sim.init_state()?;
        Ok(sim)
    }

    fn validate_config(config: &SimulationConfig) -> Result<(), SimError> {
        let sequence_length = config.recombination_map.sequence_length();
        config.model.validate(sequence_length)?;
        validate_population_configurations(&config.population_configurations)?;
        let num_populations = config.population_configurations.len();
        validate_migration_matrix(&config.migration_matrix, num_populations)?;
        validate_demographic_events(
            &config.demographic_events,
            num_populations,
            config.start_time,
        )?;
        if config.samples.len() < 2 {
            return Err(input_error!("samples", "at least two samples required"));
        }
        for (j, s) in config.samples.iter().enumerate() {
            if s.population < 0 || s.population as usize >= num_populations {
                return Err(input_error!(
                    "samples",
                    "sample {} has population {} out of range",
                    j,
                    s.population
                ));
            }
            if !(s.time >= 0.0) || !s.time.is_finite() {
                return Err(input_error!("samples", "sample {} has invalid time", j));
            }
        }
        if !(config.start_time >= 0.0) || !config.start_time.is_finite() {
            return Err(input_error!("start time", "must be finite and non-negative"));
        }
        if !(config.gene_conversion_rate >= 0.0) {
            return Err(input_error!(
                "gene conversion",
                "rate must be non-negative"
            ));
        }
        if config.gene_conversion_rate > 0.0 {
            if !(config.gene_conversion_track_length >= 1.0) {
                return Err(input_error!(
                    "gene conversion",
                    "track length must be at least 1"
                ));
            }
            if config.model.kind() != ModelKind::Continuous {
                return Err(input_error!(
                    "gene conversion",
                    "only supported under continuous-time models"
                ));
            }
        }
        if config.options.contains(SimulationOptions::STORE_FULL_ARG) {
            if config.model.kind() != ModelKind::Continuous {
                return Err(input_error!(
                    "simulation model",
                    "full ARG recording requires a continuous-time model"
                ));
            }
            if config.gene_conversion_rate > 0.0 {
                return Err(input_error!(
                    "gene conversion",
                    "full ARG recording does not support gene conversion"
                ));
            }
        }
        match config.model.kind() {
            ModelKind::Pedigree => {
                let ped = config
                    .pedigree
                    .as_ref()
                    .ok_or_else(|| input_error!("pedigree", "the wf_ped model requires a pedigree"))?;
                if num_populations != 1 {
                    return Err(input_error!(
                        "pedigree",
                        "the wf_ped model supports a single population"
                    ));
                }
                if !config.demographic_events.is_empty() {
                    return Err(input_error!(
                        "pedigree",
                        "demographic events are not supported with wf_ped"
                    ));
                }
                if config.samples.len() != ped.num_samples() * ped.ploidy {
                    return Err(input_error!(
                        "pedigree",
                        "expected {} samples for {} sample individuals of ploidy {}",
                        ped.num_samples() * ped.ploidy,
                        ped.num_samples(),
                        ped.ploidy
                    ));
                }
            }
            ModelKind::Sweep => {
                if num_populations != 1 {
                    return Err(input_error!(
                        "sweep genic selection",
                        "the sweep model supports a single population"
                    ));
                }
            }
            _ => {
                if config.pedigree.is_some() {
                    return Err(input_error!(
                        "pedigree",
                        "a pedigree is only valid with the wf_ped model"
                    ));
                }
            }
        }
        Ok(())
    }

    // Build all per-replicate state.  Also the reset path.
    fn init_state(&mut self) -> Result<(), SimError> {
        let sequence_length = self.sequence_length();
        self.time = self.config.start_time;
        self.tables.clear();
        self.recorder.clear();
        self.arena.clear();
        for f in self.recomb_mass.iter_mut().chain(self.gc_mass.iter_mut()) {
            *f = FenwickTree::new();
        }
        self.populations = self
            .config
            .population_configurations
            .iter()
            .map(|c| {
                PopulationState::new(
                    PopulationParams::from_config(c, self.config.start_time),
                    self.num_labels,
                )
            })
            .collect();
        self.migration_matrix = self.config.migration_matrix.clone();
        self.next_demographic_event = 0;
        self.sampling_events.clear();
        self.next_sampling_event = 0;
        let num_populations = self.populations.len();
        self.counters = EventCounters {
            num_migration_events: vec![0; num_populations * num_populations],
            ..Default::default()
        };
        self.breakpoints.clear();
        self.errored = false;
        self.sweep = None;
        self.pedigree_cursor = 0;
        self.pedigree_slots.clear();

        for _ in 0..num_populations {
            self.tables.add_population();
        }

        if self.config.model.kind() == ModelKind::Pedigree {
            self.init_pedigree_state()?;
            let n = self.config.pedigree.as_ref().unwrap();
            self.overlaps =
                OverlapCounter::new(sequence_length, (n.num_samples() * n.ploidy) as u32);
        } else {
            self.overlaps =
                OverlapCounter::new(sequence_length, self.config.samples.len() as u32);
            // Sample nodes are rows 0..n in sample order; lineages for
            // samples not yet alive become sampling events.
            let samples = self.config.samples.clone();
            let mut delayed: Vec<SamplingEvent> = Vec::new();
            for s in &samples {
                let node = self.tables.add_node(
                    NodeFlags::new_sample(),
                    s.time,
                    PopulationId::from(s.population),
                    IndividualId::NULL,
                )?;
                if s.time <= self.config.start_time {
                    self.insert_sample_lineage(node, s.population as usize)?;
                } else {
                    delayed.push(SamplingEvent {
                        time: s.time,
                        node,
                        population: s.population as usize,
                    });
                }
            }
            delayed.sort_by(|a, b| {
                a.time
                    .partial_cmp(&b.time)
                    .unwrap()
                    .then(a.node.cmp(&b.node))
            });
            self.sampling_events = delayed;
        }

        if self.config.model.kind() == ModelKind::Sweep {
            self.sweep = Some(SweepState::from_model(&self.config.model));
        }
        debug!(
            model = self.config.model.name(),
            samples = self.config.samples.len(),
            populations = num_populations,
            "simulation initialised"
        );
        Ok(())
    }

    /// Reset all per-replicate state; the configuration and the random
    /// generator state are kept.
    pub fn reset(&mut self) -> Result<(), SimError> {
        debug!("simulation reset");
        self.init_state()
    }

    pub fn sequence_length(&self) -> f64 {
        self.config.recombination_map.sequence_length()
    }

    /// The current simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn model(&self) -> &SimulationModel {
        &self.config.model
    }

    pub fn num_populations(&self) -> usize {
        self.populations.len()
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn store_migrations(&self) -> bool {
        self.config
            .options
            .contains(SimulationOptions::STORE_MIGRATIONS)
    }

    pub(crate) fn store_full_arg(&self) -> bool {
        self.config
            .options
            .contains(SimulationOptions::STORE_FULL_ARG)
    }

    /// Number of extant lineages across all populations and labels,
    /// including lineages queued on pedigree chromosome slots.
    pub fn num_ancestors(&self) -> usize {
        let indexed: usize = self
            .populations
            .iter()
            .map(|p| p.lineages.iter().map(|l| l.len()).sum::<usize>())
            .sum();
        let queued: usize = self
            .pedigree_slots
            .iter()
            .map(|slots| slots.iter().map(|s| s.len()).sum::<usize>())
            .sum();
        indexed + queued
    }

    pub fn counters(&self) -> &EventCounters {
        &self.counters
    }

    pub fn num_breakpoints(&self) -> usize {
        self.breakpoints.len()
    }

    /// All recombination breakpoints seen so far, sorted.
    pub fn breakpoints(&self) -> Vec<f64> {
        self.breakpoints.iter().map(|b| f64::from_bits(*b)).collect()
    }

    pub fn migration_matrix(&self) -> &[f64] {
        &self.migration_matrix
    }

    /// Current `(initial_size, growth_rate)` of population `j`.
    pub fn population_configuration(&self, j: usize) -> Option<PopulationConfiguration> {
        self.populations.get(j).map(|p| PopulationConfiguration {
            initial_size: p.params.initial_size,
            growth_rate: p.params.growth_rate,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.config.samples
    }

    pub fn tables(&self) -> &TableCollection {
        &self.tables
    }

    /// Consume the simulator, returning the tables.
    pub fn into_tables(self) -> TableCollection {
        self.tables
    }

    pub fn num_segment_blocks(&self) -> usize {
        self.arena.num_blocks()
    }

    /// Snapshot of every extant lineage as its sorted segment chain.
    pub fn ancestors(&self) -> Vec<Vec<AncestorSegment>> {
        let mut out = Vec::new();
        for pop in &self.populations {
            for label in &pop.lineages {
                for head in label {
                    let mut chain = Vec::new();
                    let mut cur = Some(*head);
                    while let Some(id) = cur {
                        let seg = self.arena.get(id);
                        chain.push(AncestorSegment {
                            left: seg.left,
                            right: seg.right,
                            node: seg.node,
                            population: PopulationId::try_from(seg.population).unwrap(),
                        });
                        cur = seg.next;
                    }
                    out.push(chain);
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Segment and mass plumbing
    // ------------------------------------------------------------------

    pub(crate) fn alloc_segment(
        &mut self,
        left: f64,
        right: f64,
        node: NodeId,
        population: usize,
        label: usize,
    ) -> Result<SegmentIndex, SimError> {
        let id = self
            .arena
            .alloc(Segment::new(left, right, node, population, label))?;
        let cap = self.arena.capacity();
        for f in self.recomb_mass.iter_mut().chain(self.gc_mass.iter_mut()) {
            f.expand(cap);
        }
        Ok(id)
    }

    pub(crate) fn free_segment(&mut self, id: SegmentIndex) {
        let label = self.arena.get(id).label;
        self.recomb_mass[label].set_value(id, 0.0);
        self.gc_mass[label].set_value(id, 0.0);
        self.arena.free(id);
    }

    // Recompute this segment's recombinable and gene-conversion mass from
    // its chain context.
    pub(crate) fn set_segment_mass(&mut self, id: SegmentIndex) {
        let (left, right, label, prev) = {
            let s = self.arena.get(id);
            (s.left, s.right, s.label, s.prev)
        };
        let map = &self.config.recombination_map;
        let (rm, gm) = match prev {
            Some(p) => {
                let bound = self.arena.get(p).right;
                (map.mass_between(bound, right), right - bound)
            }
            None => {
                let rm = map.mass_between_left_exclusive(left, right);
                let gm = if map.discrete() {
                    (right - left - 1.0).max(0.0)
                } else {
                    right - left
                };
                (rm, gm)
            }
        };
        self.recomb_mass[label].set_value(id, rm);
        self.gc_mass[label].set_value(id, gm);
    }

    pub(crate) fn chain_head(&self, mut id: SegmentIndex) -> SegmentIndex {
        while let Some(p) = self.arena.get(id).prev {
            id = p;
        }
        id
    }

    pub(crate) fn chain_tail(&self, mut id: SegmentIndex) -> SegmentIndex {
        while let Some(n) = self.arena.get(id).next {
            id = n;
        }
        id
    }

    pub(crate) fn insert_lineage(&mut self, head: SegmentIndex) {
        debug_assert!(self.arena.get(head).prev.is_none());
        let (population, label) = {
            let s = self.arena.get(head);
            (s.population, s.label)
        };
        self.populations[population].lineages[label].push(head);
    }

    pub(crate) fn remove_lineage_at(
        &mut self,
        population: usize,
        label: usize,
        index: usize,
    ) -> SegmentIndex {
        self.populations[population].lineages[label].swap_remove(index)
    }

    fn insert_sample_lineage(&mut self, node: NodeId, population: usize) -> Result<(), SimError> {
        let sequence_length = self.sequence_length();
        let id = self.alloc_segment(0.0, sequence_length, node, population, 0)?;
        self.set_segment_mass(id);
        self.insert_lineage(id);
        Ok(())
    }

    pub(crate) fn store_node(
        &mut self,
        flags: NodeFlags,
        population: usize,
        individual: IndividualId,
    ) -> Result<NodeId, SimError> {
        self.tables
            .add_node(flags, self.time, PopulationId::try_from(population)?, individual)
    }

    pub(crate) fn record_edge(&mut self, left: f64, right: f64, parent: NodeId, child: NodeId) {
        self.recorder.record_edge(left, right, parent, child);
    }

    pub(crate) fn flush_edges(&mut self) {
        self.recorder.flush(&mut self.tables);
    }

    // Attach every segment of the chain at `head` to `node` with a
    // (possibly unary) edge.  Used by full-ARG recording and censuses.
    pub(crate) fn store_arg_edges(&mut self, head: SegmentIndex, node: NodeId) {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let (left, right, child, next) = {
                let s = self.arena.get(id);
                (s.left, s.right, s.node, s.next)
            };
            if child != node {
                self.record_edge(left, right, node, child);
                self.arena.get_mut(id).node = node;
            }
            cur = next;
        }
    }

    // ------------------------------------------------------------------
    // Chain surgery
    // ------------------------------------------------------------------

    /// Split the chain holding `head` at physical position `pos`,
    /// returning the head of the right-hand part (`None` when `pos` is
    /// beyond the chain's material).  The left part keeps `head`; when
    /// `pos` lies at or before the first segment the whole chain is the
    /// right part.
    pub(crate) fn split_chain_at(
        &mut self,
        head: SegmentIndex,
        pos: f64,
    ) -> Result<Option<SegmentIndex>, SimError> {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let (left, right, node, population, label, prev, next) = {
                let s = self.arena.get(id);
                (s.left, s.right, s.node, s.population, s.label, s.prev, s.next)
            };
            if right > pos {
                if left < pos {
                    // Split this segment in two.
                    let new_id = self.alloc_segment(pos, right, node, population, label)?;
                    self.arena.get_mut(new_id).next = next;
                    if let Some(nx) = next {
                        self.arena.get_mut(nx).prev = Some(new_id);
                    }
                    let seg = self.arena.get_mut(id);
                    seg.right = pos;
                    seg.next = None;
                    self.set_segment_mass(id);
                    self.set_segment_mass(new_id);
                    return Ok(Some(new_id));
                }
                // Chain splits in the gap before this segment.
                if let Some(p) = prev {
                    self.arena.get_mut(p).next = None;
                    self.arena.get_mut(id).prev = None;
                    self.set_segment_mass(id);
                }
                return Ok(Some(id));
            }
            cur = next;
        }
        Ok(None)
    }

    // Re-join two chains around an excised gene-conversion tract: the
    // last segment of `left_tail`'s chain is linked to `right_head`.
    pub(crate) fn join_chains(&mut self, left_head: SegmentIndex, right_head: SegmentIndex) {
        let tail = self.chain_tail(left_head);
        self.arena.get_mut(tail).next = Some(right_head);
        self.arena.get_mut(right_head).prev = Some(tail);
        self.set_segment_mass(right_head);
    }

    // Merge abutting same-node segments after a merge event.
    pub(crate) fn defrag_chain(&mut self, tail: SegmentIndex) {
        let mut cur = Some(tail);
        while let Some(id) = cur {
            let (left, node, prev) = {
                let s = self.arena.get(id);
                (s.left, s.node, s.prev)
            };
            if let Some(p) = prev {
                let (p_right, p_node) = {
                    let s = self.arena.get(p);
                    (s.right, s.node)
                };
                if p_right == left && p_node == node {
                    let (right, next) = {
                        let s = self.arena.get(id);
                        (s.right, s.next)
                    };
                    self.arena.get_mut(p).right = right;
                    self.arena.get_mut(p).next = next;
                    if let Some(nx) = next {
                        self.arena.get_mut(nx).prev = Some(p);
                    }
                    self.free_segment(id);
                    self.set_segment_mass(p);
                }
            }
            cur = prev;
        }
    }

    // ------------------------------------------------------------------
    // Common ancestor events
    // ------------------------------------------------------------------

    fn segments_overlap(l1: f64, r1: f64, l2: f64, r2: f64) -> bool {
        l1 < r2 && l2 < r1
    }

    // Does any ancestral material of the two chains overlap (or, with
    // `allow_contact`, abut)?  Drives SMC / SMC' rejection.
    pub(crate) fn chains_interact(
        &self,
        a: SegmentIndex,
        b: SegmentIndex,
        allow_contact: bool,
    ) -> bool {
        let mut x = Some(a);
        while let Some(xi) = x {
            let (xl, xr, xn) = {
                let s = self.arena.get(xi);
                (s.left, s.right, s.next)
            };
            let mut y = Some(b);
            while let Some(yi) = y {
                let (yl, yr, yn) = {
                    let s = self.arena.get(yi);
                    (s.left, s.right, s.next)
                };
                if Self::segments_overlap(xl, xr, yl, yr)
                    || (allow_contact && (xr == yl || yr == xl))
                {
                    return true;
                }
                y = yn;
            }
            x = xn;
        }
        false
    }

    /// Apply one common-ancestor event in `population` under the active
    /// model.
    pub(crate) fn common_ancestor_event(
        &mut self,
        population: usize,
        label: usize,
    ) -> Result<(), SimError> {
        let k = self.populations[population].lineages[label].len();
        debug_assert!(k >= 2);
        match self.config.model.clone() {
            SimulationModel::Dirac { psi, c, .. } => {
                let pairs = (k * (k - 1) / 2) as f64;
                if self.rng.gen::<f64>() < pairs / (pairs + c) {
                    self.kingman_merge(population, label)
                } else {
                    self.multi_merger(population, label, psi)
                }
            }
            SimulationModel::Beta {
                alpha,
                truncation_point,
                ..
            } => {
                let beta = BetaDistribution::new(2.0 - alpha, alpha)
                    .expect("validated beta parameters");
                let mut x = beta.sample(&mut self.rng);
                while x > truncation_point {
                    x = beta.sample(&mut self.rng);
                }
                self.multi_merger(population, label, x)
            }
            SimulationModel::Smc { .. } => self.smc_merge(population, label, false),
            SimulationModel::SmcPrime { .. } => self.smc_merge(population, label, true),
            _ => self.kingman_merge(population, label),
        }
    }

    fn choose_two(&mut self, k: usize) -> (usize, usize) {
        let i = self.rng.gen_range(0..k);
        let mut j = self.rng.gen_range(0..k - 1);
        if j >= i {
            j += 1;
        }
        (i.max(j), i.min(j))
    }

    pub(crate) fn kingman_merge(&mut self, population: usize, label: usize) -> Result<(), SimError> {
        let k = self.populations[population].lineages[label].len();
        let (hi, lo) = self.choose_two(k);
        let x = self.remove_lineage_at(population, label, hi);
        let y = self.remove_lineage_at(population, label, lo);
        self.counters.num_common_ancestor_events += 1;
        self.merge_two_ancestors(population, label, x, y, IndividualId::NULL)
    }

    fn smc_merge(
        &mut self,
        population: usize,
        label: usize,
        allow_contact: bool,
    ) -> Result<(), SimError> {
        let k = self.populations[population].lineages[label].len();
        let (hi, lo) = self.choose_two(k);
        let a = self.populations[population].lineages[label][hi];
        let b = self.populations[population].lineages[label][lo];
        if !self.chains_interact(a, b, allow_contact) {
            self.counters.num_rejected_common_ancestor_events += 1;
            return Ok(());
        }
        let x = self.remove_lineage_at(population, label, hi);
        let y = self.remove_lineage_at(population, label, lo);
        self.counters.num_common_ancestor_events += 1;
        self.merge_two_ancestors(population, label, x, y, IndividualId::NULL)
    }

    // A Λ-coalescent event: each lineage joins the merger independently
    // with probability `p`; fewer than two participants is a rejection.
    fn multi_merger(&mut self, population: usize, label: usize, p: f64) -> Result<(), SimError> {
        let k = self.populations[population].lineages[label].len();
        let binom = Binomial::new(k as u64, p).expect("validated probability");
        let count = binom.sample(&mut self.rng) as usize;
        if count < 2 {
            self.counters.num_rejected_common_ancestor_events += 1;
            return Ok(());
        }
        let mut indices: Vec<usize> = (0..k).collect();
        let mut chosen = Vec::with_capacity(count);
        for _ in 0..count {
            let j = self.rng.gen_range(0..indices.len());
            chosen.push(indices.swap_remove(j));
        }
        chosen.sort_unstable_by(|a, b| b.cmp(a));
        let heads: Vec<SegmentIndex> = chosen
            .into_iter()
            .map(|idx| self.remove_lineage_at(population, label, idx))
            .collect();
        self.counters.num_common_ancestor_events += 1;
        let merged = self.merge_ancestors(
            population,
            label,
            heads,
            NodeFlags::default(),
            IndividualId::NULL,
        )?;
        if let Some(head) = merged {
            self.insert_lineage(head);
        }
        Ok(())
    }

    /// Merge two lineages into their common ancestor at the current time.
    ///
    /// Walks both chains left to right.  Overlapping material coalesces
    /// into a node created lazily on first overlap; fully-coalesced
    /// intervals (overlap count reaching one) are dropped.  All emitted
    /// edges go through the recorder and are squashed on flush.
    pub(crate) fn merge_two_ancestors(
        &mut self,
        population: usize,
        label: usize,
        a: SegmentIndex,
        b: SegmentIndex,
        individual: IndividualId,
    ) -> Result<(), SimError> {
        let mut x = Some(a);
        let mut y = Some(b);
        let mut z: Option<SegmentIndex> = None;
        let mut merged_head: Option<SegmentIndex> = None;
        let mut coalescence = false;
        let mut defrag_required = false;
        let mut new_node = NodeId::NULL;

        while x.is_some() || y.is_some() {
            let mut alpha: Option<SegmentIndex> = None;
            match (x, y) {
                (Some(xi), None) => {
                    alpha = Some(xi);
                    x = None;
                }
                (None, Some(yi)) => {
                    alpha = Some(yi);
                    y = None;
                }
                (Some(mut xi), Some(mut yi)) => {
                    if self.arena.get(yi).left < self.arena.get(xi).left {
                        std::mem::swap(&mut xi, &mut yi);
                    }
                    let (xl, xr, x_node, x_next) = {
                        let s = self.arena.get(xi);
                        (s.left, s.right, s.node, s.next)
                    };
                    let yl = self.arena.get(yi).left;
                    if xr <= yl {
                        // x is entirely left of y.
                        x = x_next;
                        self.arena.get_mut(xi).next = None;
                        alpha = Some(xi);
                        y = Some(yi);
                    } else if xl != yl {
                        // Partial overlap: carve off x's prefix.
                        let id = self.alloc_segment(xl, yl, x_node, population, label)?;
                        self.arena.get_mut(xi).left = yl;
                        alpha = Some(id);
                        x = Some(xi);
                        y = Some(yi);
                    } else {
                        // Same left edge: this interval coalesces.
                        if !coalescence {
                            coalescence = true;
                            new_node =
                                self.store_node(NodeFlags::default(), population, individual)?;
                        }
                        let yr = self.arena.get(yi).right;
                        let y_node = self.arena.get(yi).node;
                        let l = xl;
                        let r_max = xr.min(yr);
                        self.overlaps.insert_breakpoint(l);
                        self.overlaps.insert_breakpoint(r_max);
                        let right;
                        if self.overlaps.get(l) == 2 {
                            // Last two carriers: the interval has found
                            // its MRCA and leaves the simulation.
                            self.overlaps.set(l, 0);
                            right = self.overlaps.succ_key(l);
                        } else {
                            let mut pos = l;
                            while pos < r_max && self.overlaps.get(pos) != 2 {
                                let c = self.overlaps.get(pos);
                                self.overlaps.set(pos, c - 1);
                                pos = self.overlaps.succ_key(pos);
                            }
                            right = pos;
                            let id =
                                self.alloc_segment(l, right, new_node, population, label)?;
                            alpha = Some(id);
                        }
                        self.record_edge(l, right, new_node, x_node);
                        self.record_edge(l, right, new_node, y_node);
                        // Trim the consumed prefix of both chains.
                        if xr == right {
                            x = x_next;
                            self.free_segment(xi);
                        } else {
                            self.arena.get_mut(xi).left = right;
                            x = Some(xi);
                        }
                        let y_next = self.arena.get(yi).next;
                        if yr == right {
                            y = y_next;
                            self.free_segment(yi);
                        } else {
                            self.arena.get_mut(yi).left = right;
                            y = Some(yi);
                        }
                    }
                }
                (None, None) => unreachable!(),
            }
            if let Some(al) = alpha {
                {
                    let seg = self.arena.get_mut(al);
                    seg.population = population;
                    seg.label = label;
                    seg.prev = z;
                }
                if let Some(zi) = z {
                    self.arena.get_mut(zi).next = Some(al);
                    let (z_right, z_node) = {
                        let s = self.arena.get(zi);
                        (s.right, s.node)
                    };
                    let (a_left, a_node) = {
                        let s = self.arena.get(al);
                        (s.left, s.node)
                    };
                    defrag_required |= z_right == a_left && z_node == a_node;
                } else {
                    merged_head = Some(al);
                }
                self.set_segment_mass(al);
                z = Some(al);
            }
        }

        if self.store_full_arg() {
            if !coalescence {
                new_node = self.store_node(
                    NodeFlags::default().mark_ca_event(),
                    population,
                    individual,
                )?;
            }
            if let Some(head) = merged_head {
                self.store_arg_edges(head, new_node);
            }
        }
        if let Some(head) = merged_head {
            self.insert_lineage(head);
        }
        if defrag_required {
            if let Some(tail) = z {
                self.defrag_chain(tail);
            }
        }
        self.flush_edges();
        Ok(())
    }

    /// Merge an arbitrary set of lineages into one ancestor at the
    /// current time (k-way analogue of [`Self::merge_two_ancestors`]).
    ///
    /// Returns the merged chain's head, or `None` when everything
    /// coalesced away.  The caller inserts the head into its index.
    pub(crate) fn merge_ancestors(
        &mut self,
        population: usize,
        label: usize,
        heads: Vec<SegmentIndex>,
        node_flags: NodeFlags,
        individual: IndividualId,
    ) -> Result<Option<SegmentIndex>, SimError> {
        debug_assert!(heads.len() >= 2);
        // Min-heap over (left, id); chains are dismembered into segments
        // as they are consumed.
        let mut h: BinaryHeap<std::cmp::Reverse<(u64, SegmentIndex)>> = BinaryHeap::new();
        for head in heads {
            let left = self.arena.get(head).left;
            h.push(std::cmp::Reverse((left.to_bits(), head)));
        }
        let mut z: Option<SegmentIndex> = None;
        let mut merged_head: Option<SegmentIndex> = None;
        let mut coalescence = false;
        let mut defrag_required = false;
        let mut new_node = NodeId::NULL;

        while let Some(std::cmp::Reverse((l_bits, first))) = h.pop() {
            let l = f64::from_bits(l_bits);
            let mut group = vec![first];
            while let Some(std::cmp::Reverse((bits, id))) = h.peek().copied() {
                if f64::from_bits(bits) != l {
                    break;
                }
                h.pop();
                group.push(id);
            }
            let mut alpha: Option<SegmentIndex> = None;
            if group.len() == 1 {
                let xi = group[0];
                let (xr, x_next) = {
                    let s = self.arena.get(xi);
                    (s.right, s.next)
                };
                let next_left = h
                    .peek()
                    .map(|std::cmp::Reverse((bits, _))| f64::from_bits(*bits));
                match next_left {
                    Some(nl) if nl < xr => {
                        // Truncate to the next contender's left edge.
                        let node = self.arena.get(xi).node;
                        let id = self.alloc_segment(l, nl, node, population, label)?;
                        self.arena.get_mut(xi).left = nl;
                        h.push(std::cmp::Reverse((nl.to_bits(), xi)));
                        alpha = Some(id);
                    }
                    _ => {
                        // The whole segment passes through untouched.
                        if let Some(nx) = x_next {
                            self.arena.get_mut(nx).prev = None;
                            h.push(std::cmp::Reverse((self.arena.get(nx).left.to_bits(), nx)));
                        }
                        self.arena.get_mut(xi).next = None;
                        alpha = Some(xi);
                    }
                }
            } else {
                if !coalescence {
                    coalescence = true;
                    new_node = self.store_node(node_flags, population, individual)?;
                }
                let mut r_max = group
                    .iter()
                    .map(|id| self.arena.get(*id).right)
                    .fold(f64::INFINITY, f64::min);
                if let Some(std::cmp::Reverse((bits, _))) = h.peek() {
                    r_max = r_max.min(f64::from_bits(*bits));
                }
                let depth = group.len() as u32;
                self.overlaps.insert_breakpoint(l);
                self.overlaps.insert_breakpoint(r_max);
                let right;
                if self.overlaps.get(l) == depth {
                    self.overlaps.set(l, 0);
                    right = self.overlaps.succ_key(l);
                } else {
                    let mut pos = l;
                    while pos < r_max && self.overlaps.get(pos) != depth {
                        let c = self.overlaps.get(pos);
                        self.overlaps.set(pos, c - (depth - 1));
                        pos = self.overlaps.succ_key(pos);
                    }
                    right = pos;
                    let id = self.alloc_segment(l, right, new_node, population, label)?;
                    alpha = Some(id);
                }
                for xi in group {
                    let (xr, x_node, x_next) = {
                        let s = self.arena.get(xi);
                        (s.right, s.node, s.next)
                    };
                    self.record_edge(l, right, new_node, x_node);
                    if xr == right {
                        if let Some(nx) = x_next {
                            self.arena.get_mut(nx).prev = None;
                            h.push(std::cmp::Reverse((self.arena.get(nx).left.to_bits(), nx)));
                        }
                        self.free_segment(xi);
                    } else {
                        self.arena.get_mut(xi).left = right;
                        h.push(std::cmp::Reverse((right.to_bits(), xi)));
                    }
                }
            }
            if let Some(al) = alpha {
                {
                    let seg = self.arena.get_mut(al);
                    seg.population = population;
                    seg.label = label;
                    seg.prev = z;
                    seg.next = None;
                }
                if let Some(zi) = z {
                    self.arena.get_mut(zi).next = Some(al);
                    let (z_right, z_node) = {
                        let s = self.arena.get(zi);
                        (s.right, s.node)
                    };
                    let (a_left, a_node) = {
                        let s = self.arena.get(al);
                        (s.left, s.node)
                    };
                    defrag_required |= z_right == a_left && z_node == a_node;
                } else {
                    merged_head = Some(al);
                }
                self.set_segment_mass(al);
                z = Some(al);
            }
        }
        if defrag_required {
            if let Some(tail) = z {
                self.defrag_chain(tail);
            }
        }
        self.flush_edges();
        Ok(merged_head)
    }

    // ------------------------------------------------------------------
    // Recombination and gene conversion
    // ------------------------------------------------------------------

    /// Apply one recombination event in `label`: draw a breakpoint
    /// proportional to recombinable mass and split the owning chain into
    /// two lineages.  Returns the left and right chain heads and the
    /// breakpoint.
    pub(crate) fn recombination_event(
        &mut self,
        label: usize,
    ) -> Result<(SegmentIndex, SegmentIndex, f64), SimError> {
        self.counters.num_recombination_events += 1;
        let total = self.recomb_mass[label].total();
        debug_assert!(total > 0.0);
        let (y_id, k) = loop {
            let hmass = (1.0 - self.rng.gen::<f64>()) * total;
            let y_id = self.recomb_mass[label].find(hmass);
            let cumulative = self.recomb_mass[label].cumulative_sum(y_id);
            let (y_left, y_right, y_prev) = {
                let s = self.arena.get(y_id);
                (s.left, s.right, s.prev)
            };
            let k = self
                .config
                .recombination_map
                .shift_by_mass(y_right, hmass - cumulative);
            // A breakpoint at the chain's own head edge detaches nothing;
            // redraw on that boundary.
            if k < y_right && (y_prev.is_some() || k > y_left) {
                break (y_id, k);
            }
        };
        if !self.breakpoints.insert(k.to_bits()) {
            self.counters.num_multiple_recombination_events += 1;
        }
        let (y_left, y_prev, population) = {
            let s = self.arena.get(y_id);
            (s.left, s.prev, s.population)
        };
        let rhs_head;
        let lhs_ref;
        if y_left < k {
            // The breakpoint falls inside y: split the segment.
            let (y_right, y_node, y_next, y_label) = {
                let s = self.arena.get(y_id);
                (s.right, s.node, s.next, s.label)
            };
            let alpha = self.alloc_segment(k, y_right, y_node, population, y_label)?;
            self.arena.get_mut(alpha).next = y_next;
            if let Some(nx) = y_next {
                self.arena.get_mut(nx).prev = Some(alpha);
            }
            let seg = self.arena.get_mut(y_id);
            seg.right = k;
            seg.next = None;
            self.set_segment_mass(y_id);
            self.set_segment_mass(alpha);
            rhs_head = alpha;
            lhs_ref = y_id;
        } else {
            // The breakpoint falls in the gap left of y: split the chain.
            let p = y_prev.expect("gap breakpoint implies a predecessor");
            self.arena.get_mut(p).next = None;
            self.arena.get_mut(y_id).prev = None;
            self.set_segment_mass(y_id);
            rhs_head = y_id;
            lhs_ref = p;
        }
        self.insert_lineage(rhs_head);
        let lhs_head = self.chain_head(lhs_ref);

        if self.store_full_arg() {
            let lhs_node =
                self.store_node(NodeFlags::default().mark_re_event(), population, IndividualId::NULL)?;
            self.store_arg_edges(lhs_head, lhs_node);
            let rhs_node =
                self.store_node(NodeFlags::default().mark_re_event(), population, IndividualId::NULL)?;
            self.store_arg_edges(rhs_head, rhs_node);
            self.flush_edges();
        }
        Ok((lhs_head, rhs_head, k))
    }

    /// Apply one gene-conversion event in `label`: excise a geometric
    /// tract into a new lineage and re-join the flanks.
    pub(crate) fn gene_conversion_event(&mut self, label: usize) -> Result<(), SimError> {
        self.counters.num_gene_conversion_events += 1;
        let total = self.gc_mass[label].total();
        debug_assert!(total > 0.0);
        let discrete = self.config.recombination_map.discrete();
        let (y_id, start) = loop {
            let hmass = (1.0 - self.rng.gen::<f64>()) * total;
            let y_id = self.gc_mass[label].find(hmass);
            let cumulative = self.gc_mass[label].cumulative_sum(y_id);
            let (y_left, y_right, y_prev) = {
                let s = self.arena.get(y_id);
                (s.left, s.right, s.prev)
            };
            let k = y_right - (cumulative - hmass);
            let k = if discrete { k.floor() } else { k };
            // A tract starting at the chain's own head edge detaches
            // nothing; redraw on that boundary.
            if k < y_right && (y_prev.is_some() || k > y_left) {
                break (y_id, k);
            }
        };
        // Geometric tract length with mean track_length, support {1, ...}.
        let p = 1.0 / self.config.gene_conversion_track_length;
        let mut length = 1.0;
        while self.rng.gen::<f64>() >= p {
            length += 1.0;
        }
        let end = (start + length).min(self.sequence_length());

        let head = self.chain_head(y_id);
        let mid = self
            .split_chain_at(head, start)?
            .expect("tract start lies inside the chain");
        debug_assert_ne!(mid, head);
        match self.split_chain_at(mid, end)? {
            Some(tail) if tail == mid => {
                // The whole tract fell in a gap; re-join and move on.
                self.join_chains(head, mid);
            }
            Some(tail) => {
                self.join_chains(head, tail);
                self.insert_lineage(mid);
            }
            None => {
                // Tract runs to the end of the material: equivalent to a
                // recombination at the tract start.
                self.insert_lineage(mid);
            }
        }
        self.breakpoints.insert(start.to_bits());
        if end < self.sequence_length() {
            self.breakpoints.insert(end.to_bits());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------

    /// Move one uniformly-chosen lineage from `source` to `dest`.
    pub(crate) fn migration_event(
        &mut self,
        source: usize,
        dest: usize,
        label: usize,
    ) -> Result<(), SimError> {
        let k = self.populations[source].lineages[label].len();
        debug_assert!(k > 0);
        let idx = self.rng.gen_range(0..k);
        let head = self.remove_lineage_at(source, label, idx);
        self.migrate_lineage(head, source, dest)?;
        let num_populations = self.populations.len();
        self.counters.num_migration_events[source * num_populations + dest] += 1;
        Ok(())
    }

    // Relabel a removed chain into `dest` and re-insert it, recording
    // migrations and full-ARG nodes as configured.
    pub(crate) fn migrate_lineage(
        &mut self,
        head: SegmentIndex,
        source: usize,
        dest: usize,
    ) -> Result<(), SimError> {
        let store = self.store_migrations();
        let time = self.time;
        let mut cur = Some(head);
        while let Some(id) = cur {
            let (left, right, node, next) = {
                let s = self.arena.get(id);
                (s.left, s.right, s.node, s.next)
            };
            if store {
                self.tables.add_migration(
                    left,
                    right,
                    node,
                    PopulationId::try_from(source)?,
                    PopulationId::try_from(dest)?,
                    time,
                )?;
            }
            self.arena.get_mut(id).population = dest;
            cur = next;
        }
        if self.store_full_arg() {
            let node =
                self.store_node(NodeFlags::default().mark_mig_event(), dest, IndividualId::NULL)?;
            self.store_arg_edges(head, node);
            self.flush_edges();
        }
        self.insert_lineage(head);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Demographic events
    // ------------------------------------------------------------------

    pub(crate) fn apply_demographic_event(&mut self, event: DemographicEvent) -> Result<(), SimError> {
        debug!(time = self.time, kind = ?event.kind, "demographic event");
        match event.kind {
            DemographicEventKind::PopulationParametersChange {
                population,
                initial_size,
                growth_rate,
            } => {
                let targets: Vec<usize> = if population == -1 {
                    (0..self.populations.len()).collect()
                } else {
                    vec![population as usize]
                };
                for j in targets {
                    let params = &mut self.populations[j].params;
                    let size = initial_size.unwrap_or_else(|| params.size_at(event.time));
                    let growth = growth_rate.unwrap_or(params.growth_rate);
                    *params = PopulationParams {
                        initial_size: size,
                        growth_rate: growth,
                        start_time: event.time,
                    };
                }
                Ok(())
            }
            DemographicEventKind::MigrationRateChange {
                matrix_index,
                migration_rate,
            } => {
                let p = self.populations.len();
                if matrix_index == -1 {
                    for i in 0..p {
                        for j in 0..p {
                            if i != j {
                                self.migration_matrix[i * p + j] = migration_rate;
                            }
                        }
                    }
                } else {
                    self.migration_matrix[matrix_index as usize] = migration_rate;
                }
                Ok(())
            }
            DemographicEventKind::MassMigration {
                source,
                dest,
                proportion,
            } => self.mass_migration(source as usize, dest as usize, proportion),
            DemographicEventKind::SimpleBottleneck {
                population,
                proportion,
            } => self.simple_bottleneck(population as usize, proportion),
            DemographicEventKind::InstantaneousBottleneck {
                population,
                strength,
            } => self.instantaneous_bottleneck(population as usize, strength),
            DemographicEventKind::CensusEvent => self.census_event(),
        }
    }

    fn mass_migration(&mut self, source: usize, dest: usize, proportion: f64) -> Result<(), SimError> {
        for label in 0..self.num_labels {
            let k = self.populations[source].lineages[label].len();
            // Walk backwards so swap_remove leaves unseen entries alone.
            for idx in (0..k).rev() {
                if self.rng.gen::<f64>() < proportion {
                    let head = self.remove_lineage_at(source, label, idx);
                    self.migrate_lineage(head, source, dest)?;
                }
            }
        }
        Ok(())
    }

    fn simple_bottleneck(&mut self, population: usize, proportion: f64) -> Result<(), SimError> {
        let label = 0;
        let k = self.populations[population].lineages[label].len();
        let mut chosen = Vec::new();
        for idx in (0..k).rev() {
            if self.rng.gen::<f64>() < proportion {
                chosen.push(idx);
            }
        }
        if chosen.len() < 2 {
            return Ok(());
        }
        let heads: Vec<SegmentIndex> = chosen
            .into_iter()
            .map(|idx| self.remove_lineage_at(population, label, idx))
            .collect();
        let merged = self.merge_ancestors(
            population,
            label,
            heads,
            NodeFlags::default(),
            IndividualId::NULL,
        )?;
        if let Some(head) = merged {
            self.insert_lineage(head);
        }
        Ok(())
    }

    // A zero-wall-time Kingman run of duration `strength` generations:
    // pairs are pooled into equivalence classes, then each class merges.
    fn instantaneous_bottleneck(&mut self, population: usize, strength: f64) -> Result<(), SimError> {
        let label = 0;
        let k = self.populations[population].lineages[label].len();
        if k < 2 {
            return Ok(());
        }
        let size = self.populations[population].params.size_at(self.time);
        let mut roots: Vec<usize> = (0..k).collect();
        let mut parent: Vec<usize> = (0..k).collect();
        fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }
        let mut tau = 0.0;
        while roots.len() > 1 {
            let n = roots.len() as f64;
            let rate = n * (n - 1.0) / (4.0 * size);
            let u: f64 = self.rng.sample(Exp1);
            tau += u / rate;
            if tau > strength {
                break;
            }
            let i = self.rng.gen_range(0..roots.len());
            let mut j = self.rng.gen_range(0..roots.len() - 1);
            if j >= i {
                j += 1;
            }
            let (ri, rj) = (roots[i], roots[j]);
            parent[rj] = ri;
            roots.swap_remove(j);
        }
        // Collect classes with two or more members, largest index first
        // so removals stay valid.
        let mut classes: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
        for idx in 0..k {
            let root = find(&mut parent, idx);
            classes.entry(root).or_default().push(idx);
        }
        let mut groups: Vec<Vec<usize>> = classes
            .into_values()
            .filter(|members| members.len() >= 2)
            .collect();
        // Remove the heads from the population before merging; indices
        // are processed in descending order across all groups.
        let mut head_of: std::collections::BTreeMap<usize, SegmentIndex> = Default::default();
        let mut all: Vec<usize> = groups.iter().flatten().copied().collect();
        all.sort_unstable_by(|a, b| b.cmp(a));
        for idx in all {
            let head = self.remove_lineage_at(population, label, idx);
            head_of.insert(idx, head);
        }
        for members in groups.drain(..) {
            let heads: Vec<SegmentIndex> =
                members.iter().map(|idx| head_of[idx]).collect();
            let merged = self.merge_ancestors(
                population,
                label,
                heads,
                NodeFlags::default(),
                IndividualId::NULL,
            )?;
            if let Some(head) = merged {
                self.insert_lineage(head);
            }
        }
        Ok(())
    }

    // Snapshot every extant segment as a fresh census-flagged node.
    fn census_event(&mut self) -> Result<(), SimError> {
        let mut heads = Vec::new();
        for pop in &self.populations {
            for label in &pop.lineages {
                heads.extend_from_slice(label);
            }
        }
        for head in heads {
            let mut cur = Some(head);
            while let Some(id) = cur {
                let (left, right, node, population, next) = {
                    let s = self.arena.get(id);
                    (s.left, s.right, s.node, s.population, s.next)
                };
                let census_node = self.store_node(
                    NodeFlags::default().mark_census_event(),
                    population,
                    IndividualId::NULL,
                )?;
                self.record_edge(left, right, census_node, node);
                self.arena.get_mut(id).node = census_node;
                cur = next;
            }
        }
        self.flush_edges();
        Ok(())
    }

    fn apply_sampling_event(&mut self, index: usize) -> Result<(), SimError> {
        let ev = self.sampling_events[index].clone();
        self.insert_sample_lineage(ev.node, ev.population)
    }

    // ------------------------------------------------------------------
    // Waiting times
    // ------------------------------------------------------------------

    // Convert a model-time event rate into a generations-scale waiting
    // time, inverting the exponential-growth hazard analytically.  A
    // shrinking-forward population can make the event unreachable, in
    // which case infinity is returned.
    pub(crate) fn common_ancestor_waiting_time(
        &mut self,
        population: usize,
        label: usize,
    ) -> f64 {
        let k = self.populations[population].lineages[label].len();
        if k < 2 {
            return f64::INFINITY;
        }
        let pairs = (k * (k - 1) / 2) as f64;
        let lambda_model = match &self.config.model {
            SimulationModel::Dirac { c, .. } => pairs + c,
            _ => pairs,
        };
        if lambda_model <= 0.0 {
            return f64::INFINITY;
        }
        let u: f64 = self.rng.sample::<f64, _>(Exp1) / lambda_model;
        let params = self.populations[population].params;
        let n_t = params.size_at(self.time);
        let alpha = params.growth_rate;
        if alpha == 0.0 {
            2.0 * n_t * u
        } else {
            let z = 1.0 + alpha * 2.0 * n_t * u;
            if z <= 0.0 {
                f64::INFINITY
            } else {
                z.ln() / alpha
            }
        }
    }

    fn exponential_waiting_time(&mut self, rate: f64) -> f64 {
        if rate <= 0.0 {
            f64::INFINITY
        } else {
            self.rng.sample::<f64, _>(Exp1) / rate
        }
    }

    // ------------------------------------------------------------------
    // The event loop
    // ------------------------------------------------------------------

    /// Run until full coalescence, `end_time`, or `max_events` processed
    /// events, whichever comes first.
    ///
    /// The returned [`ExitStatus`] distinguishes the three; on
    /// [`ExitStatus::MaxEvents`] the state is resumable by calling `run`
    /// again with the same arguments.
    pub fn run(&mut self, end_time: f64, max_events: u64) -> Result<ExitStatus, SimError> {
        if self.errored {
            return Err(SimError::BadState(
                "a previous run failed; reset before reuse".to_string(),
            ));
        }
        if end_time < 0.0 {
            return Err(input_error!("run", "end_time must be non-negative"));
        }
        let result = match self.config.model.kind() {
            ModelKind::Continuous => self.run_continuous(end_time, max_events, 0),
            ModelKind::Discrete => self.run_dtwf(end_time, max_events),
            ModelKind::Pedigree => self.run_pedigree(end_time, max_events),
            ModelKind::Sweep => self.run_sweep(end_time, max_events),
        };
        if result.is_err() {
            self.errored = true;
        } else {
            #[cfg(debug_assertions)]
            self.verify_state();
        }
        result
    }

    /// Run one event (`run(f64::MAX, 1)`).
    pub fn run_event(&mut self) -> Result<ExitStatus, SimError> {
        self.run(f64::MAX, 1)
    }

    /// Loop [`Simulator::run`] until the sample coalesces or `end_time`
    /// is reached, yielding internally every 1024 events.
    pub fn run_to_completion(&mut self) -> Result<ExitStatus, SimError> {
        loop {
            let status = self.run(f64::MAX, 1024)?;
            if status != ExitStatus::MaxEvents {
                debug!(time = self.time, ?status, "run complete");
                return Ok(status);
            }
        }
    }

    pub(crate) fn lineages_remain(&self) -> bool {
        self.num_ancestors() > 0 || self.next_sampling_event < self.sampling_events.len()
    }

    // Time of the next fixed (sampling or demographic) event, preferring
    // sampling on ties.
    pub(crate) fn next_fixed_event_time(&self) -> (f64, bool) {
        let t_samp = self
            .sampling_events
            .get(self.next_sampling_event)
            .map_or(f64::INFINITY, |e| e.time);
        let t_demo = self
            .config
            .demographic_events
            .get(self.next_demographic_event)
            .map_or(f64::INFINITY, |e| e.time);
        if t_samp <= t_demo {
            (t_samp, true)
        } else {
            (t_demo, false)
        }
    }

    pub(crate) fn apply_next_fixed_event(&mut self, sampling: bool) -> Result<(), SimError> {
        if sampling {
            let idx = self.next_sampling_event;
            self.next_sampling_event += 1;
            self.apply_sampling_event(idx)
        } else {
            let idx = self.next_demographic_event;
            self.next_demographic_event += 1;
            let event = self.config.demographic_events[idx].clone();
            self.apply_demographic_event(event)
        }
    }

    // The continuous-time driver shared by hudson, smc, smc_prime,
    // dirac, beta, and the post-sweep phase.  `label` is the lineage
    // label events act on.
    pub(crate) fn run_continuous(
        &mut self,
        end_time: f64,
        max_events: u64,
        label: usize,
    ) -> Result<ExitStatus, SimError> {
        let num_populations = self.populations.len();
        let mut events = 0u64;
        loop {
            if !self.lineages_remain() {
                return Ok(ExitStatus::Coalesced);
            }
            if events >= max_events {
                return Ok(ExitStatus::MaxEvents);
            }
            // One exponential per rate source; the minimum wins.
            let mut t_min = f64::INFINITY;
            let mut chosen = None;
            let re_rate = self.recomb_mass[label].total();
            let dt = self.exponential_waiting_time(re_rate);
            if self.time + dt < t_min {
                t_min = self.time + dt;
                chosen = Some(StochasticEvent::Recombination { label });
            }
            let gc_rate = self.config.gene_conversion_rate * self.gc_mass[label].total();
            let dt = self.exponential_waiting_time(gc_rate);
            if self.time + dt < t_min {
                t_min = self.time + dt;
                chosen = Some(StochasticEvent::GeneConversion { label });
            }
            for population in 0..num_populations {
                let dt = self.common_ancestor_waiting_time(population, label);
                if self.time + dt < t_min {
                    t_min = self.time + dt;
                    chosen = Some(StochasticEvent::CommonAncestor { population });
                }
            }
            for source in 0..num_populations {
                let k = self.populations[source].lineages[label].len();
                if k == 0 {
                    continue;
                }
                for dest in 0..num_populations {
                    if source == dest {
                        continue;
                    }
                    let rate = k as f64 * self.migration_matrix[source * num_populations + dest];
                    let dt = self.exponential_waiting_time(rate);
                    if self.time + dt < t_min {
                        t_min = self.time + dt;
                        chosen = Some(StochasticEvent::Migration { source, dest });
                    }
                }
            }

            let (t_fixed, is_sampling) = self.next_fixed_event_time();
            if t_min.is_infinite() && t_fixed.is_infinite() {
                return Err(SimError::BadState(
                    "infinite waiting time: the remaining lineages can never coalesce".to_string(),
                ));
            }
            if t_fixed <= t_min {
                // Demographic and sampling events win ties with
                // stochastic events.
                if t_fixed > end_time {
                    self.time = end_time;
                    return Ok(ExitStatus::MaxTime);
                }
                self.time = t_fixed;
                self.apply_next_fixed_event(is_sampling)?;
                events += 1;
                continue;
            }
            if t_min > end_time {
                self.time = end_time;
                return Ok(ExitStatus::MaxTime);
            }
            self.time = t_min;
            match chosen.expect("finite minimum implies a chosen event") {
                StochasticEvent::CommonAncestor { population } => {
                    self.common_ancestor_event(population, label)?;
                }
                StochasticEvent::Recombination { label } => {
                    self.recombination_event(label)?;
                }
                StochasticEvent::GeneConversion { label } => {
                    self.gene_conversion_event(label)?;
                }
                StochasticEvent::Migration { source, dest } => {
                    self.migration_event(source, dest, label)?;
                }
            }
            events += 1;
            #[cfg(debug_assertions)]
            self.verify_state();
        }
    }

    /// Flush pending edges and sort the tables into the canonical order,
    /// making the collection a valid tree sequence even when uncoalesced
    /// material remains.
    pub fn finalise_tables(&mut self) -> Result<(), SimError> {
        self.flush_edges();
        self.tables.sort()
    }

    // ------------------------------------------------------------------
    // Invariant checks (debug builds and tests)
    // ------------------------------------------------------------------

    /// Panic if any chain invariant or Fenwick sum is violated.
    pub fn verify_state(&self) {
        let mut expected_recomb = vec![0.0; self.num_labels];
        let mut expected_gc = vec![0.0; self.num_labels];
        for (pidx, pop) in self.populations.iter().enumerate() {
            for (label, heads) in pop.lineages.iter().enumerate() {
                for head in heads {
                    self.verify_chain(*head, Some(pidx), Some(label));
                    self.accumulate_chain_mass(*head, &mut expected_recomb, &mut expected_gc);
                }
            }
        }
        for slots in &self.pedigree_slots {
            for queued in slots {
                for head in queued {
                    self.verify_chain(*head, Some(0), Some(0));
                    self.accumulate_chain_mass(*head, &mut expected_recomb, &mut expected_gc);
                }
            }
        }
        for label in 0..self.num_labels {
            assert!(
                (self.recomb_mass[label].total() - expected_recomb[label]).abs() < 1e-6,
                "Fenwick total out of sync with chain masses"
            );
            assert!((self.gc_mass[label].total() - expected_gc[label]).abs() < 1e-6);
        }
    }

    fn verify_chain(&self, head: SegmentIndex, population: Option<usize>, label: Option<usize>) {
        let sequence_length = self.sequence_length();
        assert!(self.arena.get(head).prev.is_none());
        let mut cur = Some(head);
        let mut prev_right = f64::NEG_INFINITY;
        let mut prev_id: Option<SegmentIndex> = None;
        while let Some(id) = cur {
            let s = self.arena.get(id);
            assert!(s.left < s.right, "segment [{}, {}) is empty", s.left, s.right);
            assert!(s.left >= 0.0 && s.right <= sequence_length);
            assert!(
                prev_right <= s.left,
                "chain out of order: {} > {}",
                prev_right,
                s.left
            );
            if let Some(p) = population {
                assert_eq!(s.population, p);
            }
            if let Some(l) = label {
                assert_eq!(s.label, l);
            }
            assert_eq!(s.prev, prev_id);
            // Carried material always has live overlap counts.
            assert!(self.overlaps.count_at(s.left) >= 1);
            let map = &self.config.recombination_map;
            let rm = match s.prev {
                Some(p) => map.mass_between(self.arena.get(p).right, s.right),
                None => map.mass_between_left_exclusive(s.left, s.right),
            };
            assert!(
                (self.recomb_mass[s.label].get_value(id) - rm).abs() < 1e-9,
                "stale recombination mass for segment {}",
                id
            );
            prev_right = s.right;
            prev_id = Some(id);
            cur = s.next;
        }
    }

    fn accumulate_chain_mass(
        &self,
        head: SegmentIndex,
        expected_recomb: &mut [f64],
        expected_gc: &mut [f64],
    ) {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let s = self.arena.get(id);
            expected_recomb[s.label] += self.recomb_mass[s.label].get_value(id);
            expected_gc[s.label] += self.gc_mass[s.label].get_value(id);
            cur = s.next;
        }
    }
}
