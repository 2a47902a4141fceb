//! The mutation generator.
//!
//! Overlays a Poisson point process on the branches of a finalised table
//! collection: each edge receives mutations at rate `branch_length × ∫μ`
//! over its interval, positions are drawn proportional to the local rate,
//! and derived states follow a finite-state substitution model
//! conditioned on the parental allele at the site.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::intervalmap::IntervalMap;
use crate::tables::TableCollection;
use crate::{MutationId, MutationOptions, NodeId, SimError};

const NUCLEOTIDES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// The mutation alphabet: `binary = 0`, `nucleotide = 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Alphabet {
    Binary = 0,
    Nucleotide = 1,
}

impl TryFrom<i32> for Alphabet {
    type Error = SimError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Alphabet::Binary),
            1 => Ok(Alphabet::Nucleotide),
            _ => Err(input_error!("mutation alphabet", "unknown alphabet {}", value)),
        }
    }
}

impl Alphabet {
    fn ancestral_state(&self, rng: &mut StdRng) -> u8 {
        match self {
            Alphabet::Binary => b'0',
            Alphabet::Nucleotide => NUCLEOTIDES[rng.gen_range(0..4)],
        }
    }

    // Uniform over the states other than `parent`.
    fn derived_state(&self, parent: u8, rng: &mut StdRng) -> u8 {
        match self {
            Alphabet::Binary => {
                if parent == b'0' {
                    b'1'
                } else {
                    b'0'
                }
            }
            Alphabet::Nucleotide => {
                let mut j = rng.gen_range(0..3);
                for n in NUCLEOTIDES {
                    if n == parent {
                        continue;
                    }
                    if j == 0 {
                        return n;
                    }
                    j -= 1;
                }
                unreachable!("parent state outside the alphabet")
            }
        }
    }
}

struct PendingMutation {
    node: NodeId,
    node_time: f64,
    // Kept mutations carry their original derived state and order.
    derived: Option<Vec<u8>>,
    keep_order: usize,
}

#[derive(Default)]
struct PendingSite {
    ancestral: Option<Vec<u8>>,
    metadata: Vec<u8>,
    mutations: Vec<PendingMutation>,
}

/// Generates mutations over a table collection.
///
/// # Examples
///
/// ```
/// # use coalsim::*;
/// let mut config = SimulationConfig::new(
///     vec![Sample::new(0, 0.0), Sample::new(0, 0.0)],
///     RecombinationMap::uniform(10.0, 0.0, false).unwrap(),
/// );
/// config.seed = 3;
/// let mut sim = Simulator::new(config).unwrap();
/// sim.run_to_completion().unwrap();
/// sim.finalise_tables().unwrap();
/// let mut tables = sim.into_tables();
/// let rate_map = IntervalMap::uniform(10.0, 0.5).unwrap();
/// let mut gen = MutationGenerator::new(7, rate_map, Alphabet::Nucleotide);
/// gen.generate(&mut tables, MutationOptions::NONE).unwrap();
/// assert_eq!(tables.sites().num_rows(), tables.mutations().num_rows());
/// ```
pub struct MutationGenerator {
    rate_map: IntervalMap,
    alphabet: Alphabet,
    start_time: f64,
    end_time: f64,
    rng: StdRng,
}

impl MutationGenerator {
    pub fn new(seed: u64, rate_map: IntervalMap, alphabet: Alphabet) -> Self {
        Self {
            rate_map,
            alphabet,
            start_time: f64::NEG_INFINITY,
            end_time: f64::INFINITY,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restrict mutations to branch sections inside `[start, end]`.
    pub fn with_time_interval(mut self, start: f64, end: f64) -> Result<Self, SimError> {
        if !(start < end) {
            return Err(input_error!(
                "mutation time interval",
                "start {} must be below end {}",
                start,
                end
            ));
        }
        self.start_time = start;
        self.end_time = end;
        Ok(self)
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Generate mutations over `tables`.
    ///
    /// With [`MutationOptions::KEEP_SITES`] pre-existing sites and
    /// mutations are preserved and the new mutations are interleaved in
    /// parent order; otherwise existing sites and mutations are
    /// discarded first.
    pub fn generate(
        &mut self,
        tables: &mut TableCollection,
        options: MutationOptions,
    ) -> Result<(), SimError> {
        if self.rate_map.sequence_length() != tables.sequence_length() {
            return Err(input_error!(
                "mutation rate map",
                "rate map length {} does not match the tables' {}",
                self.rate_map.sequence_length(),
                tables.sequence_length()
            ));
        }
        let keep = options.contains(MutationOptions::KEEP_SITES);
        let mut sites: BTreeMap<u64, PendingSite> = BTreeMap::new();
        if keep {
            for row in tables.sites().iter() {
                sites.insert(
                    row.position.to_bits(),
                    PendingSite {
                        ancestral: Some(row.ancestral_state.clone()),
                        metadata: row.metadata.clone(),
                        mutations: Vec::new(),
                    },
                );
            }
            for (j, row) in tables.mutations().iter().enumerate() {
                let position = tables.sites().row(row.site).ok_or(SimError::IndexError)?.position;
                let node_time = tables.nodes().time(row.node).ok_or(SimError::IndexError)?;
                sites
                    .get_mut(&position.to_bits())
                    .ok_or(SimError::IndexError)?
                    .mutations
                    .push(PendingMutation {
                        node: row.node,
                        node_time,
                        derived: Some(row.derived_state.clone()),
                        keep_order: j,
                    });
            }
        }

        // Draw the new mutations edge by edge.
        for edge in tables.edges().iter() {
            let parent_time = tables.nodes().time(edge.parent).ok_or(SimError::IndexError)?;
            let child_time = tables.nodes().time(edge.child).ok_or(SimError::IndexError)?;
            let branch_start = child_time.max(self.start_time);
            let branch_end = parent_time.min(self.end_time);
            let branch_length = branch_end - branch_start;
            if branch_length <= 0.0 {
                continue;
            }
            let mass = self.rate_map.mass_between(edge.left, edge.right);
            if mass <= 0.0 {
                continue;
            }
            let count = Poisson::new(branch_length * mass)
                .expect("positive mean")
                .sample(&mut self.rng) as usize;
            for _ in 0..count {
                let m = self.rate_map.mass_to(edge.left) + self.rng.gen::<f64>() * mass;
                let position = self.rate_map.mass_to_position(m);
                if position < edge.left || position >= edge.right {
                    continue;
                }
                sites
                    .entry(position.to_bits())
                    .or_default()
                    .mutations
                    .push(PendingMutation {
                        node: edge.child,
                        node_time: child_time,
                        derived: None,
                        keep_order: usize::MAX,
                    });
            }
        }

        tables.sites_mut().clear();
        tables.mutations_mut().clear();
        for (bits, mut site) in sites {
            let position = f64::from_bits(bits);
            if site.mutations.is_empty() && !keep {
                continue;
            }
            let ancestral = match site.ancestral.take() {
                Some(a) => a,
                None => vec![self.alphabet.ancestral_state(&mut self.rng)],
            };
            let site_id = tables
                .sites_mut()
                .add_row(position, &ancestral, &site.metadata);

            // Oldest branches first so that parent mutations precede
            // their descendants; kept mutations keep their relative
            // order within a node.
            let mut order: Vec<usize> = (0..site.mutations.len()).collect();
            order.sort_by(|a, b| {
                let ma = &site.mutations[*a];
                let mb = &site.mutations[*b];
                mb.node_time
                    .partial_cmp(&ma.node_time)
                    .unwrap()
                    .then(ma.keep_order.cmp(&mb.keep_order))
                    .then(a.cmp(b))
            });

            // child -> parent over this position, for the climbs below.
            let mut parent_of: BTreeMap<i32, i32> = BTreeMap::new();
            if site.mutations.len() > 1 {
                for e in tables.edges().iter() {
                    if e.left <= position && position < e.right {
                        parent_of.insert(e.child.raw(), e.parent.raw());
                    }
                }
            }
            let mut placed: BTreeMap<i32, MutationId> = BTreeMap::new();
            for j in order {
                let m = &site.mutations[j];
                let parent_mutation = match placed.get(&m.node.raw()) {
                    Some(pm) => *pm,
                    None => {
                        let mut u = parent_of.get(&m.node.raw()).copied();
                        let mut found = MutationId::NULL;
                        while let Some(p) = u {
                            if let Some(pm) = placed.get(&p) {
                                found = *pm;
                                break;
                            }
                            u = parent_of.get(&p).copied();
                        }
                        found
                    }
                };
                let derived = match &m.derived {
                    Some(d) => d.clone(),
                    None => {
                        let parent_allele = if parent_mutation.is_null() {
                            ancestral.first().copied()
                        } else {
                            tables
                                .mutations()
                                .row(parent_mutation)
                                .ok_or(SimError::IndexError)?
                                .derived_state
                                .first()
                                .copied()
                        };
                        let parent_allele =
                            parent_allele.unwrap_or_else(|| self.alphabet.ancestral_state(&mut self.rng));
                        vec![self.alphabet.derived_state(parent_allele, &mut self.rng)]
                    }
                };
                let id = tables.mutations_mut().add_row(
                    site_id,
                    m.node,
                    parent_mutation,
                    &derived,
                    &[],
                );
                placed.insert(m.node.raw(), id);
            }
        }
        Ok(())
    }
}
