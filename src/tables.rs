//! The succinct tree-sequence table collection.
//!
//! Eight columnar tables plus a `sequence_length` scalar.  Variable-length
//! columns are a packed data array plus an offset column of length
//! `num_rows + 1` with `offset[0] == 0` and `offset[num_rows] ==
//! data.len()`.  The dictionary encoding ([`TableCollection::asdict`] /
//! [`TableCollection::fromdict`]) maps each table to its columns as typed
//! 1-D arrays and round-trips byte-for-byte.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    EdgeId, IndividualId, MigrationId, MutationId, NodeFlags, NodeId, PopulationId, Position,
    ProvenanceId, SimError, SiteId, Time,
};

/// A packed variable-length column.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RaggedColumn<T> {
    pub data: Vec<T>,
    pub offset: Vec<u32>,
}

impl<T: Clone> Default for RaggedColumn<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            offset: vec![0],
        }
    }
}

impl<T: Clone> RaggedColumn<T> {
    pub fn push(&mut self, values: &[T]) {
        self.data.extend_from_slice(values);
        self.offset.push(self.data.len() as u32);
    }

    pub fn get(&self, row: usize) -> &[T] {
        let a = self.offset[row] as usize;
        let b = self.offset[row + 1] as usize;
        &self.data[a..b]
    }

    pub fn num_rows(&self) -> usize {
        self.offset.len() - 1
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.offset.clear();
        self.offset.push(0);
    }

    fn from_parts(data: Vec<T>, offset: Vec<u32>) -> Result<Self, SimError> {
        if offset.is_empty() || offset[0] != 0 {
            return Err(SimError::Tables("offset column must start at 0".into()));
        }
        if *offset.last().unwrap() as usize != data.len() {
            return Err(SimError::Tables(
                "offset column must end at the data length".into(),
            ));
        }
        if offset.windows(2).any(|w| w[1] < w[0]) {
            return Err(SimError::Tables(
                "offset column must be non-decreasing".into(),
            ));
        }
        Ok(Self { data, offset })
    }
}

/// Row of an [`IndividualTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct IndividualTableRow {
    pub id: IndividualId,
    pub flags: u32,
    pub location: Vec<f64>,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndividualTable {
    pub(crate) flags: Vec<u32>,
    pub(crate) location: RaggedColumn<f64>,
    pub(crate) metadata: RaggedColumn<u8>,
}

impl IndividualTable {
    pub fn num_rows(&self) -> usize {
        self.flags.len()
    }

    pub(crate) fn add_row(&mut self, flags: u32, location: &[f64], metadata: &[u8]) -> IndividualId {
        self.flags.push(flags);
        self.location.push(location);
        self.metadata.push(metadata);
        IndividualId::try_from(self.num_rows() - 1).unwrap()
    }

    pub fn row(&self, id: IndividualId) -> Option<IndividualTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| IndividualTableRow {
            id,
            flags: self.flags[j],
            location: self.location.get(j).to_vec(),
            metadata: self.metadata.get(j).to_vec(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = IndividualTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(IndividualId::try_from(j).unwrap()).unwrap())
    }

    fn clear(&mut self) {
        self.flags.clear();
        self.location.clear();
        self.metadata.clear();
    }
}

/// Row of a [`NodeTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTableRow {
    pub id: NodeId,
    pub flags: NodeFlags,
    pub time: f64,
    pub population: PopulationId,
    pub individual: IndividualId,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeTable {
    pub(crate) flags: Vec<u32>,
    pub(crate) time: Vec<f64>,
    pub(crate) population: Vec<i32>,
    pub(crate) individual: Vec<i32>,
    pub(crate) metadata: RaggedColumn<u8>,
}

impl NodeTable {
    pub fn num_rows(&self) -> usize {
        self.time.len()
    }

    pub(crate) fn add_row(
        &mut self,
        flags: NodeFlags,
        time: f64,
        population: PopulationId,
        individual: IndividualId,
        metadata: &[u8],
    ) -> NodeId {
        self.flags.push(flags.bits());
        self.time.push(time);
        self.population.push(population.raw());
        self.individual.push(individual.raw());
        self.metadata.push(metadata);
        NodeId::try_from(self.num_rows() - 1).unwrap()
    }

    /// The `time` value from row `row`.
    pub fn time<N: Into<NodeId> + Copy>(&self, row: N) -> Option<f64> {
        self.time.get(row.into().to_usize()?).copied()
    }

    /// The `flags` value from row `row`.
    pub fn flags<N: Into<NodeId> + Copy>(&self, row: N) -> Option<NodeFlags> {
        self.flags
            .get(row.into().to_usize()?)
            .map(|f| NodeFlags::from(*f))
    }

    /// The `population` value from row `row`.
    pub fn population<N: Into<NodeId> + Copy>(&self, row: N) -> Option<PopulationId> {
        self.population
            .get(row.into().to_usize()?)
            .map(|p| PopulationId::from(*p))
    }

    pub fn row(&self, id: NodeId) -> Option<NodeTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| NodeTableRow {
            id,
            flags: NodeFlags::from(self.flags[j]),
            time: self.time[j],
            population: PopulationId::from(self.population[j]),
            individual: IndividualId::from(self.individual[j]),
            metadata: self.metadata.get(j).to_vec(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(NodeId::try_from(j).unwrap()).unwrap())
    }

    /// Ids of all rows flagged as samples.
    pub fn samples_as_vector(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|row| row.flags.is_sample())
            .map(|row| row.id)
            .collect()
    }

    fn clear(&mut self) {
        self.flags.clear();
        self.time.clear();
        self.population.clear();
        self.individual.clear();
        self.metadata.clear();
    }
}

/// Row of an [`EdgeTable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeTableRow {
    pub id: EdgeId,
    pub left: f64,
    pub right: f64,
    pub parent: NodeId,
    pub child: NodeId,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeTable {
    pub(crate) left: Vec<f64>,
    pub(crate) right: Vec<f64>,
    pub(crate) parent: Vec<i32>,
    pub(crate) child: Vec<i32>,
}

impl EdgeTable {
    pub fn num_rows(&self) -> usize {
        self.left.len()
    }

    pub(crate) fn add_row(&mut self, left: f64, right: f64, parent: NodeId, child: NodeId) -> EdgeId {
        self.left.push(left);
        self.right.push(right);
        self.parent.push(parent.raw());
        self.child.push(child.raw());
        EdgeId::try_from(self.num_rows() - 1).unwrap()
    }

    // Extend the last row instead of appending when the new edge continues
    // it: same (parent, child) and abutting interval.
    pub(crate) fn squash_or_add(&mut self, left: f64, right: f64, parent: NodeId, child: NodeId) {
        if let Some(last) = self.num_rows().checked_sub(1) {
            if self.parent[last] == parent.raw()
                && self.child[last] == child.raw()
                && self.right[last] == left
            {
                self.right[last] = right;
                return;
            }
        }
        self.add_row(left, right, parent, child);
    }

    pub fn row(&self, id: EdgeId) -> Option<EdgeTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| EdgeTableRow {
            id,
            left: self.left[j],
            right: self.right[j],
            parent: NodeId::from(self.parent[j]),
            child: NodeId::from(self.child[j]),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = EdgeTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(EdgeId::try_from(j).unwrap()).unwrap())
    }

    fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
        self.parent.clear();
        self.child.clear();
    }
}

/// Row of a [`MigrationTable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MigrationTableRow {
    pub id: MigrationId,
    pub left: f64,
    pub right: f64,
    pub node: NodeId,
    pub source: PopulationId,
    pub dest: PopulationId,
    pub time: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MigrationTable {
    pub(crate) left: Vec<f64>,
    pub(crate) right: Vec<f64>,
    pub(crate) node: Vec<i32>,
    pub(crate) source: Vec<i32>,
    pub(crate) dest: Vec<i32>,
    pub(crate) time: Vec<f64>,
}

impl MigrationTable {
    pub fn num_rows(&self) -> usize {
        self.left.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_row(
        &mut self,
        left: f64,
        right: f64,
        node: NodeId,
        source: PopulationId,
        dest: PopulationId,
        time: f64,
    ) -> MigrationId {
        self.left.push(left);
        self.right.push(right);
        self.node.push(node.raw());
        self.source.push(source.raw());
        self.dest.push(dest.raw());
        self.time.push(time);
        MigrationId::try_from(self.num_rows() - 1).unwrap()
    }

    pub fn row(&self, id: MigrationId) -> Option<MigrationTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| MigrationTableRow {
            id,
            left: self.left[j],
            right: self.right[j],
            node: NodeId::from(self.node[j]),
            source: PopulationId::from(self.source[j]),
            dest: PopulationId::from(self.dest[j]),
            time: self.time[j],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = MigrationTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(MigrationId::try_from(j).unwrap()).unwrap())
    }

    fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
        self.node.clear();
        self.source.clear();
        self.dest.clear();
        self.time.clear();
    }
}

/// Row of a [`SiteTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct SiteTableRow {
    pub id: SiteId,
    pub position: f64,
    pub ancestral_state: Vec<u8>,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SiteTable {
    pub(crate) position: Vec<f64>,
    pub(crate) ancestral_state: RaggedColumn<u8>,
    pub(crate) metadata: RaggedColumn<u8>,
}

impl SiteTable {
    pub fn num_rows(&self) -> usize {
        self.position.len()
    }

    pub(crate) fn add_row(&mut self, position: f64, ancestral_state: &[u8], metadata: &[u8]) -> SiteId {
        self.position.push(position);
        self.ancestral_state.push(ancestral_state);
        self.metadata.push(metadata);
        SiteId::try_from(self.num_rows() - 1).unwrap()
    }

    pub fn row(&self, id: SiteId) -> Option<SiteTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| SiteTableRow {
            id,
            position: self.position[j],
            ancestral_state: self.ancestral_state.get(j).to_vec(),
            metadata: self.metadata.get(j).to_vec(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = SiteTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(SiteId::try_from(j).unwrap()).unwrap())
    }

    pub(crate) fn clear(&mut self) {
        self.position.clear();
        self.ancestral_state.clear();
        self.metadata.clear();
    }
}

/// Row of a [`MutationTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct MutationTableRow {
    pub id: MutationId,
    pub site: SiteId,
    pub node: NodeId,
    pub parent: MutationId,
    pub derived_state: Vec<u8>,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationTable {
    pub(crate) site: Vec<i32>,
    pub(crate) node: Vec<i32>,
    pub(crate) parent: Vec<i32>,
    pub(crate) derived_state: RaggedColumn<u8>,
    pub(crate) metadata: RaggedColumn<u8>,
}

impl MutationTable {
    pub fn num_rows(&self) -> usize {
        self.site.len()
    }

    pub(crate) fn add_row(
        &mut self,
        site: SiteId,
        node: NodeId,
        parent: MutationId,
        derived_state: &[u8],
        metadata: &[u8],
    ) -> MutationId {
        self.site.push(site.raw());
        self.node.push(node.raw());
        self.parent.push(parent.raw());
        self.derived_state.push(derived_state);
        self.metadata.push(metadata);
        MutationId::try_from(self.num_rows() - 1).unwrap()
    }

    pub fn row(&self, id: MutationId) -> Option<MutationTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| MutationTableRow {
            id,
            site: SiteId::from(self.site[j]),
            node: NodeId::from(self.node[j]),
            parent: MutationId::from(self.parent[j]),
            derived_state: self.derived_state.get(j).to_vec(),
            metadata: self.metadata.get(j).to_vec(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = MutationTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(MutationId::try_from(j).unwrap()).unwrap())
    }

    pub(crate) fn clear(&mut self) {
        self.site.clear();
        self.node.clear();
        self.parent.clear();
        self.derived_state.clear();
        self.metadata.clear();
    }
}

/// Row of a [`PopulationTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationTableRow {
    pub id: PopulationId,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationTable {
    pub(crate) metadata: RaggedColumn<u8>,
}

impl PopulationTable {
    pub fn num_rows(&self) -> usize {
        self.metadata.num_rows()
    }

    pub(crate) fn add_row(&mut self, metadata: &[u8]) -> PopulationId {
        self.metadata.push(metadata);
        PopulationId::try_from(self.num_rows() - 1).unwrap()
    }

    pub fn row(&self, id: PopulationId) -> Option<PopulationTableRow> {
        let j = id.to_usize()?;
        (j < self.num_rows()).then(|| PopulationTableRow {
            id,
            metadata: self.metadata.get(j).to_vec(),
        })
    }

    fn clear(&mut self) {
        self.metadata.clear();
    }
}

/// Row of a [`ProvenanceTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceTableRow {
    pub id: ProvenanceId,
    /// ISO-formatted time stamp
    pub timestamp: String,
    /// The provenance record
    pub record: String,
}

impl std::fmt::Display for ProvenanceTableRow {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "id: {}, timestamp: {}, record: {}",
            self.id, self.timestamp, self.record,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvenanceTable {
    pub(crate) timestamp: RaggedColumn<u8>,
    pub(crate) record: RaggedColumn<u8>,
}

impl ProvenanceTable {
    pub fn num_rows(&self) -> usize {
        self.timestamp.num_rows()
    }

    pub(crate) fn add_row(&mut self, timestamp: &str, record: &str) -> ProvenanceId {
        self.timestamp.push(timestamp.as_bytes());
        self.record.push(record.as_bytes());
        ProvenanceId::try_from(self.num_rows() - 1).unwrap()
    }

    /// Get the ISO-formatted time stamp for row `row`.
    pub fn timestamp(&self, row: ProvenanceId) -> Option<String> {
        let j = row.to_usize()?;
        (j < self.num_rows())
            .then(|| String::from_utf8_lossy(self.timestamp.get(j)).into_owned())
    }

    /// Get the provenance record for row `row`.
    pub fn record(&self, row: ProvenanceId) -> Option<String> {
        let j = row.to_usize()?;
        (j < self.num_rows()).then(|| String::from_utf8_lossy(self.record.get(j)).into_owned())
    }

    pub fn row(&self, id: ProvenanceId) -> Option<ProvenanceTableRow> {
        Some(ProvenanceTableRow {
            id,
            timestamp: self.timestamp(id)?,
            record: self.record(id)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ProvenanceTableRow> + '_ {
        (0..self.num_rows()).map(|j| self.row(ProvenanceId::try_from(j).unwrap()).unwrap())
    }

    fn clear(&mut self) {
        self.timestamp.clear();
        self.record.clear();
    }
}

/// A typed 1-D column array in the dictionary encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnArray {
    F64(Vec<f64>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I8(Vec<i8>),
}

/// One table as a mapping from column name to array.
pub type TableDict = BTreeMap<String, ColumnArray>;

/// The dictionary encoding of a whole [`TableCollection`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableCollectionDict {
    pub sequence_length: f64,
    pub tables: BTreeMap<String, TableDict>,
}

fn bytes_to_i8(v: &[u8]) -> Vec<i8> {
    v.iter().map(|b| *b as i8).collect()
}

fn i8_to_bytes(v: &[i8]) -> Vec<u8> {
    v.iter().map(|b| *b as u8).collect()
}

macro_rules! dict_column {
    ($dict: expr, $table: expr, $name: expr, $variant: ident) => {
        match $dict.get($name) {
            Some(ColumnArray::$variant(v)) => Ok(v.clone()),
            Some(_) => Err(SimError::Tables(format!(
                "column {}.{} has the wrong element type",
                $table, $name
            ))),
            None => Err(SimError::Tables(format!(
                "missing column {}.{}",
                $table, $name
            ))),
        }
    };
}

/// The table collection: eight tables over a sequence of length
/// `sequence_length`.
///
/// # Examples
///
/// ```
/// let mut tables = coalsim::TableCollection::new(10.0).unwrap();
/// let p = tables.add_population();
/// let n0 = tables.add_node(coalsim::NodeFlags::new_sample(), 0.0, p,
///     coalsim::IndividualId::NULL).unwrap();
/// let n1 = tables.add_node(coalsim::NodeFlags::default(), 1.0, p,
///     coalsim::IndividualId::NULL).unwrap();
/// tables.add_edge(0.0, 10.0, n1, n0).unwrap();
/// assert_eq!(tables.edges().num_rows(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableCollection {
    sequence_length: f64,
    individuals: IndividualTable,
    nodes: NodeTable,
    edges: EdgeTable,
    migrations: MigrationTable,
    sites: SiteTable,
    mutations: MutationTable,
    populations: PopulationTable,
    provenances: ProvenanceTable,
}

impl TableCollection {
    /// Create an empty collection over `[0, sequence_length)`.
    ///
    /// # Errors
    ///
    /// [`SimError::Input`] unless `sequence_length > 0`.
    pub fn new(sequence_length: f64) -> Result<Self, SimError> {
        if !(sequence_length > 0.0) || !sequence_length.is_finite() {
            return Err(input_error!(
                "sequence length",
                "must be positive and finite"
            ));
        }
        Ok(Self {
            sequence_length,
            ..Default::default()
        })
    }

    pub fn sequence_length(&self) -> f64 {
        self.sequence_length
    }

    pub fn individuals(&self) -> &IndividualTable {
        &self.individuals
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    pub fn migrations(&self) -> &MigrationTable {
        &self.migrations
    }

    pub fn sites(&self) -> &SiteTable {
        &self.sites
    }

    pub fn mutations(&self) -> &MutationTable {
        &self.mutations
    }

    pub fn populations(&self) -> &PopulationTable {
        &self.populations
    }

    pub fn provenances(&self) -> &ProvenanceTable {
        &self.provenances
    }

    /// Ids of all nodes flagged as samples.
    pub fn samples_as_vector(&self) -> Vec<NodeId> {
        self.nodes.samples_as_vector()
    }

    pub fn add_individual(&mut self, flags: u32, location: &[f64]) -> IndividualId {
        self.individuals.add_row(flags, location, &[])
    }

    /// Append a node row.
    pub fn add_node<T, P, I>(
        &mut self,
        flags: NodeFlags,
        time: T,
        population: P,
        individual: I,
    ) -> Result<NodeId, SimError>
    where
        T: Into<Time>,
        P: Into<PopulationId>,
        I: Into<IndividualId>,
    {
        let time = time.into().raw();
        if !time.is_finite() {
            return Err(SimError::Tables("node time must be finite".into()));
        }
        Ok(self
            .nodes
            .add_row(flags, time, population.into(), individual.into(), &[]))
    }

    /// Append an edge row.
    ///
    /// # Errors
    ///
    /// [`SimError::Tables`] if the interval is empty or escapes
    /// `[0, sequence_length]`, or either node id is null.
    pub fn add_edge<L, R, P, C>(
        &mut self,
        left: L,
        right: R,
        parent: P,
        child: C,
    ) -> Result<EdgeId, SimError>
    where
        L: Into<Position>,
        R: Into<Position>,
        P: Into<NodeId>,
        C: Into<NodeId>,
    {
        let left = left.into().raw();
        let right = right.into().raw();
        let parent = parent.into();
        let child = child.into();
        if !(left >= 0.0 && left < right && right <= self.sequence_length) {
            return Err(SimError::Tables(format!(
                "bad edge interval [{}, {})",
                left, right
            )));
        }
        if parent.is_null() || child.is_null() {
            return Err(SimError::Tables("edge nodes must not be null".into()));
        }
        Ok(self.edges.add_row(left, right, parent, child))
    }

    pub fn add_migration(
        &mut self,
        left: f64,
        right: f64,
        node: NodeId,
        source: PopulationId,
        dest: PopulationId,
        time: f64,
    ) -> Result<MigrationId, SimError> {
        if !(left >= 0.0 && left < right && right <= self.sequence_length) {
            return Err(SimError::Tables(format!(
                "bad migration interval [{}, {})",
                left, right
            )));
        }
        Ok(self
            .migrations
            .add_row(left, right, node, source, dest, time))
    }

    pub fn add_site<X: Into<Position>>(
        &mut self,
        position: X,
        ancestral_state: &[u8],
    ) -> Result<SiteId, SimError> {
        let position = position.into().raw();
        if !(position >= 0.0 && position < self.sequence_length) {
            return Err(SimError::Tables(format!("bad site position {}", position)));
        }
        Ok(self.sites.add_row(position, ancestral_state, &[]))
    }

    pub fn add_mutation(
        &mut self,
        site: SiteId,
        node: NodeId,
        parent: MutationId,
        derived_state: &[u8],
    ) -> Result<MutationId, SimError> {
        if site.is_null() || node.is_null() {
            return Err(SimError::Tables(
                "mutation site and node must not be null".into(),
            ));
        }
        Ok(self
            .mutations
            .add_row(site, node, parent, derived_state, &[]))
    }

    pub fn add_population(&mut self) -> PopulationId {
        self.populations.add_row(&[])
    }

    /// Append a provenance row with the current wall-clock timestamp.
    pub fn add_provenance(&mut self, record: &str) -> Result<ProvenanceId, SimError> {
        if record.is_empty() {
            return Err(SimError::ValueError {
                got: "empty string".to_string(),
                expected: "provenance record".to_string(),
            });
        }
        let timestamp = crate::provenance::timestamp_now();
        Ok(self.provenances.add_row(&timestamp, record))
    }

    pub(crate) fn add_provenance_row(&mut self, timestamp: &str, record: &str) -> ProvenanceId {
        self.provenances.add_row(timestamp, record)
    }

    pub(crate) fn edges_mut(&mut self) -> &mut EdgeTable {
        &mut self.edges
    }

    pub(crate) fn sites_mut(&mut self) -> &mut SiteTable {
        &mut self.sites
    }

    pub(crate) fn mutations_mut(&mut self) -> &mut MutationTable {
        &mut self.mutations
    }

    /// Remove all rows from all tables.
    pub fn clear(&mut self) {
        self.individuals.clear();
        self.nodes.clear();
        self.edges.clear();
        self.migrations.clear();
        self.sites.clear();
        self.mutations.clear();
        self.populations.clear();
        self.provenances.clear();
    }

    /// Sort edges by `(time[parent], parent, child, left)` and sites by
    /// position (remapping mutation site references and parents).
    ///
    /// This is the canonical ordering a valid tree sequence requires.
    pub fn sort(&mut self) -> Result<(), SimError> {
        self.sort_edges()?;
        self.sort_sites_and_mutations()
    }

    fn sort_edges(&mut self) -> Result<(), SimError> {
        let n = self.edges.num_rows();
        let mut order: Vec<usize> = (0..n).collect();
        let e = &self.edges;
        for j in 0..n {
            let p = e.parent[j];
            if p < 0 || p as usize >= self.nodes.num_rows() {
                return Err(SimError::Tables(format!("edge parent {} out of range", p)));
            }
        }
        let times = &self.nodes.time;
        order.sort_by(|a, b| {
            let ka = (times[e.parent[*a] as usize], e.parent[*a], e.child[*a], e.left[*a]);
            let kb = (times[e.parent[*b] as usize], e.parent[*b], e.child[*b], e.left[*b]);
            ka.partial_cmp(&kb).unwrap()
        });
        let sorted = EdgeTable {
            left: order.iter().map(|j| e.left[*j]).collect(),
            right: order.iter().map(|j| e.right[*j]).collect(),
            parent: order.iter().map(|j| e.parent[*j]).collect(),
            child: order.iter().map(|j| e.child[*j]).collect(),
        };
        self.edges = sorted;
        Ok(())
    }

    fn sort_sites_and_mutations(&mut self) -> Result<(), SimError> {
        let n = self.sites.num_rows();
        let mut site_order: Vec<usize> = (0..n).collect();
        site_order.sort_by(|a, b| {
            self.sites.position[*a]
                .partial_cmp(&self.sites.position[*b])
                .unwrap()
                .then(a.cmp(b))
        });
        // old site id -> new site id
        let mut site_map = vec![0i32; n];
        let mut sites = SiteTable::default();
        for (new, old) in site_order.iter().enumerate() {
            site_map[*old] = new as i32;
            sites.add_row(
                self.sites.position[*old],
                self.sites.ancestral_state.get(*old),
                self.sites.metadata.get(*old),
            );
        }
        self.sites = sites;

        let m = self.mutations.num_rows();
        let mut mut_order: Vec<usize> = (0..m).collect();
        // Stable by (new site, original order); parents precede children
        // because the generator appends them oldest first per site.
        mut_order.sort_by_key(|j| (site_map[self.mutations.site[*j] as usize], *j));
        let mut mut_map = vec![-1i32; m];
        for (new, old) in mut_order.iter().enumerate() {
            mut_map[*old] = new as i32;
        }
        let old = std::mem::take(&mut self.mutations);
        for j in &mut_order {
            let parent = old.parent[*j];
            let parent = if parent == -1 { -1 } else { mut_map[parent as usize] };
            self.mutations.add_row(
                SiteId::from(site_map[old.site[*j] as usize]),
                NodeId::from(old.node[*j]),
                MutationId::from(parent),
                old.derived_state.get(*j),
                old.metadata.get(*j),
            );
        }
        Ok(())
    }

    /// Check structural invariants: edge intervals inside `[0, L]`,
    /// `time[parent] > time[child]`, and no overlapping intervals for a
    /// `(parent, child)` pair.
    pub fn check_integrity(&self) -> Result<(), SimError> {
        let n = self.nodes.num_rows() as i32;
        let mut seen: BTreeMap<(i32, i32), Vec<(f64, f64)>> = BTreeMap::new();
        for row in self.edges.iter() {
            if row.parent.raw() >= n || row.child.raw() >= n || row.parent.is_null() || row.child.is_null()
            {
                return Err(SimError::Tables("edge node out of range".into()));
            }
            if !(row.left >= 0.0 && row.left < row.right && row.right <= self.sequence_length) {
                return Err(SimError::Tables(format!(
                    "bad edge interval [{}, {})",
                    row.left, row.right
                )));
            }
            let tp = self.nodes.time[row.parent.as_usize()];
            let tc = self.nodes.time[row.child.as_usize()];
            if !(tp > tc) {
                return Err(SimError::Tables(format!(
                    "edge parent time {} not above child time {}",
                    tp, tc
                )));
            }
            let intervals = seen.entry((row.parent.raw(), row.child.raw())).or_default();
            for (l, r) in intervals.iter() {
                if row.left < *r && *l < row.right {
                    return Err(SimError::Tables(format!(
                        "duplicate edge interval for ({}, {})",
                        row.parent, row.child
                    )));
                }
            }
            intervals.push((row.left, row.right));
        }
        for row in self.mutations.iter() {
            if row.node.raw() >= n || row.node.is_null() {
                return Err(SimError::Tables("mutation node out of range".into()));
            }
            if row.site.to_usize().map_or(true, |s| s >= self.sites.num_rows()) {
                return Err(SimError::Tables("mutation site out of range".into()));
            }
        }
        Ok(())
    }

    /// Encode as a dictionary of typed column arrays.
    pub fn asdict(&self) -> TableCollectionDict {
        let mut tables = BTreeMap::new();

        let mut t = TableDict::new();
        t.insert("flags".into(), ColumnArray::U32(self.individuals.flags.clone()));
        t.insert(
            "location".into(),
            ColumnArray::F64(self.individuals.location.data.clone()),
        );
        t.insert(
            "location_offset".into(),
            ColumnArray::U32(self.individuals.location.offset.clone()),
        );
        t.insert(
            "metadata".into(),
            ColumnArray::I8(bytes_to_i8(&self.individuals.metadata.data)),
        );
        t.insert(
            "metadata_offset".into(),
            ColumnArray::U32(self.individuals.metadata.offset.clone()),
        );
        tables.insert("individuals".into(), t);

        let mut t = TableDict::new();
        t.insert("flags".into(), ColumnArray::U32(self.nodes.flags.clone()));
        t.insert("time".into(), ColumnArray::F64(self.nodes.time.clone()));
        t.insert(
            "population".into(),
            ColumnArray::I32(self.nodes.population.clone()),
        );
        t.insert(
            "individual".into(),
            ColumnArray::I32(self.nodes.individual.clone()),
        );
        t.insert(
            "metadata".into(),
            ColumnArray::I8(bytes_to_i8(&self.nodes.metadata.data)),
        );
        t.insert(
            "metadata_offset".into(),
            ColumnArray::U32(self.nodes.metadata.offset.clone()),
        );
        tables.insert("nodes".into(), t);

        let mut t = TableDict::new();
        t.insert("left".into(), ColumnArray::F64(self.edges.left.clone()));
        t.insert("right".into(), ColumnArray::F64(self.edges.right.clone()));
        t.insert("parent".into(), ColumnArray::I32(self.edges.parent.clone()));
        t.insert("child".into(), ColumnArray::I32(self.edges.child.clone()));
        tables.insert("edges".into(), t);

        let mut t = TableDict::new();
        t.insert("left".into(), ColumnArray::F64(self.migrations.left.clone()));
        t.insert("right".into(), ColumnArray::F64(self.migrations.right.clone()));
        t.insert("node".into(), ColumnArray::I32(self.migrations.node.clone()));
        t.insert(
            "source".into(),
            ColumnArray::I32(self.migrations.source.clone()),
        );
        t.insert("dest".into(), ColumnArray::I32(self.migrations.dest.clone()));
        t.insert("time".into(), ColumnArray::F64(self.migrations.time.clone()));
        tables.insert("migrations".into(), t);

        let mut t = TableDict::new();
        t.insert(
            "position".into(),
            ColumnArray::F64(self.sites.position.clone()),
        );
        t.insert(
            "ancestral_state".into(),
            ColumnArray::I8(bytes_to_i8(&self.sites.ancestral_state.data)),
        );
        t.insert(
            "ancestral_state_offset".into(),
            ColumnArray::U32(self.sites.ancestral_state.offset.clone()),
        );
        t.insert(
            "metadata".into(),
            ColumnArray::I8(bytes_to_i8(&self.sites.metadata.data)),
        );
        t.insert(
            "metadata_offset".into(),
            ColumnArray::U32(self.sites.metadata.offset.clone()),
        );
        tables.insert("sites".into(), t);

        let mut t = TableDict::new();
        t.insert("site".into(), ColumnArray::I32(self.mutations.site.clone()));
        t.insert("node".into(), ColumnArray::I32(self.mutations.node.clone()));
        t.insert(
            "parent".into(),
            ColumnArray::I32(self.mutations.parent.clone()),
        );
        t.insert(
            "derived_state".into(),
            ColumnArray::I8(bytes_to_i8(&self.mutations.derived_state.data)),
        );
        t.insert(
            "derived_state_offset".into(),
            ColumnArray::U32(self.mutations.derived_state.offset.clone()),
        );
        t.insert(
            "metadata".into(),
            ColumnArray::I8(bytes_to_i8(&self.mutations.metadata.data)),
        );
        t.insert(
            "metadata_offset".into(),
            ColumnArray::U32(self.mutations.metadata.offset.clone()),
        );
        tables.insert("mutations".into(), t);

        let mut t = TableDict::new();
        t.insert(
            "metadata".into(),
            ColumnArray::I8(bytes_to_i8(&self.populations.metadata.data)),
        );
        t.insert(
            "metadata_offset".into(),
            ColumnArray::U32(self.populations.metadata.offset.clone()),
        );
        tables.insert("populations".into(), t);

        let mut t = TableDict::new();
        t.insert(
            "timestamp".into(),
            ColumnArray::I8(bytes_to_i8(&self.provenances.timestamp.data)),
        );
        t.insert(
            "timestamp_offset".into(),
            ColumnArray::U32(self.provenances.timestamp.offset.clone()),
        );
        t.insert(
            "record".into(),
            ColumnArray::I8(bytes_to_i8(&self.provenances.record.data)),
        );
        t.insert(
            "record_offset".into(),
            ColumnArray::U32(self.provenances.record.offset.clone()),
        );
        tables.insert("provenances".into(), t);

        TableCollectionDict {
            sequence_length: self.sequence_length,
            tables,
        }
    }

    /// Decode a dictionary produced by [`TableCollection::asdict`].
    ///
    /// # Errors
    ///
    /// [`SimError::Tables`] on missing tables or columns, wrong element
    /// types, or malformed offset columns.
    pub fn fromdict(dict: &TableCollectionDict) -> Result<Self, SimError> {
        let mut out = TableCollection::new(dict.sequence_length)?;
        let table = |name: &str| -> Result<&TableDict, SimError> {
            dict.tables
                .get(name)
                .ok_or_else(|| SimError::Tables(format!("missing table {}", name)))
        };

        let t = table("individuals")?;
        out.individuals = IndividualTable {
            flags: dict_column!(t, "individuals", "flags", U32)?,
            location: RaggedColumn::from_parts(
                dict_column!(t, "individuals", "location", F64)?,
                dict_column!(t, "individuals", "location_offset", U32)?,
            )?,
            metadata: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "individuals", "metadata", I8)?),
                dict_column!(t, "individuals", "metadata_offset", U32)?,
            )?,
        };

        let t = table("nodes")?;
        out.nodes = NodeTable {
            flags: dict_column!(t, "nodes", "flags", U32)?,
            time: dict_column!(t, "nodes", "time", F64)?,
            population: dict_column!(t, "nodes", "population", I32)?,
            individual: dict_column!(t, "nodes", "individual", I32)?,
            metadata: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "nodes", "metadata", I8)?),
                dict_column!(t, "nodes", "metadata_offset", U32)?,
            )?,
        };

        let t = table("edges")?;
        out.edges = EdgeTable {
            left: dict_column!(t, "edges", "left", F64)?,
            right: dict_column!(t, "edges", "right", F64)?,
            parent: dict_column!(t, "edges", "parent", I32)?,
            child: dict_column!(t, "edges", "child", I32)?,
        };

        let t = table("migrations")?;
        out.migrations = MigrationTable {
            left: dict_column!(t, "migrations", "left", F64)?,
            right: dict_column!(t, "migrations", "right", F64)?,
            node: dict_column!(t, "migrations", "node", I32)?,
            source: dict_column!(t, "migrations", "source", I32)?,
            dest: dict_column!(t, "migrations", "dest", I32)?,
            time: dict_column!(t, "migrations", "time", F64)?,
        };

        let t = table("sites")?;
        out.sites = SiteTable {
            position: dict_column!(t, "sites", "position", F64)?,
            ancestral_state: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "sites", "ancestral_state", I8)?),
                dict_column!(t, "sites", "ancestral_state_offset", U32)?,
            )?,
            metadata: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "sites", "metadata", I8)?),
                dict_column!(t, "sites", "metadata_offset", U32)?,
            )?,
        };

        let t = table("mutations")?;
        out.mutations = MutationTable {
            site: dict_column!(t, "mutations", "site", I32)?,
            node: dict_column!(t, "mutations", "node", I32)?,
            parent: dict_column!(t, "mutations", "parent", I32)?,
            derived_state: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "mutations", "derived_state", I8)?),
                dict_column!(t, "mutations", "derived_state_offset", U32)?,
            )?,
            metadata: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "mutations", "metadata", I8)?),
                dict_column!(t, "mutations", "metadata_offset", U32)?,
            )?,
        };

        let t = table("populations")?;
        out.populations = PopulationTable {
            metadata: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "populations", "metadata", I8)?),
                dict_column!(t, "populations", "metadata_offset", U32)?,
            )?,
        };

        let t = table("provenances")?;
        out.provenances = ProvenanceTable {
            timestamp: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "provenances", "timestamp", I8)?),
                dict_column!(t, "provenances", "timestamp_offset", U32)?,
            )?,
            record: RaggedColumn::from_parts(
                i8_to_bytes(&dict_column!(t, "provenances", "record", I8)?),
                dict_column!(t, "provenances", "record_offset", U32)?,
            )?,
        };

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_collection() -> TableCollection {
        let mut tables = TableCollection::new(10.0).unwrap();
        let p = tables.add_population();
        let i = tables.add_individual(0, &[0.5, 1.5]);
        let n0 = tables.add_node(NodeFlags::new_sample(), 0.0, p, i).unwrap();
        let n1 = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let anc = tables
            .add_node(NodeFlags::default(), 1.5, p, IndividualId::NULL)
            .unwrap();
        tables.add_edge(0.0, 10.0, anc, n0).unwrap();
        tables.add_edge(0.0, 10.0, anc, n1).unwrap();
        let s = tables.add_site(3.25, b"A").unwrap();
        tables.add_mutation(s, n0, MutationId::NULL, b"T").unwrap();
        tables
            .add_migration(0.0, 10.0, n1, p, PopulationId::from(0), 0.5)
            .unwrap();
        tables.add_provenance_row("2024-01-01T00:00:00Z", "{\"x\":1}");
        tables
    }

    #[test]
    fn test_add_rows_and_ids() {
        let tables = small_collection();
        assert_eq!(tables.nodes().num_rows(), 3);
        assert_eq!(tables.edges().num_rows(), 2);
        assert_eq!(tables.samples_as_vector(), vec![NodeId::from(0), NodeId::from(1)]);
        let row = tables.nodes().row(NodeId::from(2)).unwrap();
        assert_eq!(row.time, 1.5);
        assert!(!row.flags.is_sample());
    }

    #[test]
    fn test_edge_validation() {
        let mut tables = TableCollection::new(5.0).unwrap();
        let p = tables.add_population();
        let n = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        assert!(tables.add_edge(3.0, 3.0, n, n).is_err());
        assert!(tables.add_edge(0.0, 6.0, n, n).is_err());
        assert!(tables.add_edge(0.0, 1.0, NodeId::NULL, n).is_err());
    }

    #[test]
    fn test_squash_or_add() {
        let mut edges = EdgeTable::default();
        edges.squash_or_add(0.0, 2.0, NodeId::from(5), NodeId::from(1));
        edges.squash_or_add(2.0, 4.0, NodeId::from(5), NodeId::from(1));
        assert_eq!(edges.num_rows(), 1);
        assert_eq!(edges.row(EdgeId::from(0)).unwrap().right, 4.0);
        // Different child breaks the run.
        edges.squash_or_add(4.0, 6.0, NodeId::from(5), NodeId::from(2));
        assert_eq!(edges.num_rows(), 2);
        // Non-abutting interval appends.
        edges.squash_or_add(7.0, 8.0, NodeId::from(5), NodeId::from(2));
        assert_eq!(edges.num_rows(), 3);
    }

    #[test]
    fn test_dict_round_trip() {
        let tables = small_collection();
        let d = tables.asdict();
        let back = TableCollection::fromdict(&d).unwrap();
        assert_eq!(back, tables);
        // And the dict itself is stable.
        assert_eq!(back.asdict(), d);
    }

    #[test]
    fn test_fromdict_rejects_bad_offsets() {
        let tables = small_collection();
        let mut d = tables.asdict();
        let sites = d.tables.get_mut("sites").unwrap();
        sites.insert(
            "ancestral_state_offset".into(),
            ColumnArray::U32(vec![0, 99]),
        );
        assert!(TableCollection::fromdict(&d).is_err());
    }

    #[test]
    fn test_fromdict_rejects_wrong_type() {
        let tables = small_collection();
        let mut d = tables.asdict();
        let edges = d.tables.get_mut("edges").unwrap();
        edges.insert("left".into(), ColumnArray::I32(vec![0]));
        assert!(TableCollection::fromdict(&d).is_err());
    }

    #[test]
    fn test_sort_edges() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let p = tables.add_population();
        let n0 = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let n1 = tables
            .add_node(NodeFlags::default(), 1.0, p, IndividualId::NULL)
            .unwrap();
        let n2 = tables
            .add_node(NodeFlags::default(), 2.0, p, IndividualId::NULL)
            .unwrap();
        tables.add_edge(0.0, 10.0, n2, n1).unwrap();
        tables.add_edge(5.0, 10.0, n1, n0).unwrap();
        tables.add_edge(0.0, 5.0, n1, n0).unwrap();
        tables.sort().unwrap();
        let rows: Vec<_> = tables.edges().iter().collect();
        assert_eq!(rows[0].parent, n1);
        assert_eq!(rows[0].left, 0.0);
        assert_eq!(rows[1].left, 5.0);
        assert_eq!(rows[2].parent, n2);
        tables.check_integrity().unwrap();
    }

    #[test]
    fn test_sort_sites_and_mutations() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let p = tables.add_population();
        let n = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let s0 = tables.add_site(7.0, b"0").unwrap();
        let s1 = tables.add_site(2.0, b"0").unwrap();
        let m0 = tables.add_mutation(s0, n, MutationId::NULL, b"1").unwrap();
        tables.add_mutation(s1, n, MutationId::NULL, b"1").unwrap();
        tables.add_mutation(s0, n, m0, b"0").unwrap();
        tables.sort().unwrap();
        assert_eq!(tables.sites().position, vec![2.0, 7.0]);
        let muts: Vec<_> = tables.mutations().iter().collect();
        assert_eq!(muts[0].site, SiteId::from(0));
        assert_eq!(muts[1].site, SiteId::from(1));
        assert_eq!(muts[2].site, SiteId::from(1));
        // The back-mutation still points at its repositioned parent.
        assert_eq!(muts[2].parent, MutationId::from(1));
    }

    #[test]
    fn test_check_integrity_rejects_time_violation() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let p = tables.add_population();
        let n0 = tables
            .add_node(NodeFlags::new_sample(), 1.0, p, IndividualId::NULL)
            .unwrap();
        let n1 = tables
            .add_node(NodeFlags::default(), 1.0, p, IndividualId::NULL)
            .unwrap();
        tables.add_edge(0.0, 10.0, n1, n0).unwrap();
        assert!(tables.check_integrity().is_err());
    }

    #[test]
    fn test_clear() {
        let mut tables = small_collection();
        tables.clear();
        assert_eq!(tables.nodes().num_rows(), 0);
        assert_eq!(tables.edges().num_rows(), 0);
        assert_eq!(tables.provenances().num_rows(), 0);
        assert_eq!(tables, TableCollection::new(10.0).unwrap());
    }
}
