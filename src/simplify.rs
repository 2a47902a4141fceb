//! Table simplification.
//!
//! Reduces a table collection to the minimal history of a set of sample
//! nodes, preserving marginal tree topology: ancestry segments are
//! propagated child-to-parent in time order, output nodes are allocated
//! only where lineages coalesce (or for the samples themselves), and
//! edges are emitted squashed.

use std::collections::BTreeMap;

use crate::recorder::Recorder;
use crate::tables::TableCollection;
use crate::{MutationId, NodeFlags, NodeId, SimError};

#[derive(Clone, Copy, Debug)]
struct AncestrySegment {
    left: f64,
    right: f64,
    node: NodeId,
}

/// Simplify `tables` in place against `samples`.
///
/// Returns the map from input node id to output node id
/// ([`NodeId::NULL`] for nodes with no surviving ancestry).  Sample nodes
/// are numbered first, in the order given.
pub fn simplify_tables(
    tables: &mut TableCollection,
    samples: &[NodeId],
) -> Result<Vec<NodeId>, SimError> {
    let num_input_nodes = tables.nodes().num_rows();
    if samples.is_empty() {
        return Err(input_error!("samples", "at least one sample required"));
    }
    let mut is_sample = vec![false; num_input_nodes];
    for s in samples {
        let u = s
            .to_usize()
            .filter(|u| *u < num_input_nodes)
            .ok_or(SimError::IndexError)?;
        if is_sample[u] {
            return Err(input_error!("samples", "duplicate sample {}", s));
        }
        is_sample[u] = true;
    }

    let sequence_length = tables.sequence_length();
    let mut output = TableCollection::new(sequence_length)?;
    for _ in 0..tables.populations().num_rows() {
        output.add_population();
    }
    for row in tables.individuals().iter() {
        output.add_individual(row.flags, &row.location);
    }

    let mut node_map = vec![NodeId::NULL; num_input_nodes];
    let mut ancestry: Vec<Vec<AncestrySegment>> = vec![Vec::new(); num_input_nodes];
    for s in samples {
        let u = s.as_usize();
        let row = tables.nodes().row(*s).unwrap();
        let new_id = output.add_node(
            row.flags.mark_sample(),
            row.time,
            row.population,
            row.individual,
        )?;
        node_map[u] = new_id;
        ancestry[u].push(AncestrySegment {
            left: 0.0,
            right: sequence_length,
            node: new_id,
        });
    }

    // Group input edges by parent; parents are then visited in
    // (time, id) order so children's ancestry is complete first.
    let mut edges_by_parent: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (j, row) in tables.edges().iter().enumerate() {
        edges_by_parent.entry(row.parent.raw()).or_default().push(j);
    }
    let mut parents: Vec<i32> = edges_by_parent.keys().copied().collect();
    parents.sort_by(|a, b| {
        let ta = tables.nodes().time(NodeId::from(*a)).unwrap();
        let tb = tables.nodes().time(NodeId::from(*b)).unwrap();
        ta.partial_cmp(&tb).unwrap().then(a.cmp(b))
    });

    let mut recorder = Recorder::default();
    for parent in parents {
        let pu = parent as usize;
        let mut queue: Vec<AncestrySegment> = Vec::new();
        for j in &edges_by_parent[&parent] {
            let e = tables.edges().row(crate::EdgeId::try_from(*j).unwrap()).unwrap();
            for x in &ancestry[e.child.as_usize()] {
                if x.right > e.left && e.right > x.left {
                    queue.push(AncestrySegment {
                        left: x.left.max(e.left),
                        right: x.right.min(e.right),
                        node: x.node,
                    });
                }
            }
        }
        if queue.is_empty() {
            continue;
        }
        queue.sort_by(|a, b| {
            a.left
                .partial_cmp(&b.left)
                .unwrap()
                .then(a.node.cmp(&b.node))
        });
        // Consume from the front; remainders are re-inserted in order.
        let mut queue = std::collections::VecDeque::from(queue);
        let mut output_id = node_map[pu];
        let mut new_ancestry: Vec<AncestrySegment> = Vec::new();
        let force_output = is_sample[pu];
        while let Some(head) = queue.pop_front() {
            let l = head.left;
            let mut r = head.right;
            let mut overlaps = vec![head];
            while queue.front().map_or(false, |x| x.left == l) {
                let x = queue.pop_front().unwrap();
                r = r.min(x.right);
                overlaps.push(x);
            }
            if let Some(next) = queue.front() {
                r = r.min(next.left);
            }
            if overlaps.len() == 1 && !force_output {
                // Pass through without a new node.
                let x = overlaps[0];
                new_ancestry.push(AncestrySegment {
                    left: l,
                    right: r,
                    node: x.node,
                });
                if x.right > r {
                    insert_sorted(
                        &mut queue,
                        AncestrySegment {
                            left: r,
                            right: x.right,
                            node: x.node,
                        },
                    );
                }
            } else {
                if output_id.is_null() {
                    let row = tables.nodes().row(NodeId::from(parent)).unwrap();
                    output_id =
                        output.add_node(row.flags, row.time, row.population, row.individual)?;
                    node_map[pu] = output_id;
                }
                for o in &overlaps {
                    recorder.record_edge(l, r, output_id, o.node);
                    if o.right > r {
                        insert_sorted(
                            &mut queue,
                            AncestrySegment {
                                left: r,
                                right: o.right,
                                node: o.node,
                            },
                        );
                    }
                }
                new_ancestry.push(AncestrySegment {
                    left: l,
                    right: r,
                    node: output_id,
                });
            }
        }
        // Squash abutting ancestry pieces mapping to the same output node.
        let mut squashed: Vec<AncestrySegment> = Vec::new();
        for seg in new_ancestry {
            match squashed.last_mut() {
                Some(last) if last.right == seg.left && last.node == seg.node => {
                    last.right = seg.right;
                }
                _ => squashed.push(seg),
            }
        }
        ancestry[pu] = squashed;
        recorder.flush(&mut output);
    }

    // Sites are kept as-is; mutations survive when their node does.
    for row in tables.sites().iter() {
        output.sites_mut().add_row(row.position, &row.ancestral_state, &row.metadata);
    }
    let num_input_mutations = tables.mutations().num_rows();
    let mut mutation_map = vec![MutationId::NULL; num_input_mutations];
    for (j, row) in tables.mutations().iter().enumerate() {
        let mapped = node_map[row.node.as_usize()];
        if mapped.is_null() {
            continue;
        }
        // Nearest surviving ancestral mutation.
        let mut parent = row.parent;
        while !parent.is_null() && mutation_map[parent.as_usize()].is_null() {
            parent = tables.mutations().row(parent).unwrap().parent;
        }
        let new_parent = if parent.is_null() {
            MutationId::NULL
        } else {
            mutation_map[parent.as_usize()]
        };
        mutation_map[j] = output.mutations_mut().add_row(
            row.site,
            mapped,
            new_parent,
            &row.derived_state,
            &row.metadata,
        );
    }
    // Migration rows whose node survives are remapped; the rest are
    // dropped together with their lineages.
    for row in tables.migrations().iter() {
        let mapped = node_map[row.node.as_usize()];
        if !mapped.is_null() {
            output.add_migration(row.left, row.right, mapped, row.source, row.dest, row.time)?;
        }
    }
    for row in tables.provenances().iter() {
        output.add_provenance_row(&row.timestamp, &row.record);
    }

    output.sort()?;
    *tables = output;
    Ok(node_map)
}

fn insert_sorted(
    queue: &mut std::collections::VecDeque<AncestrySegment>,
    seg: AncestrySegment,
) {
    let pos = queue
        .iter()
        .position(|x| x.left > seg.left)
        .unwrap_or(queue.len());
    queue.insert(pos, seg);
}

impl TableCollection {
    /// Simplify in place against `samples`; see [`simplify_tables`].
    pub fn simplify(&mut self, samples: &[NodeId]) -> Result<Vec<NodeId>, SimError> {
        simplify_tables(self, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndividualId, PopulationId};

    // Two samples, a redundant unary chain, and an MRCA.
    fn chain_tables() -> TableCollection {
        let mut t = TableCollection::new(10.0).unwrap();
        let p = t.add_population();
        let s0 = t
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let s1 = t
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let unary = t
            .add_node(NodeFlags::default(), 1.0, p, IndividualId::NULL)
            .unwrap();
        let root = t
            .add_node(NodeFlags::default(), 2.0, p, IndividualId::NULL)
            .unwrap();
        t.add_edge(0.0, 10.0, unary, s0).unwrap();
        t.add_edge(0.0, 10.0, root, unary).unwrap();
        t.add_edge(0.0, 10.0, root, s1).unwrap();
        t
    }

    #[test]
    fn test_unary_chain_removed() {
        let mut t = chain_tables();
        let map = t
            .simplify(&[NodeId::from(0), NodeId::from(1)])
            .unwrap();
        assert_eq!(t.nodes().num_rows(), 3);
        assert_eq!(t.edges().num_rows(), 2);
        assert_eq!(map[0], NodeId::from(0));
        assert_eq!(map[1], NodeId::from(1));
        assert!(map[2].is_null());
        assert_eq!(map[3], NodeId::from(2));
        t.check_integrity().unwrap();
    }

    #[test]
    fn test_sample_order_defines_ids() {
        let mut t = chain_tables();
        let map = t
            .simplify(&[NodeId::from(1), NodeId::from(0)])
            .unwrap();
        assert_eq!(map[1], NodeId::from(0));
        assert_eq!(map[0], NodeId::from(1));
    }

    #[test]
    fn test_partial_overlap_coalescence() {
        let mut t = TableCollection::new(10.0).unwrap();
        let p = t.add_population();
        let s0 = t
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let s1 = t
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let a = t
            .add_node(NodeFlags::default(), 1.0, p, IndividualId::NULL)
            .unwrap();
        // Coalescence over [0, 4) only; [4, 10) stays uncoalesced.
        t.add_edge(0.0, 4.0, a, s0).unwrap();
        t.add_edge(0.0, 4.0, a, s1).unwrap();
        let map = t.simplify(&[s0, s1]).unwrap();
        assert_eq!(t.nodes().num_rows(), 3);
        let edges: Vec<_> = t.edges().iter().collect();
        assert_eq!(edges.len(), 2);
        for e in edges {
            assert_eq!(e.parent, map[a.as_usize()]);
            assert_eq!((e.left, e.right), (0.0, 4.0));
        }
    }

    #[test]
    fn test_mutations_follow_nodes() {
        let mut t = chain_tables();
        let s = t.add_site(5.0, b"A").unwrap();
        let m0 = t
            .add_mutation(s, NodeId::from(2), MutationId::NULL, b"G")
            .unwrap();
        t.add_mutation(s, NodeId::from(0), m0, b"T").unwrap();
        let map = t.simplify(&[NodeId::from(0), NodeId::from(1)]).unwrap();
        // The unary node is gone; its mutation goes with it, and the
        // surviving mutation's parent chain is rewired past it.
        assert_eq!(t.sites().num_rows(), 1);
        assert_eq!(t.mutations().num_rows(), 1);
        let m = t.mutations().iter().next().unwrap();
        assert_eq!(m.node, map[0]);
        assert!(m.parent.is_null());
    }

    #[test]
    fn test_duplicate_samples_rejected() {
        let mut t = chain_tables();
        assert!(t.simplify(&[NodeId::from(0), NodeId::from(0)]).is_err());
        assert!(t.simplify(&[]).is_err());
        assert!(t.simplify(&[NodeId::from(99)]).is_err());
    }

    #[test]
    fn test_populations_preserved() {
        let mut t = TableCollection::new(1.0).unwrap();
        let p0 = t.add_population();
        let p1 = t.add_population();
        assert_eq!((p0, p1), (PopulationId::from(0), PopulationId::from(1)));
        let s0 = t
            .add_node(NodeFlags::new_sample(), 0.0, p1, IndividualId::NULL)
            .unwrap();
        t.simplify(&[s0]).unwrap();
        assert_eq!(t.populations().num_rows(), 2);
        assert_eq!(
            t.nodes().population(NodeId::from(0)).unwrap(),
            PopulationId::from(1)
        );
    }
}
