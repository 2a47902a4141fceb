//! Log-likelihood of a complete ancestral recombination graph under the
//! standard coalescent with recombination.
//!
//! The input tables must record the full ARG (see
//! [`SimulationOptions::STORE_FULL_ARG`](crate::SimulationOptions::STORE_FULL_ARG)):
//! recombination nodes carry `IS_RE_EVENT` and arrive in left/right
//! pairs, common-ancestor events have exactly two distinct children, and
//! migration nodes are unary pass-throughs that contribute no rate terms.

use std::collections::BTreeMap;

use crate::tables::TableCollection;
use crate::{NodeFlags, SimError};

#[derive(Clone, Debug)]
struct EventGroup {
    parent: i32,
    time: f64,
    flags: NodeFlags,
    children: Vec<i32>,
    left: f64,
    right: f64,
}

/// Compute `log P` of the ARG in `tables` under Hudson's coalescent at
/// effective size `ne` and per-link recombination rate
/// `recombination_rate`.
///
/// Lineage counts and link totals are reconstructed by replaying the
/// flagged events in time order; each event contributes its log rate and
/// each inter-event epoch contributes the log waiting-time density
/// `-(k(k-1)/(4Nₑ) + r·links)·Δt`.
///
/// # Errors
///
/// [`SimError::Input`] for a negative `recombination_rate` or
/// non-positive `ne`; [`SimError::Tables`] when the tables do not form a
/// binary ARG.
pub fn log_arg_likelihood(
    tables: &TableCollection,
    recombination_rate: f64,
    ne: f64,
) -> Result<f64, SimError> {
    if !(recombination_rate >= 0.0) {
        return Err(input_error!(
            "recombination rate",
            "must be non-negative"
        ));
    }
    if !(ne > 0.0) {
        return Err(input_error!(
            "effective population size",
            "must be positive"
        ));
    }

    let mut groups: BTreeMap<i32, EventGroup> = BTreeMap::new();
    for e in tables.edges().iter() {
        let parent = e.parent.raw();
        let group = groups.entry(parent).or_insert_with(|| EventGroup {
            parent,
            time: tables.nodes().time(e.parent).unwrap(),
            flags: tables.nodes().flags(e.parent).unwrap(),
            children: Vec::new(),
            left: e.left,
            right: e.right,
        });
        if !group.children.contains(&e.child.raw()) {
            group.children.push(e.child.raw());
        }
        group.left = group.left.min(e.left);
        group.right = group.right.max(e.right);
    }
    let mut order: Vec<EventGroup> = groups.into_values().collect();
    order.sort_by(|a, b| {
        a.time
            .partial_cmp(&b.time)
            .unwrap()
            .then(a.parent.cmp(&b.parent))
    });

    // Extant lineage extents, keyed by node id.  A node that never
    // appears as a child is a root: its material leaves the process at
    // its own event.
    let mut appears_as_child: std::collections::BTreeSet<i32> = Default::default();
    for e in tables.edges().iter() {
        appears_as_child.insert(e.child.raw());
    }
    let mut extents: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
    for row in tables.nodes().iter() {
        if row.flags.is_sample() {
            extents.insert(row.id.raw(), (0.0, tables.sequence_length()));
        }
    }
    let total_links = |extents: &BTreeMap<i32, (f64, f64)>| -> f64 {
        extents.values().map(|(l, r)| r - l).sum()
    };

    let mut ret = 0.0;
    let mut t_prev = 0.0;
    let mut i = 0;
    while i < order.len() {
        let g = &order[i];
        let k = extents.len() as f64;
        let links = total_links(&extents);
        let rate = k * (k - 1.0) / (4.0 * ne) + recombination_rate * links;
        ret -= rate * (g.time - t_prev);
        t_prev = g.time;

        if g.flags.contains(NodeFlags::IS_RE_EVENT) {
            // Paired left/right nodes splitting one lineage.
            let partner = order.get(i + 1).ok_or_else(|| {
                SimError::Tables("unpaired recombination node".to_string())
            })?;
            if !partner.flags.contains(NodeFlags::IS_RE_EVENT)
                || partner.time != g.time
                || g.children.len() != 1
                || partner.children != g.children
            {
                return Err(SimError::Tables(
                    "recombination nodes must arrive in pairs over one child".to_string(),
                ));
            }
            if recombination_rate == 0.0 {
                return Ok(f64::NEG_INFINITY);
            }
            if extents.remove(&g.children[0]).is_none() {
                return Err(SimError::Tables(format!(
                    "recombination child {} is not extant",
                    g.children[0]
                )));
            }
            let partner = partner.clone();
            if appears_as_child.contains(&g.parent) {
                extents.insert(g.parent, (g.left, g.right));
            }
            if appears_as_child.contains(&partner.parent) {
                extents.insert(partner.parent, (partner.left, partner.right));
            }
            ret += recombination_rate.ln();
            i += 2;
        } else {
            match g.children.len() {
                1 => {
                    // Unary node (migration or non-sample root pass):
                    // material flows through, no rate contribution.
                    if extents.remove(&g.children[0]).is_none() {
                        return Err(SimError::Tables(format!(
                            "child {} is not extant",
                            g.children[0]
                        )));
                    }
                    if appears_as_child.contains(&g.parent) {
                        extents.insert(g.parent, (g.left, g.right));
                    }
                }
                2 => {
                    for c in &g.children {
                        if extents.remove(c).is_none() {
                            return Err(SimError::Tables(format!(
                                "child {} is not extant",
                                c
                            )));
                        }
                    }
                    if appears_as_child.contains(&g.parent) {
                        extents.insert(g.parent, (g.left, g.right));
                    }
                    ret += (1.0 / (2.0 * ne)).ln();
                }
                _ => {
                    return Err(SimError::Tables(
                        "the ARG likelihood requires binary mergers".to_string(),
                    ));
                }
            }
            i += 1;
        }
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndividualId, NodeFlags, TableCollection};

    // Two samples coalescing at time t over [0, 1): the classic
    // single-tree history with no recombination.
    fn single_pair_tables(t: f64) -> TableCollection {
        let mut tables = TableCollection::new(1.0).unwrap();
        let p = tables.add_population();
        let s0 = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let s1 = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let root = tables
            .add_node(NodeFlags::default(), t, p, IndividualId::NULL)
            .unwrap();
        tables.add_edge(0.0, 1.0, root, s0).unwrap();
        tables.add_edge(0.0, 1.0, root, s1).unwrap();
        tables
    }

    #[test]
    fn test_single_pair_closed_form() {
        // log P = log(1/(2N)) - (1/(2N) + 2 r L) t
        let t = 0.5;
        let tables = single_pair_tables(t);
        for (r, ne) in [(0.0f64, 1.0f64), (1.0f64, 1.0f64), (0.5f64, 2.0f64)] {
            let expected = (1.0 / (2.0 * ne)).ln() - (1.0 / (2.0 * ne) + 2.0 * r) * t;
            let got = log_arg_likelihood(&tables, r, ne).unwrap();
            assert!((got - expected).abs() < 1e-12, "r={} ne={}", r, ne);
        }
    }

    #[test]
    fn test_input_validation() {
        let tables = single_pair_tables(1.0);
        assert!(log_arg_likelihood(&tables, -1.0, 1.0).is_err());
        assert!(log_arg_likelihood(&tables, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_recombination_with_zero_rate_is_impossible() {
        let mut tables = TableCollection::new(1.0).unwrap();
        let p = tables.add_population();
        let s0 = tables
            .add_node(NodeFlags::new_sample(), 0.0, p, IndividualId::NULL)
            .unwrap();
        let lhs = tables
            .add_node(NodeFlags::default().mark_re_event(), 0.25, p, IndividualId::NULL)
            .unwrap();
        let rhs = tables
            .add_node(NodeFlags::default().mark_re_event(), 0.25, p, IndividualId::NULL)
            .unwrap();
        let root = tables
            .add_node(NodeFlags::default(), 1.0, p, IndividualId::NULL)
            .unwrap();
        tables.add_edge(0.0, 0.5, lhs, s0).unwrap();
        tables.add_edge(0.5, 1.0, rhs, s0).unwrap();
        tables.add_edge(0.0, 0.5, root, lhs).unwrap();
        tables.add_edge(0.5, 1.0, root, rhs).unwrap();
        let ll = log_arg_likelihood(&tables, 0.0, 1.0).unwrap();
        assert_eq!(ll, f64::NEG_INFINITY);
        assert!(log_arg_likelihood(&tables, 0.1, 1.0).unwrap().is_finite());
    }

    #[test]
    fn test_full_arg_likelihood_is_finite() {
        use crate::{RecombinationMap, Sample, SimulationConfig, SimulationOptions, Simulator};
        let mut config = SimulationConfig::new(
            vec![Sample::new(0, 0.0), Sample::new(0, 0.0), Sample::new(0, 0.0)],
            RecombinationMap::uniform(1.0, 0.5, false).unwrap(),
        );
        config.seed = 17;
        config.options = SimulationOptions::NONE.store_full_arg();
        let mut sim = Simulator::new(config).unwrap();
        sim.run_to_completion().unwrap();
        sim.finalise_tables().unwrap();
        let tables = sim.into_tables();
        let ll = log_arg_likelihood(&tables, 0.5, 1.0).unwrap();
        assert!(ll.is_finite());
        assert!(ll < 0.0);
    }
}
