use std::collections::{BTreeMap, BTreeSet, VecDeque};

use itertools::Itertools;
use tracing::trace;

use crate::sdba::{Acceptance, Sdba};
use crate::vwaa::Vwaa;
use crate::{EdgeAcc, StateId};

fn intern(
    conf: BTreeSet<StateId>,
    sdba: &mut Sdba,
    index: &mut BTreeMap<BTreeSet<StateId>, StateId>,
    worklist: &mut VecDeque<BTreeSet<StateId>>,
) -> StateId {
    if let Some(&id) = index.get(&conf) {
        return id;
    }
    let name = if conf.is_empty() {
        "{}".to_string()
    } else {
        conf.iter().join(",")
    };
    let id = sdba.add_state(Some(name));
    index.insert(conf.clone(), id);
    worklist.push_back(conf);
    id
}

/// Removes alternation from `vwaa`, producing the nondeterministic skeleton
/// whose states are configurations, named by the comma-separated indices of
/// their members (the empty configuration is named `{}`).
///
/// A skeleton move existentially picks one alternating edge per
/// configuration member: its label is the conjunction of the picked labels
/// (unsatisfiable picks are dropped), its destination the union of the
/// universal destination sets, and it carries the internal
/// [`EdgeAcc::Masked`] tag iff some picked edge does. No emitted edge is
/// accepting. Configurations are deduplicated by their state set; the
/// initial skeleton states are the initial configurations of `vwaa`, in
/// order.
pub fn remove_alternation(vwaa: &Vwaa) -> Sdba {
    let mut sdba = Sdba::new(vwaa.alphabet().clone(), Acceptance::CoBuchi);
    let mut index = BTreeMap::new();
    let mut worklist = VecDeque::new();

    for conf in vwaa.initial_configurations() {
        let id = intern(conf.clone(), &mut sdba, &mut index, &mut worklist);
        sdba.add_initial_state(id);
    }

    while let Some(conf) = worklist.pop_front() {
        let src = index[&conf];

        if conf.is_empty() {
            // the sink configuration has nothing left to satisfy
            sdba.add_edge_merged(src, src, vwaa.alphabet().tt(), EdgeAcc::None);
            continue;
        }

        let choices = conf
            .iter()
            .map(|&q| vwaa.edges_from(q).collect_vec())
            .collect_vec();
        if choices.iter().any(|edges| edges.is_empty()) {
            trace!("configuration {} has a blocked member", sdba.state_name(src).unwrap());
            continue;
        }

        for combo in choices
            .iter()
            .map(|edges| edges.iter().copied())
            .multi_cartesian_product()
        {
            let label = combo
                .iter()
                .fold(vwaa.alphabet().tt(), |acc, e| acc & e.label());
            if label.is_false() {
                continue;
            }

            let dests: BTreeSet<StateId> = combo
                .iter()
                .flat_map(|e| e.dests().iter().copied())
                .collect();
            let acc = if combo.iter().any(|e| e.acc() != EdgeAcc::None) {
                EdgeAcc::Masked
            } else {
                EdgeAcc::None
            };

            let dst = intern(dests, &mut sdba, &mut index, &mut worklist);
            sdba.add_edge_merged(src, dst, label, acc);
        }
    }

    trace!("alternation removal produced {} configurations", sdba.size());
    sdba
}
