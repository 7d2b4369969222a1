#![allow(missing_docs)]

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::trace;

use crate::alphabet::{Alphabet, Label};
use crate::{EdgeAcc, StateId};

/// The acceptance condition declared on an [`Sdba`] graph. Both conditions
/// are edge-based with the single set `{0}`; co-Büchi is what the
/// alternation-removal skeleton nominally carries before finalization
/// declares Büchi.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Acceptance {
    /// Runs taking a marked edge infinitely often are rejecting.
    CoBuchi,
    /// Runs taking a marked edge infinitely often are accepting.
    Buchi,
}

/// Property bits of the automaton. `None` means unknown; bits are cleared
/// during construction and only set once verified.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Properties {
    /// Whether universal branching is enabled. Never, for this graph type.
    pub universal_branching: bool,
    /// Whether the whole automaton is deterministic.
    pub deterministic: Option<bool>,
    /// Whether every state covers every letter.
    pub complete: Option<bool>,
    /// Whether the accepting part is deterministic.
    pub semi_deterministic: Option<bool>,
}

/// An edge of the [`Sdba`] graph, held by state handles.
#[derive(Debug, Clone)]
pub struct SdbaEdge {
    dst: StateId,
    label: Label,
    acc: EdgeAcc,
}

impl SdbaEdge {
    pub fn dst(&self) -> StateId {
        self.dst
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn acc(&self) -> EdgeAcc {
        self.acc
    }
}

#[derive(Debug, Clone)]
struct SdbaState {
    name: Option<String>,
    edges: Vec<SdbaEdge>,
}

/// A Büchi automaton graph: an arena of states indexed by integer handles,
/// each holding its outgoing edges. States of the nondeterministic prefix
/// carry the configuration name they were built from; deterministic
/// companion states are unnamed.
#[derive(Debug, Clone)]
pub struct Sdba {
    alphabet: Alphabet,
    states: Vec<SdbaState>,
    initial: Vec<StateId>,
    acceptance: Acceptance,
    properties: Properties,
}

impl Sdba {
    /// Creates an empty graph over the given alphabet.
    pub fn new(alphabet: Alphabet, acceptance: Acceptance) -> Self {
        Self {
            alphabet,
            states: Vec::new(),
            initial: Vec::new(),
            acceptance,
            properties: Properties::default(),
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn acceptance(&self) -> Acceptance {
        self.acceptance
    }

    pub(crate) fn set_acceptance(&mut self, acceptance: Acceptance) {
        self.acceptance = acceptance;
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    /// Appends a state, returning its handle.
    pub fn add_state(&mut self, name: Option<String>) -> StateId {
        self.states.push(SdbaState {
            name,
            edges: Vec::new(),
        });
        self.states.len() - 1
    }

    pub fn state_name(&self, q: StateId) -> Option<&str> {
        self.states[q].name.as_deref()
    }

    pub fn initial_states(&self) -> &[StateId] {
        &self.initial
    }

    pub fn add_initial_state(&mut self, q: StateId) {
        debug_assert!(q < self.states.len());
        if !self.initial.contains(&q) {
            self.initial.push(q);
        }
    }

    /// Iterates the edges leaving `q`.
    pub fn edges_from(&self, q: StateId) -> impl Iterator<Item = &'_ SdbaEdge> + '_ {
        self.states[q].edges.iter()
    }

    /// Appends an edge without merging.
    pub fn add_edge(&mut self, src: StateId, dst: StateId, label: Label, acc: EdgeAcc) {
        debug_assert!(src < self.states.len() && dst < self.states.len());
        self.states[src].edges.push(SdbaEdge { dst, label, acc });
    }

    /// Connects `src` to `dst` under `label`. When an edge with the same
    /// endpoints and acceptance already exists, `label` is disjoined into
    /// its label instead of a parallel edge being appended.
    pub fn add_edge_merged(&mut self, src: StateId, dst: StateId, label: Label, acc: EdgeAcc) {
        debug_assert!(src < self.states.len() && dst < self.states.len());
        let edges = &mut self.states[src].edges;
        if let Some(edge) = edges.iter_mut().find(|e| e.dst == dst && e.acc == acc) {
            edge.label |= &label;
        } else {
            edges.push(SdbaEdge { dst, label, acc });
        }
    }

    /// Merges all parallel edges with identical endpoints and acceptance by
    /// disjoining their labels, keeping first-occurrence order.
    pub fn merge_parallel_edges(&mut self) {
        for state in &mut self.states {
            let mut merged: Vec<SdbaEdge> = Vec::with_capacity(state.edges.len());
            for edge in state.edges.drain(..) {
                if let Some(prev) = merged
                    .iter_mut()
                    .find(|e| e.dst == edge.dst && e.acc == edge.acc)
                {
                    prev.label |= &edge.label;
                } else {
                    merged.push(edge);
                }
            }
            state.edges = merged;
        }
    }

    /// Rewrites [`EdgeAcc::Masked`] to [`EdgeAcc::None`] on all edges of the
    /// states `[0, upto)`.
    pub(crate) fn strip_masked(&mut self, upto: StateId) {
        for state in &mut self.states[..upto] {
            for edge in &mut state.edges {
                if edge.acc == EdgeAcc::Masked {
                    edge.acc = EdgeAcc::None;
                }
            }
        }
    }

    /// Rewrites [`EdgeAcc::Masked`] to [`EdgeAcc::Accepting`] on all edges.
    pub(crate) fn promote_masked(&mut self) {
        for state in &mut self.states {
            for edge in &mut state.edges {
                if edge.acc == EdgeAcc::Masked {
                    edge.acc = EdgeAcc::Accepting;
                }
            }
        }
    }

    /// Whether no two edges of `q` can be taken on the same letter.
    pub fn is_deterministic_state(&self, q: StateId) -> bool {
        let edges = &self.states[q].edges;
        edges
            .iter()
            .tuple_combinations::<(_, _)>()
            .all(|(l, r)| !l.label.overlaps(&r.label))
    }

    /// Whether the label disjunction over the edges of `q` is `true`.
    pub fn is_complete_state(&self, q: StateId) -> bool {
        self.states[q]
            .edges
            .iter()
            .fold(self.alphabet.ff(), |acc, e| acc | &e.label)
            .is_true()
    }

    /// Structural semi-determinism with a caller-chosen accepting set:
    /// every state in the forward closure of the sources of edges selected
    /// by `accepting` must be deterministic.
    pub fn semi_deterministic_by<F>(&self, accepting: F) -> bool
    where
        F: Fn(&SdbaEdge) -> bool,
    {
        let seeds = (0..self.states.len())
            .filter(|q| self.states[*q].edges.iter().any(&accepting))
            .collect_vec();
        self.forward_closure(seeds)
            .into_iter()
            .all(|q| self.is_deterministic_state(q))
    }

    /// Structural semi-determinism with the final accepting set.
    pub fn is_semi_deterministic(&self) -> bool {
        self.semi_deterministic_by(|e| e.acc == EdgeAcc::Accepting)
    }

    fn forward_closure(&self, seeds: Vec<StateId>) -> BTreeSet<StateId> {
        let mut closure = BTreeSet::new();
        let mut stack = seeds;
        while let Some(q) = stack.pop() {
            if !closure.insert(q) {
                continue;
            }
            for edge in &self.states[q].edges {
                if !closure.contains(&edge.dst) {
                    stack.push(edge.dst);
                }
            }
        }
        closure
    }

    /// Decides Büchi acceptance of the ultimately periodic word
    /// `prefix · cycle^ω`, both given as letter indices. Works on the
    /// product of the graph with the lasso: the word is accepted iff some
    /// reachable accepting product edge lies on a cycle.
    pub fn accepts(&self, prefix: &[usize], cycle: &[usize]) -> bool {
        assert!(!cycle.is_empty(), "the periodic part must be non-empty");
        assert_eq!(self.acceptance, Acceptance::Buchi);

        let len = prefix.len() + cycle.len();
        let letter_at = |pos: usize| {
            let i = if pos < prefix.len() {
                prefix[pos]
            } else {
                cycle[pos - prefix.len()]
            };
            self.alphabet.letter(i)
        };
        let advance = |pos: usize| {
            if pos + 1 < len {
                pos + 1
            } else {
                prefix.len()
            }
        };

        // (state, position) product nodes, edges filtered by the letter
        let node = |q: StateId, pos: usize| q * len + pos;
        let mut succs: Vec<Vec<(usize, bool)>> = vec![Vec::new(); self.states.len() * len];
        for q in 0..self.states.len() {
            for pos in 0..len {
                let w = letter_at(pos);
                for edge in &self.states[q].edges {
                    if w.implies(&edge.label) {
                        succs[node(q, pos)]
                            .push((node(edge.dst, advance(pos)), edge.acc == EdgeAcc::Accepting));
                    }
                }
            }
        }

        let reach = |from: usize| {
            let mut seen = vec![false; succs.len()];
            let mut stack = vec![from];
            while let Some(u) = stack.pop() {
                if std::mem::replace(&mut seen[u], true) {
                    continue;
                }
                stack.extend(succs[u].iter().map(|(v, _)| *v));
            }
            seen
        };

        let mut reachable = vec![false; succs.len()];
        for &init in &self.initial {
            let seen = reach(node(init, 0));
            for (u, s) in seen.into_iter().enumerate() {
                reachable[u] = reachable[u] || s;
            }
        }

        for u in 0..succs.len() {
            if !reachable[u] {
                continue;
            }
            for &(v, accepting) in &succs[u] {
                if accepting && reach(v)[u] {
                    trace!("accepting product edge on a reachable cycle");
                    return true;
                }
            }
        }
        false
    }
}

impl std::fmt::Display for Sdba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:?} automaton, {} states, initial {{{}}}",
            self.acceptance,
            self.states.len(),
            self.initial.iter().join(","),
        )?;
        for (q, state) in self.states.iter().enumerate() {
            let name = state
                .name
                .as_ref()
                .map(|n| format!(" \"{n}\""))
                .unwrap_or_default();
            writeln!(f, "  state {q}{name}")?;
            for edge in &state.edges {
                writeln!(
                    f,
                    "    --[{}]--> {}{}",
                    self.alphabet.show(&edge.label),
                    edge.dst,
                    match edge.acc {
                        EdgeAcc::None => "",
                        EdgeAcc::Accepting => " {0}",
                        EdgeAcc::Masked => " {1}",
                    }
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state_buchi() -> Sdba {
        // accepts words with infinitely many `a`s
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let not_a = !a.clone();

        let mut sdba = Sdba::new(alphabet, Acceptance::Buchi);
        let q0 = sdba.add_state(Some("0".to_string()));
        sdba.add_initial_state(q0);
        sdba.add_edge(q0, q0, not_a, EdgeAcc::None);
        sdba.add_edge(q0, q0, a, EdgeAcc::Accepting);
        sdba
    }

    #[test]
    fn edge_merging() {
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let not_a = !a.clone();

        let mut sdba = Sdba::new(alphabet, Acceptance::Buchi);
        let q0 = sdba.add_state(None);
        let q1 = sdba.add_state(None);
        sdba.add_edge_merged(q0, q1, a.clone(), EdgeAcc::None);
        sdba.add_edge_merged(q0, q1, not_a.clone(), EdgeAcc::None);
        sdba.add_edge_merged(q0, q1, a.clone(), EdgeAcc::Accepting);

        // same endpoints and acceptance merged, different acceptance kept
        assert_eq!(sdba.edges_from(q0).count(), 2);
        assert!(sdba
            .edges_from(q0)
            .find(|e| e.acc() == EdgeAcc::None)
            .unwrap()
            .label()
            .is_true());

        let mut parallel = Sdba::new(Alphabet::new(["a"]), Acceptance::Buchi);
        let p0 = parallel.add_state(None);
        let p1 = parallel.add_state(None);
        parallel.add_edge(p0, p1, a.clone(), EdgeAcc::None);
        parallel.add_edge(p0, p1, not_a, EdgeAcc::None);
        parallel.add_edge(p0, p1, a, EdgeAcc::Accepting);
        parallel.merge_parallel_edges();
        assert_eq!(parallel.edges_from(p0).count(), 2);
    }

    #[test]
    fn lasso_acceptance() {
        let sdba = two_state_buchi();

        // `a` at letter index 1, `!a` at index 0
        assert!(sdba.accepts(&[], &[1]));
        assert!(sdba.accepts(&[0, 0, 0], &[0, 1]));
        assert!(!sdba.accepts(&[1, 1, 1], &[0]));
        assert!(!sdba.accepts(&[], &[0, 0]));
    }

    #[test]
    fn semi_determinism_test() {
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let not_a = !a.clone();
        let tt = alphabet.tt();

        // nondeterministic prefix state guessing into a deterministic
        // accepting sink
        let mut sdba = Sdba::new(alphabet, Acceptance::Buchi);
        let q0 = sdba.add_state(None);
        let q1 = sdba.add_state(None);
        sdba.add_initial_state(q0);
        sdba.add_edge(q0, q0, tt.clone(), EdgeAcc::None);
        sdba.add_edge(q0, q1, a.clone(), EdgeAcc::None);
        sdba.add_edge(q1, q1, tt, EdgeAcc::Accepting);

        assert!(!sdba.is_deterministic_state(q0));
        assert!(sdba.is_deterministic_state(q1));
        assert!(sdba.is_complete_state(q0));
        assert!(sdba.is_semi_deterministic());

        // an accepting edge out of the nondeterministic state breaks it
        sdba.add_edge(q0, q0, not_a, EdgeAcc::Accepting);
        assert!(!sdba.is_semi_deterministic());
    }
}
