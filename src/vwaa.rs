use std::collections::BTreeSet;
use std::fmt::Display;

use itertools::Itertools;

use crate::alphabet::{Alphabet, Label};
use crate::{EdgeAcc, StateId};

/// An alternating edge `(src, label, dests, acc)`. The destination set is
/// universal, a run must satisfy all of its members.
#[derive(Debug, Clone)]
pub struct VwaaEdge {
    label: Label,
    dests: Vec<StateId>,
    acc: EdgeAcc,
}

impl VwaaEdge {
    /// The propositional guard of the edge.
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// The universal destinations, flat per edge.
    pub fn dests(&self) -> &[StateId] {
        &self.dests
    }

    /// The acceptance mark of the edge.
    pub fn acc(&self) -> EdgeAcc {
        self.acc
    }

    pub(crate) fn set_acc(&mut self, acc: EdgeAcc) {
        self.acc = acc;
    }

    /// Whether the edge loops back onto `src`.
    pub fn loops_on(&self, src: StateId) -> bool {
        self.dests.contains(&src)
    }
}

#[derive(Debug, Clone)]
struct VwaaState {
    name: String,
    edges: Vec<VwaaEdge>,
}

/// A very weak alternating automaton with self-loops and edge-based co-Büchi
/// acceptance on a single set.
///
/// Every strongly connected component is assumed to be a singleton and every
/// non-trivial one a self-loop; these properties come from the producer and
/// are not re-verified here. The distinguished `TT` state is the last index
/// by convention.
#[derive(Debug, Clone)]
pub struct Vwaa {
    alphabet: Alphabet,
    states: Vec<VwaaState>,
    initial: Vec<BTreeSet<StateId>>,
}

impl Vwaa {
    /// Starts building an automaton over the given alphabet.
    pub fn builder(alphabet: Alphabet) -> VwaaBuilder {
        VwaaBuilder {
            alphabet,
            names: Vec::new(),
            edges: Vec::new(),
            initial: Vec::new(),
        }
    }

    /// The alphabet the edge labels live over.
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// The distinguished true state, conventionally the last index.
    pub fn tt_state(&self) -> StateId {
        self.states.len() - 1
    }

    /// The initial configurations. Each is a set of states that must all be
    /// satisfied, the automaton accepts from any one configuration.
    pub fn initial_configurations(&self) -> &[BTreeSet<StateId>] {
        &self.initial
    }

    /// The name metadata of state `q`.
    pub fn state_name(&self, q: StateId) -> &str {
        &self.states[q].name
    }

    /// Iterates the alternating edges leaving `q`.
    pub fn edges_from(&self, q: StateId) -> impl Iterator<Item = &'_ VwaaEdge> + '_ {
        self.states[q].edges.iter()
    }

    pub(crate) fn edges_from_mut(
        &mut self,
        q: StateId,
    ) -> impl Iterator<Item = &'_ mut VwaaEdge> + '_ {
        self.states[q].edges.iter_mut()
    }

    /// Rewrites all state names to the state's decimal index. Downstream
    /// code parses configuration names as comma-separated indices, so this
    /// must happen before alternation removal.
    pub fn rename_states_to_indices(&mut self) {
        for (q, state) in self.states.iter_mut().enumerate() {
            state.name = q.to_string();
        }
    }
}

impl Display for Vwaa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "VWAA over {{{}}}, initial {}",
            self.alphabet.apnames().join(", "),
            self.initial
                .iter()
                .map(|conf| format!("{{{}}}", conf.iter().join(",")))
                .join(" | ")
        )?;
        for (q, state) in self.states.iter().enumerate() {
            for edge in &state.edges {
                writeln!(
                    f,
                    "  {} --[{}]--> {{{}}} {:?}",
                    state.name,
                    self.alphabet.show(&edge.label),
                    edge.dests.iter().join(","),
                    edge.acc,
                )?;
            }
            if state.edges.is_empty() {
                writeln!(f, "  {} (no edges)", q)?;
            }
        }
        Ok(())
    }
}

/// Builds a [`Vwaa`] state by state and edge by edge, for producers and
/// tests.
pub struct VwaaBuilder {
    alphabet: Alphabet,
    names: Vec<String>,
    edges: Vec<(StateId, Label, Vec<StateId>, EdgeAcc)>,
    initial: Vec<BTreeSet<StateId>>,
}

impl VwaaBuilder {
    /// Appends states with the given names. The last state added overall is
    /// taken to be the `TT` state.
    pub fn with_states<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.names.extend(names.into_iter().map(|n| n.to_string()));
        self
    }

    /// Adds an alternating edge from `src` to the universal destination set
    /// `dests` under `label`, with the given acceptance mark.
    pub fn with_edge<D>(mut self, src: StateId, label: Label, dests: D, acc: EdgeAcc) -> Self
    where
        D: IntoIterator<Item = StateId>,
    {
        self.edges
            .push((src, label, dests.into_iter().collect(), acc));
        self
    }

    /// Adds an initial configuration, a conjunction of states.
    pub fn with_initial<I>(mut self, configuration: I) -> Self
    where
        I: IntoIterator<Item = StateId>,
    {
        self.initial.push(configuration.into_iter().collect());
        self
    }

    /// Finishes the build.
    ///
    /// # Panics
    /// Panics when no state was added or an edge or initial configuration
    /// refers to a state out of range.
    pub fn into_vwaa(self) -> Vwaa {
        let n = self.names.len();
        assert!(n > 0, "automaton needs at least one state");

        let mut states = self
            .names
            .into_iter()
            .map(|name| VwaaState {
                name,
                edges: Vec::new(),
            })
            .collect_vec();

        for (src, label, dests, acc) in self.edges {
            assert!(src < n, "edge source {src} out of range");
            assert!(
                dests.iter().all(|d| *d < n),
                "edge destination out of range"
            );
            states[src].edges.push(VwaaEdge { label, dests, acc });
        }
        for conf in &self.initial {
            assert!(
                conf.iter().all(|q| *q < n),
                "initial configuration out of range"
            );
        }

        Vwaa {
            alphabet: self.alphabet,
            states,
            initial: self.initial,
        }
    }
}
