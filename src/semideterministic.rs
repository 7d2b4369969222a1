use std::collections::{BTreeSet, HashMap, VecDeque};

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::alphabet::Label;
use crate::alternation::remove_alternation;
use crate::classify::Classification;
use crate::config::Configuration;
use crate::formula::{Conjunction, StateFormula, StateVars, VariableOutOfRange};
use crate::sdba::{Acceptance, Sdba};
use crate::vwaa::Vwaa;
use crate::{EdgeAcc, StateId};

/// Options consumed by the construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Emit a detailed step-by-step trace of the deterministic-component
    /// construction to the diagnostic stream.
    pub debug: bool,
}

/// A fatal problem that aborts the construction. Recoverable problems, such
/// as a malformed configuration name, are logged and skipped instead.
#[derive(Error, Debug)]
pub enum ConstructionError {
    /// A state was used as an obligation variable outside the reserved
    /// variable space.
    #[error(transparent)]
    Variable(#[from] VariableOutOfRange),
}

/// Enumerates the committed subsets `R` of a configuration, walking its
/// members in ascending order: `Qmust` members are included unconditionally,
/// `Qmay` members branch on inclusion, all others are skipped. The `{}`
/// placeholder is likewise unconditional and carries no state of its own.
/// The walk is an explicit stack over partial choices, its size bounded by
/// the power set of the branching members.
fn enumerate_r(conf: &Configuration, class: &Classification) -> Vec<BTreeSet<StateId>> {
    let members = conf.states().collect_vec();

    let mut out = Vec::new();
    let mut stack: Vec<(usize, BTreeSet<StateId>)> = vec![(0, BTreeSet::new())];
    while let Some((mut i, mut r)) = stack.pop() {
        loop {
            if i == members.len() {
                out.push(r);
                break;
            }
            let q = members[i];
            i += 1;
            if class.qmust(q) {
                r.insert(q);
            } else if class.qmay(q) {
                // the branch that omits q is deferred
                stack.push((i, r.clone()));
                r.insert(q);
            }
        }
    }
    out
}

/// The structural identity of a deterministic-component state.
#[derive(Clone, Eq, PartialEq, Hash)]
struct Triple {
    r: Vec<StateId>,
    phi1: StateFormula,
    phi2: StateFormula,
}

/// What a deterministic-component state needs for computing successors: its
/// triple and the configuration it was seeded from.
#[derive(Clone)]
struct DetState {
    conf: Configuration,
    r: BTreeSet<StateId>,
    phi1: StateFormula,
    phi2: StateFormula,
}

struct DetPartBuilder<'a> {
    vwaa: &'a Vwaa,
    vars: StateVars,
    options: Options,
    letters: Vec<Label>,
    known: HashMap<Triple, StateId>,
    info: HashMap<StateId, DetState>,
    worklist: VecDeque<StateId>,
}

impl<'a> DetPartBuilder<'a> {
    fn new(vwaa: &'a Vwaa, options: Options) -> Self {
        Self {
            vwaa,
            // the variable space covers every state usable as an obligation
            vars: StateVars::new(vwaa.size()),
            options,
            letters: vwaa.alphabet().letters().collect(),
            known: HashMap::new(),
            info: HashMap::new(),
            worklist: VecDeque::new(),
        }
    }

    /// The obligation standing in for a discharged one: the variable of the
    /// distinguished true state.
    fn discharged(&self) -> Result<StateFormula, VariableOutOfRange> {
        self.vars.var(self.vwaa.tt_state())
    }

    /// Maps a destination to its obligation: discharged when it lands in
    /// `R`, its own variable otherwise.
    fn dest_obligation(
        &self,
        d: StateId,
        r: &BTreeSet<StateId>,
    ) -> Result<StateFormula, VariableOutOfRange> {
        if r.contains(&d) {
            self.discharged()
        } else {
            self.vars.var(d)
        }
    }

    /// The obligations a fresh `(C, R)` commitment carries under the letter
    /// `w`. States outside `R` contribute the destinations of all their
    /// matching edges when they are configuration members; states inside `R`
    /// are owed in the second component and contribute destinations of
    /// matching modified (unmarked) edges.
    fn initial_phis(
        &self,
        conf: &Configuration,
        r: &BTreeSet<StateId>,
        w: &Label,
    ) -> Result<(StateFormula, StateFormula), VariableOutOfRange> {
        let mut phi1 = Conjunction::new();
        let mut phi2 = Conjunction::new();

        for q in 0..self.vwaa.size() {
            if !r.contains(&q) {
                if !conf.contains(q) {
                    continue;
                }
                for edge in self.vwaa.edges_from(q) {
                    if !w.implies(edge.label()) {
                        continue;
                    }
                    for &d in edge.dests() {
                        phi1.push(self.dest_obligation(d, r)?);
                    }
                }
            } else {
                phi2.push(self.vars.var(q)?);
                if conf.contains(q) {
                    for edge in self.vwaa.edges_from(q) {
                        if edge.acc() != EdgeAcc::None || !w.implies(edge.label()) {
                            continue;
                        }
                        for &d in edge.dests() {
                            phi1.push(self.dest_obligation(d, r)?);
                        }
                    }
                }
            }
        }

        Ok((phi1.resolve(&self.vars), phi2.resolve(&self.vars)))
    }

    /// The successor obligations of a deterministic-component state under
    /// `w`, together with whether the breakpoint fired.
    fn successor_phis(
        &self,
        state: &DetState,
        w: &Label,
    ) -> Result<(StateFormula, StateFormula, bool), VariableOutOfRange> {
        let mut succ1 = Conjunction::new();
        let mut succ2 = Conjunction::new();

        for q in 0..self.vwaa.size() {
            let p1 = self.vars.obligated(&state.phi1, q)?;
            let p2 = self.vars.obligated(&state.phi2, q)?;
            if !p1 && !p2 {
                continue;
            }
            let committed = state.r.contains(&q);
            if committed && !state.conf.contains(q) {
                continue;
            }
            for edge in self.vwaa.edges_from(q) {
                if committed && edge.acc() != EdgeAcc::None {
                    continue;
                }
                if !w.implies(edge.label()) {
                    continue;
                }
                for &d in edge.dests() {
                    if p1 {
                        succ1.push(self.dest_obligation(d, &state.r)?);
                    }
                    if p2 {
                        succ2.push(self.vars.var(d)?);
                    }
                }
            }
        }

        let succ1 = succ1.resolve(&self.vars);
        let succ2 = succ2.resolve(&self.vars);

        // breakpoint: everything outside R discharged, acceptance fires and
        // the owed obligations are watched next
        if succ1 == self.discharged()? {
            let mut next1 = Conjunction::new();
            for q in self.vars.obligations(&succ2).collect_vec() {
                next1.push(self.dest_obligation(q, &state.r)?);
            }
            let mut next2 = Conjunction::new();
            for &q in &state.r {
                next2.push(self.vars.var(q)?);
            }
            Ok((next1.resolve(&self.vars), next2.resolve(&self.vars), true))
        } else {
            Ok((succ1, succ2, false))
        }
    }

    /// Looks the triple up by structural equality, allocating a fresh state
    /// and queueing it for successor generation when it is new.
    fn intern(
        &mut self,
        sdba: &mut Sdba,
        conf: &Configuration,
        r: &BTreeSet<StateId>,
        phi1: StateFormula,
        phi2: StateFormula,
    ) -> StateId {
        let key = Triple {
            r: r.iter().copied().collect(),
            phi1: phi1.clone(),
            phi2: phi2.clone(),
        };
        if let Some(&id) = self.known.get(&key) {
            return id;
        }
        let id = sdba.add_state(None);
        if self.options.debug {
            debug!(
                "new component state {id}: R {{{}}}, phi1 {}, phi2 {}",
                key.r.iter().join(","),
                self.vars.show(&phi1),
                self.vars.show(&phi2),
            );
        }
        self.known.insert(key, id);
        self.info.insert(
            id,
            DetState {
                conf: conf.clone(),
                r: r.clone(),
                phi1,
                phi2,
            },
        );
        self.worklist.push_back(id);
        id
    }

    /// Builds the component for one `(C, R)` pair: one edge per letter from
    /// the configuration into the component, then the successor closure of
    /// every state allocated along the way.
    fn build_component(
        &mut self,
        sdba: &mut Sdba,
        ci: StateId,
        conf: &Configuration,
        r: BTreeSet<StateId>,
    ) -> Result<(), VariableOutOfRange> {
        if self.options.debug {
            debug!(
                "component for configuration {ci} with R {{{}}}",
                r.iter().join(","),
            );
        }

        for i in 0..self.letters.len() {
            let w = self.letters[i].clone();
            let (phi1, phi2) = self.initial_phis(conf, &r, &w)?;
            let dst = self.intern(sdba, conf, &r, phi1, phi2);
            // edges leaving the nondeterministic part are never accepting
            sdba.add_edge_merged(ci, dst, w, EdgeAcc::None);
        }

        while let Some(id) = self.worklist.pop_front() {
            let state = self.info[&id].clone();
            for i in 0..self.letters.len() {
                let w = self.letters[i].clone();
                let (phi1, phi2, fired) = self.successor_phis(&state, &w)?;
                let dst = self.intern(sdba, &state.conf, &state.r, phi1, phi2);
                let acc = if fired {
                    EdgeAcc::Accepting
                } else {
                    EdgeAcc::None
                };
                if self.options.debug {
                    debug!("successor edge {id} -> {dst} accepting {fired}");
                }
                sdba.add_edge_merged(id, dst, w, acc);
            }
        }
        Ok(())
    }
}

/// Converts the alternating automaton into a semi-deterministic Büchi
/// automaton.
///
/// The working copy is renamed, classified and alternation-removed into the
/// nondeterministic skeleton. When the skeleton, with its co-Büchi marks
/// flipped to Büchi ones, is already semi-deterministic, it is returned
/// unchanged. Otherwise every configuration is parsed, validated against the
/// `Qmay` closure and extended with one component per admissible commitment
/// `R`, and the result is finalized: internal marks stripped from the
/// prefix, parallel edges merged, Büchi acceptance declared.
pub fn semideterminize(vwaa: &Vwaa, options: Options) -> Result<Sdba, ConstructionError> {
    let mut working = vwaa.clone();
    working.rename_states_to_indices();
    let class = Classification::classify(&mut working);

    let mut sdba = remove_alternation(&working);

    let flipped_nonempty = (0..sdba.size())
        .any(|q| sdba.edges_from(q).any(|e| e.acc() == EdgeAcc::Masked));
    if flipped_nonempty && sdba.semi_deterministic_by(|e| e.acc() == EdgeAcc::Masked) {
        trace!("skeleton is already semi-deterministic, skipping the component construction");
        sdba.promote_masked();
        sdba.set_acceptance(Acceptance::Buchi);
        let props = sdba.properties_mut();
        props.deterministic = None;
        props.complete = None;
        props.semi_deterministic = Some(true);
        return Ok(sdba);
    }

    let nc = sdba.size();
    let mut builder = DetPartBuilder::new(&working, options);

    for ci in 0..nc {
        let name = sdba.state_name(ci).unwrap_or_default().to_string();
        let conf = match Configuration::parse(&name) {
            Ok(conf) => conf,
            Err(err) => {
                warn!("skipping configuration {ci}: {err}");
                continue;
            }
        };
        if !conf.may_reachable(&working, &class) {
            trace!("configuration {ci} admits no component");
            continue;
        }
        for r in enumerate_r(&conf, &class) {
            builder.build_component(&mut sdba, ci, &conf, r)?;
        }
    }

    finalize(&mut sdba, nc);
    Ok(sdba)
}

/// Assembles the final automaton: the internal tag on prefix edges is
/// rewritten to non-accepting, edges with equal endpoints and acceptance are
/// merged by disjunction, edge-based Büchi acceptance on the single set is
/// declared and the property bits are set only as far as verified.
fn finalize(sdba: &mut Sdba, nc: usize) {
    sdba.strip_masked(nc);
    sdba.merge_parallel_edges();
    sdba.set_acceptance(Acceptance::Buchi);

    let semi_deterministic = sdba.is_semi_deterministic();
    let props = sdba.properties_mut();
    props.deterministic = None;
    props.complete = None;
    props.semi_deterministic = semi_deterministic.then_some(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;

    fn letters_of(sdba: &Sdba) -> Vec<Label> {
        sdba.alphabet().letters().collect()
    }

    /// Checks the structural soundness of a constructed automaton: the
    /// prefix carries no acceptance, every state reachable from an
    /// accepting edge is deterministic, and the component states are
    /// complete and deterministic per letter.
    fn assert_well_formed(sdba: &Sdba, nc: usize) {
        assert_eq!(sdba.acceptance(), Acceptance::Buchi);
        assert!(!sdba.properties().universal_branching);

        for q in 0..nc {
            for edge in sdba.edges_from(q) {
                assert_ne!(edge.acc(), EdgeAcc::Accepting, "prefix edge accepting");
                assert_ne!(edge.acc(), EdgeAcc::Masked, "internal tag not stripped");
            }
        }
        assert!(sdba.is_semi_deterministic());

        for q in nc..sdba.size() {
            assert!(sdba.is_deterministic_state(q), "component state {q}");
            assert!(sdba.is_complete_state(q), "component state {q}");
            for w in letters_of(sdba) {
                let covering = sdba
                    .edges_from(q)
                    .filter(|e| w.implies(e.label()))
                    .count();
                assert_eq!(covering, 1, "state {q} must cover each letter once");
            }
        }
    }

    fn finally_a() -> Vwaa {
        // the self-loop of an eventuality is marked and matches any letter
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let tt = alphabet.tt();

        Vwaa::builder(alphabet)
            .with_states(["Fa", "t"])
            .with_edge(0, tt.clone(), [0], EdgeAcc::Accepting)
            .with_edge(0, a, [1], EdgeAcc::None)
            .with_edge(1, tt, [1], EdgeAcc::None)
            .with_initial([0])
            .into_vwaa()
    }

    fn globally_a() -> Vwaa {
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let tt = alphabet.tt();

        Vwaa::builder(alphabet)
            .with_states(["Ga", "t"])
            .with_edge(0, a, [0], EdgeAcc::None)
            .with_edge(1, tt, [1], EdgeAcc::None)
            .with_initial([0])
            .into_vwaa()
    }

    #[test_log::test]
    fn scenario_finally_a() {
        let vwaa = finally_a();
        let sdba = semideterminize(&vwaa, Options::default()).unwrap();
        assert_well_formed(&sdba, 2);

        // letter 1 is `a`, letter 0 is `!a`
        assert!(sdba.accepts(&[1], &[0]));
        assert!(sdba.accepts(&[0, 0, 1], &[0]));
        assert!(sdba.accepts(&[], &[0, 1]));
        assert!(!sdba.accepts(&[], &[0]));
    }

    #[test_log::test]
    fn scenario_globally_a() {
        let vwaa = globally_a();
        let sdba = semideterminize(&vwaa, Options::default()).unwrap();
        assert_well_formed(&sdba, 1);

        // the prefix state, the committed component state, its breakpoint
        // reset and the dead state; structural dedup keeps it at that
        assert_eq!(sdba.size(), 4);

        assert!(sdba.accepts(&[], &[1]));
        assert!(sdba.accepts(&[1, 1], &[1, 1]));
        assert!(!sdba.accepts(&[], &[0]));
        assert!(!sdba.accepts(&[1, 1, 0], &[1]));
        assert!(!sdba.accepts(&[], &[1, 0]));
    }

    #[test_log::test]
    fn scenario_until() {
        // a U b, with the until loop marked
        let alphabet = Alphabet::new(["a", "b"]);
        let a = alphabet.ap(0);
        let b = alphabet.ap(1);
        let tt = alphabet.tt();

        let vwaa = Vwaa::builder(alphabet)
            .with_states(["aUb", "t"])
            .with_edge(0, a, [0], EdgeAcc::Accepting)
            .with_edge(0, b, [1], EdgeAcc::None)
            .with_edge(1, tt, [1], EdgeAcc::None)
            .with_initial([0])
            .into_vwaa();

        let sdba = semideterminize(&vwaa, Options::default()).unwrap();
        assert_well_formed(&sdba, 2);

        // letters: 0 = !a!b, 1 = a!b, 2 = !ab, 3 = ab
        assert!(sdba.accepts(&[2], &[0]));
        assert!(sdba.accepts(&[1, 1, 3], &[0]));
        assert!(sdba.accepts(&[1, 2], &[1]));
        assert!(!sdba.accepts(&[], &[1]));
        assert!(!sdba.accepts(&[1, 0], &[2]));
    }

    #[test_log::test]
    fn scenario_already_semi_deterministic() {
        // an eventuality whose loop avoids the trigger letter: the skeleton
        // is deterministic, so the flipped marks already witness
        // semi-determinism and the skeleton is returned unchanged
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let not_a = !a.clone();
        let tt = alphabet.tt();

        let vwaa = Vwaa::builder(alphabet)
            .with_states(["q", "t"])
            .with_edge(0, not_a, [0], EdgeAcc::Accepting)
            .with_edge(0, a, [1], EdgeAcc::None)
            .with_edge(1, tt, [1], EdgeAcc::None)
            .with_initial([0])
            .into_vwaa();

        let sdba = semideterminize(&vwaa, Options::default()).unwrap();

        // no component states were added
        assert_eq!(sdba.size(), 2);
        assert_eq!(sdba.properties().semi_deterministic, Some(true));
        assert!(sdba
            .edges_from(0)
            .any(|e| e.dst() == 0 && e.acc() == EdgeAcc::Accepting));
    }

    fn recurrence_a() -> Vwaa {
        // G F a over states GFa, Fa and TT
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let tt = alphabet.tt();

        Vwaa::builder(alphabet)
            .with_states(["GFa", "Fa", "t"])
            .with_edge(0, a.clone(), [0], EdgeAcc::None)
            .with_edge(0, tt.clone(), [0, 1], EdgeAcc::None)
            .with_edge(1, tt.clone(), [1], EdgeAcc::Accepting)
            .with_edge(1, a, [2], EdgeAcc::None)
            .with_edge(2, tt, [2], EdgeAcc::None)
            .with_initial([0])
            .into_vwaa()
    }

    #[test_log::test]
    fn scenario_recurrence() {
        let vwaa = recurrence_a();
        let sdba = semideterminize(&vwaa, Options::default()).unwrap();

        // prefix states are named, component states are not
        let nc = (0..sdba.size())
            .take_while(|q| sdba.state_name(*q).is_some())
            .count();
        assert_well_formed(&sdba, nc);
        assert!(sdba.size() > nc, "a deterministic component was built");
    }

    #[test_log::test]
    fn scenario_recurrence_conjunction() {
        // (G F a) & (G F b): the initial configuration carries both
        // commitments and the owed formula tracks them together
        let alphabet = Alphabet::new(["a", "b"]);
        let a = alphabet.ap(0);
        let b = alphabet.ap(1);
        let tt = alphabet.tt();

        let vwaa = Vwaa::builder(alphabet)
            .with_states(["GFa", "GFb", "Fa", "Fb", "t"])
            .with_edge(0, a.clone(), [0], EdgeAcc::None)
            .with_edge(0, tt.clone(), [0, 2], EdgeAcc::None)
            .with_edge(1, b.clone(), [1], EdgeAcc::None)
            .with_edge(1, tt.clone(), [1, 3], EdgeAcc::None)
            .with_edge(2, tt.clone(), [2], EdgeAcc::Accepting)
            .with_edge(2, a, [4], EdgeAcc::None)
            .with_edge(3, tt.clone(), [3], EdgeAcc::Accepting)
            .with_edge(3, b, [4], EdgeAcc::None)
            .with_edge(4, tt, [4], EdgeAcc::None)
            .with_initial([0, 1])
            .into_vwaa();

        let sdba = semideterminize(&vwaa, Options::default()).unwrap();
        let nc = (0..sdba.size())
            .take_while(|q| sdba.state_name(*q).is_some())
            .count();
        assert_well_formed(&sdba, nc);
        assert!(sdba.size() > nc);

        // the construction is reproducible on the larger instance too
        let again = semideterminize(&vwaa, Options::default()).unwrap();
        assert_eq!(again.size(), sdba.size());
    }

    #[test_log::test]
    fn construction_is_deterministic() {
        let vwaa = finally_a();
        let first = semideterminize(&vwaa, Options::default()).unwrap();
        let second = semideterminize(&vwaa, Options::default()).unwrap();

        assert_eq!(first.size(), second.size());
        for q in 0..first.size() {
            let lhs = first.edges_from(q).collect_vec();
            let rhs = second.edges_from(q).collect_vec();
            assert_eq!(lhs.len(), rhs.len());
            for (l, r) in lhs.iter().zip(&rhs) {
                assert_eq!(l.dst(), r.dst());
                assert_eq!(l.label(), r.label());
                assert_eq!(l.acc(), r.acc());
            }
        }
    }

    #[test]
    fn r_enumeration() {
        let alphabet = Alphabet::new(["a"]);
        let a = alphabet.ap(0);
        let not_a = !a.clone();
        let tt = alphabet.tt();

        // q0 is Qmay only, q1 is Qmust only, q2 is neither, q3 = TT is both
        let mut vwaa = Vwaa::builder(alphabet)
            .with_states(["may", "must", "plain", "t"])
            .with_edge(0, not_a.clone(), [0], EdgeAcc::None)
            .with_edge(0, a.clone(), [3], EdgeAcc::None)
            .with_edge(1, a.clone(), [1], EdgeAcc::Accepting)
            .with_edge(1, not_a.clone(), [1, 3], EdgeAcc::Accepting)
            .with_edge(2, a, [3], EdgeAcc::None)
            .with_edge(2, not_a, [2], EdgeAcc::Accepting)
            .with_edge(3, tt, [3], EdgeAcc::None)
            .with_initial([0])
            .into_vwaa();
        let class = Classification::classify(&mut vwaa);

        assert!(class.qmay(0) && !class.qmust(0));
        assert!(!class.qmay(1) && class.qmust(1));
        assert!(!class.qmay(2) && !class.qmust(2));

        let conf = Configuration::parse("0,1,2,3").unwrap();
        let rs = enumerate_r(&conf, &class);

        // only the Qmay-not-Qmust member branches
        assert_eq!(rs.len(), 2);
        assert!(rs.contains(&BTreeSet::from([0, 1, 3])));
        assert!(rs.contains(&BTreeSet::from([1, 3])));
    }

    #[test_log::test]
    fn debug_trace_does_not_change_the_result() {
        let vwaa = finally_a();
        let quiet = semideterminize(&vwaa, Options::default()).unwrap();
        let loud = semideterminize(&vwaa, Options { debug: true }).unwrap();
        assert_eq!(quiet.size(), loud.size());
    }
}
