use biodivine_lib_bdd::{Bdd, BddVariableSet};
use itertools::Itertools;
use thiserror::Error;

/// The error raised when a state is used as a propositional variable without
/// having been reserved in the [`StateVars`] universe. This is not
/// recoverable, construction aborts on it.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("state {state} exceeds the reserved variable space of {capacity} states")]
pub struct VariableOutOfRange {
    /// The offending state index.
    pub state: usize,
    /// The number of reserved state variables.
    pub capacity: usize,
}

/// A propositional formula over automaton states, where each state index
/// doubles as a variable. These track outstanding obligations during the
/// deterministic-component construction.
///
/// Backed by a [`Bdd`], so equality and hashing are canonical and two
/// formulas compare equal precisely when they are structurally the same
/// obligation set. The formula `false` means "nothing was contributed",
/// which is distinct from `true`, "all contributions were discharged".
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct StateFormula {
    bdd: Bdd,
}

impl StateFormula {
    pub(crate) fn from_bdd(bdd: Bdd) -> Self {
        Self { bdd }
    }

    /// Whether all obligations have been discharged.
    pub fn is_true(&self) -> bool {
        self.bdd.is_true()
    }

    /// Whether the formula carries no obligations at all.
    pub fn is_false(&self) -> bool {
        self.bdd.is_false()
    }
}

impl std::ops::BitAnd<&StateFormula> for StateFormula {
    type Output = StateFormula;

    fn bitand(self, rhs: &StateFormula) -> StateFormula {
        StateFormula::from_bdd(self.bdd.and(&rhs.bdd))
    }
}

/// The variable universe backing [`StateFormula`]s, one propositional
/// variable per state of the automaton the formulas speak about. The
/// universe is reserved up front and never grows.
#[derive(Clone, Debug)]
pub struct StateVars {
    vars: BddVariableSet,
    capacity: usize,
}

impl StateVars {
    /// Reserves variables for the states `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cannot reserve an empty variable universe");
        Self {
            vars: BddVariableSet::new_anonymous(
                capacity.try_into().expect("too many states for a variable universe"),
            ),
            capacity,
        }
    }

    /// The number of reserved state variables.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The vacuously satisfied formula.
    pub fn tt(&self) -> StateFormula {
        StateFormula::from_bdd(self.vars.mk_true())
    }

    /// The formula carrying no obligations.
    pub fn ff(&self) -> StateFormula {
        StateFormula::from_bdd(self.vars.mk_false())
    }

    /// The variable for state `q`.
    pub fn var(&self, q: usize) -> Result<StateFormula, VariableOutOfRange> {
        if q >= self.capacity {
            return Err(VariableOutOfRange {
                state: q,
                capacity: self.capacity,
            });
        }
        Ok(StateFormula::from_bdd(
            self.vars.mk_var(self.vars.variables()[q]),
        ))
    }

    /// Whether state `q` occurs as an obligation of `phi`, i.e. whether the
    /// non-empty conjunction `phi` contains the variable of `q`.
    pub fn obligated(&self, phi: &StateFormula, q: usize) -> Result<bool, VariableOutOfRange> {
        if phi.is_false() {
            return Ok(false);
        }
        let var = self.var(q)?;
        Ok(phi.bdd.imp(&var.bdd).is_true())
    }

    /// Iterates the states that occur as obligations of `phi`, in index order.
    pub fn obligations<'a>(
        &'a self,
        phi: &'a StateFormula,
    ) -> impl Iterator<Item = usize> + 'a {
        (0..self.capacity).filter(|q| {
            self.obligated(phi, *q)
                .expect("iterated state is within the reserved universe")
        })
    }

    /// Renders `phi` as a conjunction of state variables, for diagnostics.
    pub fn show(&self, phi: &StateFormula) -> String {
        if phi.is_true() {
            return "t".to_string();
        }
        if phi.is_false() {
            return "f".to_string();
        }
        self.obligations(phi).map(|q| format!("q{q}")).join("&")
    }
}

/// Accumulates a conjunction of [`StateFormula`]s while keeping the empty
/// accumulator distinct from a vacuously satisfied one: resolving without
/// any contribution yields `false`, while a first contribution of `true`
/// (followed by none or more `true`s) yields `true`.
#[derive(Debug, Clone, Default)]
pub struct Conjunction {
    acc: Option<StateFormula>,
}

impl Conjunction {
    /// An accumulator with no contributions yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Conjoins `phi` into the accumulator.
    pub fn push(&mut self, phi: StateFormula) {
        self.acc = Some(match self.acc.take() {
            None => phi,
            Some(acc) => acc & &phi,
        });
    }

    /// Resolves to the accumulated conjunction, or `false` when nothing was
    /// contributed.
    pub fn resolve(self, universe: &StateVars) -> StateFormula {
        self.acc.unwrap_or_else(|| universe.ff())
    }
}
