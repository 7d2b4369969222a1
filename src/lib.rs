#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Propositional edge labels over atomic propositions and the letter
/// enumeration of the alphabet `2^AP`.
pub mod alphabet;

/// Propositional formulas over automaton states, used to track obligations
/// in the deterministic component.
pub mod formula;

/// The very weak alternating automaton that the construction consumes.
pub mod vwaa;

/// The `Qmay`/`Qmust` state classification.
pub mod classify;

/// Parsing and validation of the configurations naming the states of the
/// nondeterministic part.
pub mod config;

/// Alternation removal, turning the alternating automaton into the
/// nondeterministic skeleton.
pub mod alternation;

/// The Büchi automaton graph produced by the construction.
pub mod sdba;

/// The semi-determinization itself: commitment enumeration, the
/// deterministic-component construction and final assembly.
pub mod semideterministic;

/// Alias for the integer handles states are indexed by.
pub type StateId = usize;

/// Edge acceptance as used throughout the construction. The internal tag
/// [`EdgeAcc::Masked`] marks edges that were accepting in the alternating
/// automaton but must not be accepting in the nondeterministic part; it is
/// rewritten before the automaton is handed out.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum EdgeAcc {
    /// Not accepting.
    None = 0,
    /// Accepting in the final automaton.
    Accepting = 1,
    /// Was accepting in the alternating automaton, internal.
    Masked = 2,
}

/// Everything needed to drive the construction end to end.
pub mod prelude {
    pub use super::alphabet::{Alphabet, Label};
    pub use super::alternation::remove_alternation;
    pub use super::classify::Classification;
    pub use super::config::{Configuration, MalformedConfiguration};
    pub use super::formula::{Conjunction, StateFormula, StateVars, VariableOutOfRange};
    pub use super::sdba::{Acceptance, Properties, Sdba, SdbaEdge};
    pub use super::semideterministic::{semideterminize, ConstructionError, Options};
    pub use super::vwaa::{Vwaa, VwaaBuilder, VwaaEdge};
    pub use super::{EdgeAcc, StateId};
}
