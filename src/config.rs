use std::collections::BTreeSet;

use itertools::Itertools;
use thiserror::Error;
use tracing::trace;

use crate::classify::Classification;
use crate::vwaa::Vwaa;
use crate::StateId;

/// Raised when a skeleton state name does not parse as a configuration.
/// This is recoverable, the offending configuration is skipped and the
/// construction continues without a deterministic companion for it.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("configuration name `{name}` contains malformed token `{token}`")]
pub struct MalformedConfiguration {
    /// The full state name that was being parsed.
    pub name: String,
    /// The token that is neither a decimal index nor `{}`.
    pub token: String,
}

/// A configuration of the nondeterministic part: a set of states of the
/// alternating automaton, parsed from a comma-separated state name. The
/// literal `{}` denotes the sink configuration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Configuration {
    states: BTreeSet<StateId>,
    sink: bool,
}

impl Configuration {
    /// Parses a state name such as `"3,5,7"` or the literal `"{}"`.
    pub fn parse(name: &str) -> Result<Configuration, MalformedConfiguration> {
        let mut states = BTreeSet::new();
        let mut sink = false;

        for token in name.split(',') {
            if token == "{}" {
                sink = true;
            } else if let Ok(q) = token.parse::<StateId>() {
                states.insert(q);
            } else {
                return Err(MalformedConfiguration {
                    name: name.to_string(),
                    token: token.to_string(),
                });
            }
        }

        Ok(Configuration { states, sink })
    }

    /// The member states, sink placeholder excluded.
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.iter().copied()
    }

    /// Whether `q` is a member.
    pub fn contains(&self, q: StateId) -> bool {
        self.states.contains(&q)
    }

    /// Whether the `{}` placeholder is a member.
    pub fn has_sink(&self) -> bool {
        self.sink
    }

    /// Decides whether every member lies in the forward closure of the
    /// `Qmay` members, following universal destinations depth-first with
    /// self-loops skipped. Configurations failing this admit no
    /// deterministic companion. The sink placeholder never lies in a
    /// closure, so its presence fails the check.
    pub fn may_reachable(&self, vwaa: &Vwaa, class: &Classification) -> bool {
        if self.sink {
            return false;
        }

        let mut valid = BTreeSet::new();
        let mut stack = self
            .states
            .iter()
            .copied()
            .filter(|q| class.qmay(*q))
            .collect_vec();

        while let Some(q) = stack.pop() {
            if !valid.insert(q) {
                continue;
            }
            for edge in vwaa.edges_from(q) {
                for &d in edge.dests() {
                    if d != q && !valid.contains(&d) {
                        stack.push(d);
                    }
                }
            }
        }

        let covered = self.states.iter().all(|q| valid.contains(q));
        trace!(
            "configuration {{{}}} {} covered by Qmay members and their successors",
            self.states.iter().join(","),
            if covered { "is" } else { "is not" },
        );
        covered
    }
}
