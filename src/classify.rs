use bit_set::BitSet;
use tracing::trace;

use crate::vwaa::Vwaa;
use crate::{EdgeAcc, StateId};

/// The `Qmay`/`Qmust` classification of the states of a [`Vwaa`].
///
/// A state is `Qmay` when some non-accepting edge loops on it, and `Qmust`
/// when every outgoing edge loops on it. The two overlap; a state without
/// outgoing edges is `Qmust`.
#[derive(Debug, Clone)]
pub struct Classification {
    is_qmay: BitSet,
    is_qmust: BitSet,
}

impl Classification {
    /// Classifies all states of the working copy and recodes its accepting
    /// edges from [`EdgeAcc::Accepting`] to [`EdgeAcc::Masked`], so that
    /// alternation removal emits no accepting edge into the nondeterministic
    /// part. Runs in time linear in the number of edges.
    pub fn classify(vwaa: &mut Vwaa) -> Classification {
        let n = vwaa.size();
        let mut is_qmay = BitSet::with_capacity(n);
        let mut is_qmust = BitSet::with_capacity(n);

        for q in 0..n {
            if vwaa
                .edges_from(q)
                .any(|e| e.acc() == EdgeAcc::None && e.loops_on(q))
            {
                is_qmay.insert(q);
            }
            if vwaa.edges_from(q).all(|e| e.loops_on(q)) {
                is_qmust.insert(q);
            }
            trace!(
                "state {q} is{} Qmay, is{} Qmust",
                if is_qmay.contains(q) { "" } else { " not" },
                if is_qmust.contains(q) { "" } else { " not" },
            );
        }

        for q in 0..n {
            for edge in vwaa.edges_from_mut(q) {
                if edge.acc() == EdgeAcc::Accepting {
                    edge.set_acc(EdgeAcc::Masked);
                }
            }
        }

        Classification { is_qmay, is_qmust }
    }

    /// Whether `q` has a non-accepting self-looping edge.
    pub fn qmay(&self, q: StateId) -> bool {
        self.is_qmay.contains(q)
    }

    /// Whether every outgoing edge of `q` self-loops.
    pub fn qmust(&self, q: StateId) -> bool {
        self.is_qmust.contains(q)
    }
}
