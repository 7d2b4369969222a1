#![allow(missing_docs)]

use std::fmt::Display;

use biodivine_lib_bdd::{Bdd, BddValuation, BddVariableSet};
use itertools::Itertools;

/// A propositional formula over the atomic propositions of an [`Alphabet`],
/// used to label edges. Stored as a [`Bdd`], which gives canonical structural
/// equality and hashing for free.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Label {
    bdd: Bdd,
}

impl Label {
    pub(crate) fn from_bdd(bdd: Bdd) -> Self {
        Self { bdd }
    }

    pub fn is_true(&self) -> bool {
        self.bdd.is_true()
    }

    pub fn is_false(&self) -> bool {
        self.bdd.is_false()
    }

    /// Decides whether `self` implies `other`, i.e. whether every letter
    /// contained in `self` is also contained in `other`.
    pub fn implies(&self, other: &Label) -> bool {
        self.bdd.imp(&other.bdd).is_true()
    }

    /// Decides whether some letter satisfies both `self` and `other`.
    pub fn overlaps(&self, other: &Label) -> bool {
        !self.bdd.and(&other.bdd).is_false()
    }
}

impl std::ops::BitAnd<&Label> for Label {
    type Output = Label;

    fn bitand(self, rhs: &Label) -> Label {
        Label::from_bdd(self.bdd.and(&rhs.bdd))
    }
}

impl std::ops::BitOr<&Label> for Label {
    type Output = Label;

    fn bitor(self, rhs: &Label) -> Label {
        Label::from_bdd(self.bdd.or(&rhs.bdd))
    }
}

impl std::ops::Not for Label {
    type Output = Label;

    fn not(self) -> Label {
        Label::from_bdd(self.bdd.not())
    }
}

impl std::ops::BitAndAssign<&Label> for Label {
    fn bitand_assign(&mut self, rhs: &Label) {
        self.bdd = self.bdd.and(&rhs.bdd);
    }
}

impl std::ops::BitOrAssign<&Label> for Label {
    fn bitor_assign(&mut self, rhs: &Label) {
        self.bdd = self.bdd.or(&rhs.bdd);
    }
}

/// A propositional alphabet over a finite set of named atomic propositions.
///
/// A **letter** of the alphabet is a complete conjunction `⋀ (±apᵢ)`, so the
/// alphabet has exactly `2^|AP|` letters. A [`Label`] contains a letter iff
/// the letter implies it. Letters are enumerated in the fixed order of their
/// index: letter `i` sets proposition `k` positively iff bit `k` of `i` is
/// set. Nothing else about the order is relied on.
#[derive(Clone, Debug)]
pub struct Alphabet {
    aps: Vec<String>,
    vars: BddVariableSet,
}

impl Alphabet {
    /// Creates an alphabet from the given atomic proposition names.
    ///
    /// # Panics
    /// Panics if no propositions are given or more than 16 are, since the
    /// letter enumeration is exponential in their number.
    pub fn new<I>(apnames: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let aps: Vec<String> = apnames.into_iter().map(|ap| ap.to_string()).collect();
        assert!(!aps.is_empty(), "alphabet needs at least one proposition");
        assert!(aps.len() <= 16, "too many atomic propositions");

        let vars = BddVariableSet::new_anonymous(aps.len() as u16);
        Self { aps, vars }
    }

    pub fn apnames(&self) -> &[String] {
        &self.aps
    }

    /// The number of atomic propositions.
    pub fn num_aps(&self) -> usize {
        self.aps.len()
    }

    /// The number of letters, `2^|AP|`.
    pub fn size(&self) -> usize {
        1usize << self.aps.len()
    }

    pub fn tt(&self) -> Label {
        Label::from_bdd(self.vars.mk_true())
    }

    pub fn ff(&self) -> Label {
        Label::from_bdd(self.vars.mk_false())
    }

    /// The label consisting of just the `k`-th atomic proposition.
    pub fn ap(&self, k: usize) -> Label {
        Label::from_bdd(self.vars.mk_var(self.vars.variables()[k]))
    }

    /// The `i`-th letter, the complete conjunction whose `k`-th proposition
    /// is positive iff bit `k` of `i` is set.
    pub fn letter(&self, i: usize) -> Label {
        assert!(i < self.size(), "letter index out of range");
        let bools = (0..self.aps.len()).map(|k| i & (1 << k) != 0).collect_vec();
        Label::from_bdd(Bdd::from(BddValuation::new(bools)))
    }

    /// Enumerates all `2^|AP|` letters in index order.
    pub fn letters(&self) -> impl Iterator<Item = Label> + '_ {
        (0..self.size()).map(|i| self.letter(i))
    }

    /// Renders a label over this alphabet with the proposition names, in
    /// disjunctive normal form.
    pub fn show(&self, label: &Label) -> String {
        if label.is_true() {
            return "t".to_string();
        }
        if label.is_false() {
            return "f".to_string();
        }
        label
            .bdd
            .to_optimized_dnf()
            .iter()
            .map(|clause| {
                let mut vals = clause.to_values();
                vals.sort();
                vals.into_iter()
                    .map(|(v, b)| {
                        if b {
                            self.aps[v.to_index()].clone()
                        } else {
                            format!("!{}", self.aps[v.to_index()])
                        }
                    })
                    .join("&")
            })
            .join(" | ")
    }
}
