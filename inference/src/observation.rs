// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Observations about invariant sites: datapoints and the implications
//! between them that the teacher reports.

use std::fmt;
use std::sync::Arc;

use cfa::{
    automaton::{Cfa, Loc},
    semantics::{valuation_to_string, Valuation},
};
use itertools::Itertools;

/// A concrete observation at an invariant site.
///
/// The valuation may be partial; an unassigned variable stands for every
/// value, so a datapoint denotes a set of states. Labelling a datapoint true
/// claims the whole set lies inside the site's invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Datapoint {
    site: Loc,
    valuation: Arc<Valuation>,
}

impl Datapoint {
    /// A datapoint at `site`.
    pub fn new(site: Loc, valuation: Valuation) -> Self {
        Self {
            site,
            valuation: Arc::new(valuation),
        }
    }

    /// The invariant site.
    pub fn site(&self) -> Loc {
        self.site
    }

    /// The observed values.
    pub fn valuation(&self) -> &Valuation {
        &self.valuation
    }

    /// Whether every state of `self` is a state of `other`: both are at the
    /// same site and `self` agrees with every value `other` fixes.
    pub fn subset_of(&self, other: &Datapoint) -> bool {
        self.site == other.site
            && other
                .valuation
                .iter()
                .all(|(v, val)| self.valuation.get(v) == Some(val))
    }

    /// Whether the two datapoints share no state: they disagree on a
    /// variable both assign.
    pub fn disjoint(&self, other: &Datapoint) -> bool {
        self.site != other.site
            || self
                .valuation
                .iter()
                .any(|(v, val)| other.valuation.get(v).is_some_and(|o| o != val))
    }

    /// The most general datapoint contained in both, if they overlap.
    pub fn intersection(&self, other: &Datapoint) -> Option<Datapoint> {
        if self.disjoint(other) {
            return None;
        }
        let mut valuation = (*self.valuation).clone();
        for (v, val) in other.valuation.iter() {
            valuation.entry(v.clone()).or_insert(*val);
        }
        Some(Datapoint::new(self.site, valuation))
    }

    /// Display the datapoint with location names from `cfa`.
    pub fn display<'a>(&'a self, cfa: &'a Cfa) -> impl fmt::Display + 'a {
        DatapointDisplay { dp: self, cfa }
    }
}

struct DatapointDisplay<'a> {
    dp: &'a Datapoint,
    cfa: &'a Cfa,
}

impl fmt::Display for DatapointDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.cfa.name(self.dp.site),
            valuation_to_string(&self.dp.valuation)
        )
    }
}

/// Where a constraint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    /// A counterexample to the clause with this index
    Clause(usize),
    /// A tentative labelling made by a learner
    Assumed,
}

/// If every source holds then the target holds. Without sources the target
/// holds unconditionally; without a target the sources cannot all hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constraint {
    /// The premises
    pub sources: Vec<Datapoint>,
    /// The conclusion, or `None` for a contradiction
    pub target: Option<Datapoint>,
    /// Where the constraint came from
    pub origin: Origin,
}

impl Constraint {
    /// Every datapoint the constraint mentions.
    pub fn datapoints(&self) -> impl Iterator<Item = &Datapoint> {
        self.sources.iter().chain(self.target.iter())
    }

    /// Whether the constraint was learned from a clause rather than assumed.
    pub fn is_speculative(&self) -> bool {
        matches!(self.origin, Origin::Assumed)
    }

    /// Display the constraint with location names from `cfa`.
    pub fn display<'a>(&'a self, cfa: &'a Cfa) -> impl fmt::Display + 'a {
        ConstraintDisplay { c: self, cfa }
    }
}

struct ConstraintDisplay<'a> {
    c: &'a Constraint,
    cfa: &'a Cfa,
}

impl fmt::Display for ConstraintDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.c.origin {
            Origin::Clause(i) => write!(f, "[clause {i}] ")?,
            Origin::Assumed => write!(f, "[assumed] ")?,
        }
        if self.c.sources.is_empty() {
            write!(f, "true")?;
        } else {
            let sources = self.c.sources.iter().map(|s| s.display(self.cfa).to_string());
            write!(f, "{}", sources.format(" & "))?;
        }
        match &self.c.target {
            Some(t) => write!(f, " => {}", t.display(self.cfa)),
            None => write!(f, " => false"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Constraint, Datapoint, Origin};
    use cfa::{automaton::CfaBuilder, semantics::Value, semantics::Valuation};
    use petgraph::graph::NodeIndex;

    fn dp(site: usize, vals: &[(&str, i64)]) -> Datapoint {
        let valuation: Valuation = vals
            .iter()
            .map(|(v, i)| (v.to_string(), Value::Int(*i)))
            .collect();
        Datapoint::new(NodeIndex::new(site), valuation)
    }

    #[test]
    fn test_order() {
        let a = dp(0, &[("x", 1), ("y", 2)]);
        let x1 = dp(0, &[("x", 1)]);
        let y2 = dp(0, &[("y", 2)]);
        let y3 = dp(0, &[("y", 3)]);
        assert!(a.subset_of(&x1));
        assert!(!x1.subset_of(&a));
        assert!(a.subset_of(&a));
        assert!(!dp(1, &[("x", 1)]).subset_of(&x1));
        assert!(y2.disjoint(&y3));
        assert!(!x1.disjoint(&y3));
        assert_eq!(x1.intersection(&y2), Some(a.clone()));
        assert_eq!(y2.intersection(&y3), None);
        assert!(x1.disjoint(&dp(1, &[("x", 1)])));
    }

    #[test]
    fn test_display() {
        let cfa = CfaBuilder::new("entry", "error").location("head").build().unwrap();
        let head = cfa.location("head").unwrap();
        let at = |x: i64| {
            Datapoint::new(head, Valuation::from([("x".to_string(), Value::Int(x))]))
        };
        let c = Constraint {
            sources: vec![at(0)],
            target: Some(at(1)),
            origin: Origin::Clause(2),
        };
        insta::assert_snapshot!(c.display(&cfa), @"[clause 2] head{x = 0} => head{x = 1}");
        let c = Constraint {
            sources: vec![],
            target: None,
            origin: Origin::Assumed,
        };
        assert_eq!(c.display(&cfa).to_string(), "[assumed] true => false");
    }
}
