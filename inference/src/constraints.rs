// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Incremental deduction over constraints between datapoints.
//!
//! A [`ConstraintSystem`] is a persistent value: every operation that adds
//! information returns a new system and leaves the old one untouched, so a
//! learner can try a labelling and simply drop the result if it leads to a
//! contradiction. Sharing is structural (via `im`), which makes copies cheap.
//!
//! Deduction labels datapoints true or false:
//! - if every source of a constraint is true, its target is true;
//! - if the target of a constraint is false (or absent) and all but one
//!   source are true, the remaining source is false;
//! - true flows to known subsets, false to known supersets.
//!
//! A label is *universal* when its derivation uses no assumed constraint.
//! Deriving the opposite label of a labelled datapoint, or firing a
//! constraint without a target, is a contradiction, reported together with
//! a chain of constraints deriving it.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use cfa::automaton::{Cfa, Loc};
use itertools::Itertools;
use thiserror::Error;

use crate::observation::{Constraint, Datapoint, Origin};

/// Why a datapoint carries its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Forced by the constraint with this index
    Constraint(usize),
    /// Inherited from a superset (for true) or subset (for false)
    Subsumed(Datapoint),
}

/// The label deduced for a datapoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// true when the datapoint must lie inside the invariant
    pub polarity: bool,
    /// Whether the label follows without assumed constraints
    pub universal: bool,
    /// How the label was derived
    pub reason: Reason,
}

/// The constraints are contradictory: no invariant satisfies them all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("contradictory constraints (witness of {} constraints)", .witness.len())]
pub struct ContradictoryError {
    /// Constraints in derivation order: the sources of each are derived by
    /// earlier ones (up to subsumption), and the last has no target.
    pub witness: Vec<Arc<Constraint>>,
}

impl ContradictoryError {
    /// Whether the witness relies on assumed constraints.
    pub fn is_speculative(&self) -> bool {
        self.witness.iter().any(|c| c.is_speculative())
    }

    /// Display the witness, one constraint per line.
    pub fn display<'a>(&'a self, cfa: &'a Cfa) -> impl fmt::Display + 'a {
        WitnessDisplay { err: self, cfa }
    }
}

struct WitnessDisplay<'a> {
    err: &'a ContradictoryError,
    cfa: &'a Cfa,
}

impl fmt::Display for WitnessDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.err.witness.iter().map(|c| c.display(self.cfa).to_string());
        write!(f, "{}", lines.format("\n"))
    }
}

/// What the system knows about one registered datapoint.
#[derive(Debug, Clone, Default)]
struct Point {
    /// Known strict subsets
    subsets: im::OrdSet<Datapoint>,
    /// Known strict supersets
    supersets: im::OrdSet<Datapoint>,
    /// Constraints with this datapoint among their sources
    as_source: im::Vector<usize>,
    /// Constraints with this datapoint as target
    as_target: im::Vector<usize>,
}

enum Event {
    Check(usize),
    Labeled(Datapoint),
}

/// Constraints with everything deduced from them.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSystem {
    constraints: im::Vector<Arc<Constraint>>,
    known: im::HashMap<Arc<Constraint>, usize>,
    points: im::OrdMap<Datapoint, Point>,
    by_site: im::OrdMap<Loc, im::OrdSet<Datapoint>>,
    labels: im::OrdMap<Datapoint, Label>,
    retired: im::OrdSet<usize>,
}

impl ConstraintSystem {
    /// The empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every constraint, in the order it was added. A constraint's index in
    /// this sequence identifies it in [`Reason::Constraint`].
    pub fn constraints(&self) -> impl Iterator<Item = &Arc<Constraint>> {
        self.constraints.iter()
    }

    /// The number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// The number of constraints that can still contribute deductions.
    pub fn active(&self) -> usize {
        self.constraints.len() - self.retired.len()
    }

    /// Every registered datapoint, in order.
    pub fn datapoints(&self) -> impl Iterator<Item = &Datapoint> {
        self.points.keys()
    }

    /// The label of a datapoint, if one was deduced.
    pub fn label(&self, dp: &Datapoint) -> Option<&Label> {
        self.labels.get(dp)
    }

    /// Whether `dp` is labelled true.
    pub fn is_true(&self, dp: &Datapoint) -> bool {
        self.labels.get(dp).is_some_and(|l| l.polarity)
    }

    /// Whether `dp` is labelled false.
    pub fn is_false(&self, dp: &Datapoint) -> bool {
        self.labels.get(dp).is_some_and(|l| !l.polarity)
    }

    fn labelled(&self, polarity: bool, universal_only: bool) -> BTreeSet<Datapoint> {
        self.labels
            .iter()
            .filter(|(_, l)| l.polarity == polarity && (l.universal || !universal_only))
            .map(|(dp, _)| dp.clone())
            .collect()
    }

    /// Datapoints labelled true.
    pub fn forced_true(&self) -> BTreeSet<Datapoint> {
        self.labelled(true, false)
    }

    /// Datapoints labelled false.
    pub fn forced_false(&self) -> BTreeSet<Datapoint> {
        self.labelled(false, false)
    }

    /// Datapoints labelled true without assumptions.
    pub fn universally_true(&self) -> BTreeSet<Datapoint> {
        self.labelled(true, true)
    }

    /// Datapoints labelled false without assumptions.
    pub fn universally_false(&self) -> BTreeSet<Datapoint> {
        self.labelled(false, true)
    }

    /// The known strict subsets of a registered datapoint.
    pub fn subsets_of(&self, dp: &Datapoint) -> Vec<Datapoint> {
        self.points
            .get(dp)
            .map(|p| p.subsets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The known strict supersets of a registered datapoint.
    pub fn supersets_of(&self, dp: &Datapoint) -> Vec<Datapoint> {
        self.points
            .get(dp)
            .map(|p| p.supersets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A new system in which every datapoint of `dps` is assumed true, or
    /// the contradiction that assumption leads to. `self` is unchanged
    /// either way.
    pub fn with_true(&self, dps: &[Datapoint]) -> Result<Self, ContradictoryError> {
        let mut next = self.clone();
        for dp in dps {
            next.insert(Constraint {
                sources: vec![],
                target: Some(dp.clone()),
                origin: Origin::Assumed,
            })?;
        }
        Ok(next)
    }

    /// A new system in which every datapoint of `dps` is assumed false, or
    /// the contradiction that assumption leads to.
    pub fn with_false(&self, dps: &[Datapoint]) -> Result<Self, ContradictoryError> {
        let mut next = self.clone();
        for dp in dps {
            next.insert(Constraint {
                sources: vec![dp.clone()],
                target: None,
                origin: Origin::Assumed,
            })?;
        }
        Ok(next)
    }

    /// Add a constraint and deduce its consequences. Returns whether the
    /// constraint was new. On contradiction `self` may be partially updated;
    /// callers work on a copy.
    fn insert(&mut self, c: Constraint) -> Result<bool, ContradictoryError> {
        let c = Arc::new(c);
        if self.known.contains_key(&c) {
            return Ok(false);
        }
        let id = self.constraints.len();
        self.constraints.push_back(c.clone());
        self.known.insert(c.clone(), id);

        let mut queue = VecDeque::new();
        for dp in c.datapoints() {
            self.register(dp, &mut queue)?;
        }
        for s in c.sources.iter().unique() {
            if let Some(p) = self.points.get_mut(s) {
                p.as_source.push_back(id);
            }
        }
        if let Some(t) = &c.target {
            if let Some(p) = self.points.get_mut(t) {
                p.as_target.push_back(id);
            }
        }
        queue.push_back(Event::Check(id));
        self.propagate(queue)?;
        Ok(true)
    }

    /// Make `dp` known to the subsumption index, together with its
    /// intersections with overlapping datapoints at the same site, and
    /// inherit labels from related datapoints.
    fn register(
        &mut self,
        dp: &Datapoint,
        queue: &mut VecDeque<Event>,
    ) -> Result<(), ContradictoryError> {
        let mut pending = vec![dp.clone()];
        while let Some(d) = pending.pop() {
            if self.points.contains_key(&d) {
                continue;
            }
            let mut point = Point::default();
            let mut peers = self.by_site.get(&d.site()).cloned().unwrap_or_default();
            for e in peers.iter() {
                if d.subset_of(e) {
                    point.supersets.insert(e.clone());
                    if let Some(p) = self.points.get_mut(e) {
                        p.subsets.insert(d.clone());
                    }
                } else if e.subset_of(&d) {
                    point.subsets.insert(e.clone());
                    if let Some(p) = self.points.get_mut(e) {
                        p.supersets.insert(d.clone());
                    }
                } else if let Some(meet) = d.intersection(e) {
                    pending.push(meet);
                }
            }
            let inherited: Vec<(Datapoint, Label)> = point
                .supersets
                .iter()
                .chain(point.subsets.iter())
                .filter_map(|e| Some((e.clone(), self.labels.get(e)?.clone())))
                .collect();
            self.points.insert(d.clone(), point);
            peers.insert(d.clone());
            self.by_site.insert(d.site(), peers);
            for (e, l) in inherited {
                // true flows down from supersets, false up from subsets
                if l.polarity == d.subset_of(&e) {
                    self.set_label(&d, l.polarity, l.universal, Reason::Subsumed(e), queue)?;
                }
            }
        }
        Ok(())
    }

    fn set_label(
        &mut self,
        dp: &Datapoint,
        polarity: bool,
        universal: bool,
        reason: Reason,
        queue: &mut VecDeque<Event>,
    ) -> Result<(), ContradictoryError> {
        let label = Label {
            polarity,
            universal,
            reason,
        };
        match self.labels.get(dp).cloned() {
            Some(old) if old.polarity == polarity => {
                if universal && !old.universal {
                    self.labels.insert(dp.clone(), label);
                    queue.push_back(Event::Labeled(dp.clone()));
                }
                Ok(())
            }
            Some(old) => {
                let (t, f) = if polarity {
                    (&label, &old)
                } else {
                    (&old, &label)
                };
                let mut chain = Chain::default();
                self.explain(dp, t, &mut chain);
                self.explain(dp, f, &mut chain);
                Err(self.contradiction(chain))
            }
            None => {
                self.labels.insert(dp.clone(), label);
                queue.push_back(Event::Labeled(dp.clone()));
                Ok(())
            }
        }
    }

    fn propagate(&mut self, mut queue: VecDeque<Event>) -> Result<(), ContradictoryError> {
        while let Some(event) = queue.pop_front() {
            match event {
                Event::Check(id) => self.check(id, &mut queue)?,
                Event::Labeled(dp) => {
                    let (Some(label), Some(point)) = (self.labels.get(&dp), self.points.get(&dp))
                    else {
                        continue;
                    };
                    let (polarity, universal) = (label.polarity, label.universal);
                    let (watched, related) = if polarity {
                        (&point.as_source, &point.subsets)
                    } else {
                        (&point.as_target, &point.supersets)
                    };
                    queue.extend(watched.iter().map(|&id| Event::Check(id)));
                    let related: Vec<Datapoint> = related.iter().cloned().collect();
                    for other in related {
                        let reason = Reason::Subsumed(dp.clone());
                        self.set_label(&other, polarity, universal, reason, &mut queue)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check(&mut self, id: usize, queue: &mut VecDeque<Event>) -> Result<(), ContradictoryError> {
        if self.retired.contains(&id) {
            return Ok(());
        }
        let c = self.constraints[id].clone();
        let mut universal = !c.is_speculative();
        let mut open = vec![];
        for s in &c.sources {
            match self.labels.get(s) {
                Some(l) if l.polarity => universal &= l.universal,
                _ => {
                    if !open.contains(&s) {
                        open.push(s);
                    }
                }
            }
        }
        match (&open[..], &c.target) {
            ([], None) => {
                let mut chain = Chain::default();
                for s in &c.sources {
                    if let Some(l) = self.labels.get(s) {
                        self.explain(s, l, &mut chain);
                    }
                }
                chain.push(id);
                Err(self.contradiction(chain))
            }
            ([], Some(t)) => self.set_label(t, true, universal, Reason::Constraint(id), queue),
            ([s], None) => self.set_label(s, false, universal, Reason::Constraint(id), queue),
            ([s], Some(t)) => {
                let refuted = self.labels.get(t).filter(|l| !l.polarity).map(|l| l.universal);
                match refuted {
                    Some(u) => {
                        self.set_label(s, false, universal && u, Reason::Constraint(id), queue)
                    }
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Append to `chain` the constraints deriving `label` for `dp`, each
    /// after the constraints deriving its premises. A false label is
    /// explained as a derivation of a contradiction from `dp` being true.
    fn explain(&self, dp: &Datapoint, label: &Label, chain: &mut Chain) {
        if !chain.visit(dp, label.polarity) {
            return;
        }
        match (&label.reason, label.polarity) {
            (Reason::Subsumed(e), _) => {
                if let Some(l) = self.labels.get(e) {
                    self.explain(e, l, chain);
                }
            }
            (Reason::Constraint(id), true) => {
                let c = &self.constraints[*id];
                for s in &c.sources {
                    if let Some(l) = self.labels.get(s) {
                        self.explain(s, l, chain);
                    }
                }
                chain.push(*id);
            }
            (Reason::Constraint(id), false) => {
                let c = &self.constraints[*id];
                for s in c.sources.iter().filter(|s| *s != dp) {
                    if let Some(l) = self.labels.get(s) {
                        self.explain(s, l, chain);
                    }
                }
                chain.push(*id);
                if let Some(t) = &c.target {
                    if let Some(l) = self.labels.get(t) {
                        self.explain(t, l, chain);
                    }
                }
            }
        }
    }

    fn contradiction(&self, chain: Chain) -> ContradictoryError {
        let witness = chain
            .order
            .into_iter()
            .map(|id| self.constraints[id].clone())
            .collect_vec();
        log::debug!("contradiction with witness of {} constraints", witness.len());
        ContradictoryError { witness }
    }
}

/// A derivation under construction.
#[derive(Default)]
struct Chain {
    order: Vec<usize>,
    used: BTreeSet<usize>,
    visited: BTreeSet<(Datapoint, bool)>,
}

impl Chain {
    fn visit(&mut self, dp: &Datapoint, polarity: bool) -> bool {
        self.visited.insert((dp.clone(), polarity))
    }

    fn push(&mut self, id: usize) {
        if self.used.insert(id) {
            self.order.push(id);
        }
    }
}

/// Accumulates constraints reported by teachers. Snapshots taken with
/// [`ConstraintSystemBuilder::build`] are independent of later additions.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSystemBuilder {
    system: ConstraintSystem,
}

impl ConstraintSystemBuilder {
    /// A builder with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint, returning whether it was new. On contradiction the
    /// builder keeps its previous state.
    pub fn add_constraint(&mut self, c: Constraint) -> Result<bool, ContradictoryError> {
        let mut next = self.system.clone();
        let added = next.insert(c)?;
        self.system = next;
        Ok(added)
    }

    /// Add several constraints, returning how many were new.
    pub fn add_constraints<I>(&mut self, cs: I) -> Result<usize, ContradictoryError>
    where
        I: IntoIterator<Item = Constraint>,
    {
        let mut added = 0;
        for c in cs {
            if self.add_constraint(c)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Retire constraints that can no longer contribute: their target is
    /// universally true or one of their sources universally false. Retired
    /// constraints still explain earlier deductions. Returns how many were
    /// retired.
    pub fn simplify(&mut self) -> usize {
        let sys = &self.system;
        let decided = |dp: &Datapoint, polarity: bool| {
            sys.labels
                .get(dp)
                .is_some_and(|l| l.universal && l.polarity == polarity)
        };
        let done = (0..sys.constraints.len())
            .filter(|id| !sys.retired.contains(id))
            .filter(|&id| {
                let c = &sys.constraints[id];
                c.target.as_ref().is_some_and(|t| decided(t, true))
                    || c.sources.iter().any(|s| decided(s, false))
            })
            .collect_vec();
        for &id in &done {
            self.system.retired.insert(id);
        }
        if !done.is_empty() {
            log::debug!(
                "retired {} constraints, {} active",
                done.len(),
                self.system.active()
            );
        }
        done.len()
    }

    /// The current system.
    pub fn build(&self) -> ConstraintSystem {
        self.system.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConstraintSystem, ConstraintSystemBuilder, ContradictoryError, Reason};
    use crate::observation::{Constraint, Datapoint, Origin};
    use cfa::semantics::{Valuation, Value};
    use petgraph::graph::NodeIndex;
    use std::collections::BTreeSet;

    fn dp(vals: &[(&str, i64)]) -> Datapoint {
        let valuation: Valuation = vals
            .iter()
            .map(|(v, i)| (v.to_string(), Value::Int(*i)))
            .collect();
        Datapoint::new(NodeIndex::new(0), valuation)
    }

    fn x(i: i64) -> Datapoint {
        dp(&[("x", i)])
    }

    fn implies(sources: Vec<Datapoint>, target: Option<Datapoint>, clause: usize) -> Constraint {
        Constraint {
            sources,
            target,
            origin: Origin::Clause(clause),
        }
    }

    /// Replay a witness: each constraint's sources must be covered by
    /// something derived earlier, and the last constraint has no target.
    fn valid_witness(err: &ContradictoryError) -> bool {
        let mut derived: Vec<Datapoint> = vec![];
        for c in &err.witness {
            let covered = c
                .sources
                .iter()
                .all(|s| derived.iter().any(|d| s.subset_of(d) || d.subset_of(s)));
            if !covered {
                return false;
            }
            derived.extend(c.target.iter().cloned());
        }
        err.witness.last().is_some_and(|c| c.target.is_none())
    }

    #[test_log::test]
    fn test_forward_and_backward() {
        let mut b = ConstraintSystemBuilder::new();
        // x=0 holds; x=0 => x=1; x=2 & x=3 => false; x=4 => x=2
        b.add_constraint(implies(vec![], Some(x(0)), 0)).unwrap();
        b.add_constraint(implies(vec![x(0)], Some(x(1)), 1)).unwrap();
        b.add_constraint(implies(vec![x(2), x(3)], None, 2)).unwrap();
        b.add_constraint(implies(vec![x(4)], Some(x(2)), 1)).unwrap();
        let cs = b.build();
        assert_eq!(cs.forced_true(), BTreeSet::from([x(0), x(1)]));
        // two live sources: nothing is forced false yet
        assert!(cs.forced_false().is_empty());

        b.add_constraint(implies(vec![], Some(x(3)), 0)).unwrap();
        let cs = b.build();
        assert!(cs.is_true(&x(3)));
        assert_eq!(cs.forced_false(), BTreeSet::from([x(2), x(4)]));
        assert_eq!(cs.universally_false(), cs.forced_false());
        assert!(matches!(
            cs.label(&x(4)).map(|l| &l.reason),
            Some(Reason::Constraint(3))
        ));
        // duplicates are ignored
        assert!(!b.add_constraint(implies(vec![x(4)], Some(x(2)), 1)).unwrap());
        assert_eq!(b.build().len(), 5);
    }

    #[test]
    fn test_contradiction_witness() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(implies(vec![], Some(x(0)), 0)).unwrap();
        b.add_constraint(implies(vec![x(0)], Some(x(1)), 1)).unwrap();
        b.add_constraint(implies(vec![x(5)], Some(x(9)), 1)).unwrap();
        let before = b.build();
        let err = b.add_constraint(implies(vec![x(1)], None, 2)).unwrap_err();
        assert_eq!(err.witness.len(), 3);
        assert!(valid_witness(&err));
        assert!(!err.is_speculative());
        // the builder is left as it was
        assert_eq!(b.build().len(), before.len());
        assert_eq!(b.build().forced_true(), before.forced_true());
    }

    #[test]
    fn test_clash_witness() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(implies(vec![x(1)], None, 2)).unwrap();
        b.add_constraint(implies(vec![x(0)], Some(x(1)), 1)).unwrap();
        assert!(b.build().is_false(&x(0)));
        let err = b.add_constraint(implies(vec![], Some(x(0)), 0)).unwrap_err();
        assert!(valid_witness(&err));
        let origins: Vec<Origin> = err.witness.iter().map(|c| c.origin).collect();
        assert_eq!(
            origins,
            vec![Origin::Clause(0), Origin::Clause(1), Origin::Clause(2)]
        );
    }

    #[test]
    fn test_subsumption() {
        let mut b = ConstraintSystemBuilder::new();
        let general = x(1);
        let specific = dp(&[("x", 1), ("y", 2)]);
        let other = dp(&[("x", 1), ("y", 3)]);
        b.add_constraint(implies(vec![], Some(general.clone()), 0)).unwrap();
        b.add_constraint(implies(vec![specific.clone()], Some(x(7)), 1)).unwrap();
        let cs = b.build();
        // true flows to the more specific datapoint, which fires its constraint
        assert!(cs.is_true(&specific));
        assert!(cs.is_true(&x(7)));
        assert_eq!(cs.subsets_of(&general), vec![specific.clone()]);
        assert_eq!(cs.supersets_of(&specific), vec![general.clone()]);

        // false flows to supersets
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(implies(vec![other.clone()], None, 2)).unwrap();
        b.add_constraint(implies(vec![general.clone()], Some(x(8)), 1)).unwrap();
        let cs = b.build();
        assert!(cs.is_false(&other));
        assert!(cs.is_false(&general));
        for a in cs.datapoints() {
            for b in cs.datapoints() {
                if a.subset_of(b) && cs.is_true(b) {
                    assert!(cs.is_true(a));
                }
                if a.subset_of(b) && cs.is_false(a) {
                    assert!(cs.is_false(b));
                }
            }
        }
    }

    #[test]
    fn test_intersections_are_registered() {
        let mut b = ConstraintSystemBuilder::new();
        let xs = x(1);
        let ys = dp(&[("y", 2)]);
        b.add_constraint(implies(vec![], Some(xs.clone()), 0)).unwrap();
        b.add_constraint(implies(vec![], Some(ys.clone()), 0)).unwrap();
        let cs = b.build();
        let meet = dp(&[("x", 1), ("y", 2)]);
        assert_eq!(cs.datapoints().count(), 3);
        assert!(cs.is_true(&meet));
        assert!(matches!(cs.label(&meet).map(|l| &l.reason), Some(Reason::Subsumed(_))));
    }

    #[test]
    fn test_speculation_is_persistent() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(implies(vec![x(0)], Some(x(1)), 1)).unwrap();
        b.add_constraint(implies(vec![x(1)], None, 2)).unwrap();
        let cs = b.build();
        assert!(cs.is_false(&x(0)));
        assert!(cs.universally_false().contains(&x(0)));

        let err = cs.with_true(&[x(0)]).unwrap_err();
        assert!(err.is_speculative());
        assert!(valid_witness(&err));
        assert!(!cs.is_true(&x(0)));

        let t = cs.with_true(&[x(5)]).unwrap();
        assert!(t.is_true(&x(5)));
        assert!(!t.universally_true().contains(&x(5)));
        assert!(t.with_false(&[x(5)]).is_err());
        assert!(cs.with_false(&[x(5)]).is_ok());
        assert!(cs.label(&x(5)).is_none());
    }

    #[test]
    fn test_build_is_idempotent_and_simplify() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(implies(vec![], Some(x(0)), 0)).unwrap();
        b.add_constraint(implies(vec![x(0)], Some(x(1)), 1)).unwrap();
        b.add_constraint(implies(vec![x(2)], Some(x(3)), 1)).unwrap();
        let (one, two) = (b.build(), b.build());
        assert_eq!(one.forced_true(), two.forced_true());
        assert_eq!(one.forced_false(), two.forced_false());

        assert_eq!(b.simplify(), 2);
        assert_eq!(b.build().active(), 1);
        // retired constraints still explain contradictions
        let err = b.add_constraint(implies(vec![x(1)], None, 2)).unwrap_err();
        assert!(valid_witness(&err));
        assert_eq!(ConstraintSystem::new().active(), 0);
    }
}
