// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A decision-tree learner.
//!
//! The tree is grown over the datapoints of a constraint system. A set of
//! datapoints becomes a leaf when it can be labelled uniformly without
//! contradicting the constraints; the labelling is then committed to a
//! working copy of the system so that later leaves take it into account.
//! Otherwise the set is split, first by invariant site and then by the
//! predicate with the least classification error.
//!
//! Construction uses an arena of [`BuildNode`]s processed from a stack, and
//! the finished arena is frozen into an owned [`DecisionTree`].

use std::collections::BTreeSet;
use std::mem;

use cfa::{
    automaton::{Loc, VarDecl},
    semantics::eval_bool,
    syntax::{Sort, Term},
};
use chc::InvariantCandidates;
use rayon::prelude::*;

use crate::{
    constraints::ConstraintSystem,
    learner::{Learner, LearnerError},
    observation::Datapoint,
};

/// How an inner node splits its datapoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Datapoints at these sites go to the true branch
    Invariant(BTreeSet<Loc>),
    /// Datapoints satisfying this predicate go to the true branch
    Value(Term),
}

/// A finished decision tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionTree {
    #[allow(missing_docs)]
    Leaf(bool),
    #[allow(missing_docs)]
    Node {
        decision: Decision,
        true_branch: Box<DecisionTree>,
        false_branch: Box<DecisionTree>,
    },
}

impl DecisionTree {
    /// The candidates the tree describes. A value decision `a` conjoins `a`
    /// onto the true branch and `!a` onto the false branch; an invariant
    /// decision takes the true branch at its sites and the false branch
    /// elsewhere.
    pub fn candidates(&self) -> InvariantCandidates {
        match self {
            DecisionTree::Leaf(true) => InvariantCandidates::true_(),
            DecisionTree::Leaf(false) => InvariantCandidates::false_(),
            DecisionTree::Node {
                decision: Decision::Value(a),
                true_branch,
                false_branch,
            } => true_branch
                .candidates()
                .guard(a)
                .or(&false_branch.candidates().guard(&Term::not(a.clone()))),
            DecisionTree::Node {
                decision: Decision::Invariant(sites),
                true_branch,
                false_branch,
            } => InvariantCandidates::select(
                sites,
                &true_branch.candidates(),
                &false_branch.candidates(),
            ),
        }
    }

    /// How the tree classifies `dp`, or `None` if the datapoint reaches
    /// leaves of both polarities.
    pub fn classify(&self, dp: &Datapoint) -> Option<bool> {
        match self {
            DecisionTree::Leaf(b) => Some(*b),
            DecisionTree::Node {
                decision,
                true_branch,
                false_branch,
            } => {
                let goes = match decision {
                    Decision::Invariant(sites) => Some(sites.contains(&dp.site())),
                    Decision::Value(a) => eval_bool(a, dp.valuation()),
                };
                match goes {
                    Some(true) => true_branch.classify(dp),
                    Some(false) => false_branch.classify(dp),
                    None => {
                        let (t, f) = (true_branch.classify(dp)?, false_branch.classify(dp)?);
                        (t == f).then_some(t)
                    }
                }
            }
        }
    }

    /// The number of nodes.
    pub fn size(&self) -> usize {
        match self {
            DecisionTree::Leaf(_) => 1,
            DecisionTree::Node {
                true_branch,
                false_branch,
                ..
            } => 1 + true_branch.size() + false_branch.size(),
        }
    }
}

/// A node under construction.
enum BuildNode {
    Pending(Vec<Datapoint>),
    Leaf(bool),
    Decision {
        decision: Decision,
        true_child: usize,
        false_child: usize,
    },
}

fn freeze(arena: &[BuildNode], i: usize) -> DecisionTree {
    match &arena[i] {
        BuildNode::Leaf(b) => DecisionTree::Leaf(*b),
        BuildNode::Decision {
            decision,
            true_child,
            false_child,
        } => DecisionTree::Node {
            decision: decision.clone(),
            true_branch: Box::new(freeze(arena, *true_child)),
            false_branch: Box::new(freeze(arena, *false_child)),
        },
        BuildNode::Pending(_) => unreachable!("node {i} was never processed"),
    }
}

/// Learns candidates as decision trees over program values and, optionally,
/// a fixed pool of atoms.
#[derive(Debug, Clone)]
pub struct DecisionTreeLearner {
    variables: Vec<VarDecl>,
    use_values: bool,
    atoms: Vec<Term>,
}

impl DecisionTreeLearner {
    /// A learner splitting on thresholds of the observed values.
    pub fn new(variables: &[VarDecl]) -> Self {
        Self {
            variables: variables.to_vec(),
            use_values: true,
            atoms: vec![],
        }
    }

    /// A learner splitting only on the given atoms.
    pub fn atoms_only(variables: &[VarDecl], atoms: Vec<Term>) -> Self {
        Self {
            variables: variables.to_vec(),
            use_values: false,
            atoms,
        }
    }

    /// Also split on the given atoms.
    pub fn with_atoms(mut self, atoms: Vec<Term>) -> Self {
        self.atoms = atoms;
        self
    }

    /// Grow a tree classifying every datapoint of `cs`.
    pub fn learn(&self, cs: &ConstraintSystem) -> Result<DecisionTree, LearnerError> {
        let mut cs = cs.clone();
        let mut arena = vec![BuildNode::Pending(cs.datapoints().cloned().collect())];
        let mut stack = vec![0];
        while let Some(i) = stack.pop() {
            let BuildNode::Pending(points) = mem::replace(&mut arena[i], BuildNode::Leaf(true))
            else {
                continue;
            };
            if let Some((polarity, next)) = try_leaf(&cs, &points) {
                log::trace!("leaf {polarity} for {} datapoints", points.len());
                cs = next;
                arena[i] = BuildNode::Leaf(polarity);
                continue;
            }
            let (decision, yes, no) = self.split(&cs, &points)?;
            let (true_child, false_child) = (arena.len(), arena.len() + 1);
            arena.push(BuildNode::Pending(yes));
            arena.push(BuildNode::Pending(no));
            arena[i] = BuildNode::Decision {
                decision,
                true_child,
                false_child,
            };
            // the true side is decided first
            stack.push(false_child);
            stack.push(true_child);
        }
        Ok(freeze(&arena, 0))
    }

    fn predicates(&self, points: &[Datapoint]) -> Vec<Term> {
        let mut preds = vec![];
        if self.use_values {
            for v in &self.variables {
                let observed = points.iter().filter_map(|p| p.valuation().get(&v.name));
                match v.sort {
                    Sort::Bool => {
                        if observed.count() > 0 {
                            preds.push(Term::id(&v.name));
                        }
                    }
                    Sort::Int => {
                        let values: BTreeSet<i64> = observed.filter_map(|val| val.int()).collect();
                        let Some(&max) = values.last() else {
                            continue;
                        };
                        let var = || Term::id(&v.name);
                        preds.extend(
                            values
                                .iter()
                                .filter(|&&c| c != max)
                                .map(|&c| Term::leq(var(), Term::int(c))),
                        );
                        preds.extend(values.iter().map(|&c| Term::equals(var(), Term::int(c))));
                    }
                }
            }
        }
        preds.extend(self.atoms.iter().cloned());
        preds
    }

    fn split(
        &self,
        cs: &ConstraintSystem,
        points: &[Datapoint],
    ) -> Result<(Decision, Vec<Datapoint>, Vec<Datapoint>), LearnerError> {
        let sites: BTreeSet<Loc> = points.iter().map(|p| p.site()).collect();
        if sites.len() > 1 {
            let half: BTreeSet<Loc> = sites.iter().take(sites.len() / 2).copied().collect();
            let (yes, no): (Vec<_>, Vec<_>) = points
                .iter()
                .cloned()
                .partition(|p| half.contains(&p.site()));
            return Ok((Decision::Invariant(half), yes, no));
        }

        let preds = self.predicates(points);
        let scored: Vec<Option<(f64, Vec<Datapoint>, Vec<Datapoint>)>> = preds
            .par_iter()
            .map(|pred| {
                let (yes, no) = partition(pred, points);
                let shrinks = yes.len() < points.len() && no.len() < points.len();
                shrinks.then(|| (error(cs, &yes) + error(cs, &no), yes, no))
            })
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (i, s) in scored.iter().enumerate() {
            if let Some((e, ..)) = s {
                if best.map_or(true, |(_, b)| *e < b) {
                    best = Some((i, *e));
                }
            }
        }
        let Some((i, e)) = best else {
            return Err(LearnerError::CandidatesNotExpressible(format!(
                "no predicate separates {} datapoints",
                points.len()
            )));
        };
        log::trace!("split on {} with error {e}", preds[i]);
        let (_, yes, no) = scored
            .into_iter()
            .nth(i)
            .flatten()
            .ok_or_else(|| LearnerError::CandidatesNotExpressible("lost split".to_string()))?;
        Ok((Decision::Value(preds[i].clone()), yes, no))
    }
}

/// Datapoints the predicate may hold on, and those it may fail on. A
/// datapoint the predicate is undetermined on goes to both.
fn partition(pred: &Term, points: &[Datapoint]) -> (Vec<Datapoint>, Vec<Datapoint>) {
    let mut yes = vec![];
    let mut no = vec![];
    for p in points {
        match eval_bool(pred, p.valuation()) {
            Some(true) => yes.push(p.clone()),
            Some(false) => no.push(p.clone()),
            None => {
                yes.push(p.clone());
                no.push(p.clone());
            }
        }
    }
    (yes, no)
}

/// The classification error of a set: the minority among the labelled
/// datapoints plus half of the unlabelled ones.
fn error(cs: &ConstraintSystem, side: &[Datapoint]) -> f64 {
    let t = side.iter().filter(|d| cs.is_true(d)).count();
    let f = side.iter().filter(|d| cs.is_false(d)).count();
    t.min(f) as f64 + (side.len() - t - f) as f64 / 2.0
}

/// Label all of `points` the same way, if that is consistent with `cs`,
/// preferring the majority label.
fn try_leaf(cs: &ConstraintSystem, points: &[Datapoint]) -> Option<(bool, ConstraintSystem)> {
    let t = points.iter().filter(|d| cs.is_true(d)).count();
    let f = points.iter().filter(|d| cs.is_false(d)).count();
    let order = if t >= f { [true, false] } else { [false, true] };
    for polarity in order {
        let opposite = if polarity { f } else { t };
        if opposite > 0 {
            continue;
        }
        let open: Vec<Datapoint> = points
            .iter()
            .filter(|d| cs.label(d).is_none())
            .cloned()
            .collect();
        let next = if polarity {
            cs.with_true(&open)
        } else {
            cs.with_false(&open)
        };
        match next {
            Ok(next) => return Some((polarity, next)),
            Err(err) => log::trace!("cannot label {} datapoints {polarity}: {err}", open.len()),
        }
    }
    None
}

impl Learner for DecisionTreeLearner {
    fn name(&self) -> String {
        match (self.use_values, self.atoms.is_empty()) {
            (true, true) => "decision-tree".to_string(),
            (true, false) => format!("decision-tree+{}-atoms", self.atoms.len()),
            (false, _) => format!("decision-tree({}-atoms)", self.atoms.len()),
        }
    }

    fn suggest(&mut self, cs: &ConstraintSystem) -> Result<InvariantCandidates, LearnerError> {
        let tree = self.learn(cs)?;
        log::debug!(
            "learned tree of size {} over {} datapoints",
            tree.size(),
            cs.datapoints().count()
        );
        Ok(tree.candidates())
    }
}

#[cfg(test)]
mod tests {
    use super::{Decision, DecisionTree, DecisionTreeLearner};
    use crate::{
        constraints::{ConstraintSystem, ConstraintSystemBuilder},
        learner::{Learner, LearnerError},
        observation::{Constraint, Datapoint, Origin},
    };
    use cfa::{
        automaton::VarDecl,
        semantics::{Valuation, Value},
        syntax::{Sort, Term},
    };
    use petgraph::graph::NodeIndex;
    use std::collections::BTreeSet;

    fn vars() -> Vec<VarDecl> {
        vec![
            VarDecl {
                name: "x".to_string(),
                sort: Sort::Int,
            },
            VarDecl {
                name: "b".to_string(),
                sort: Sort::Bool,
            },
        ]
    }

    fn at(site: usize, x: i64) -> Datapoint {
        let valuation = Valuation::from([
            ("x".to_string(), Value::Int(x)),
            ("b".to_string(), Value::Bool(false)),
        ]);
        Datapoint::new(NodeIndex::new(site), valuation)
    }

    fn fact(dp: Datapoint) -> Constraint {
        Constraint {
            sources: vec![],
            target: Some(dp),
            origin: Origin::Clause(0),
        }
    }

    fn refute(dp: Datapoint) -> Constraint {
        Constraint {
            sources: vec![dp],
            target: None,
            origin: Origin::Clause(1),
        }
    }

    fn step(from: Datapoint, to: Datapoint) -> Constraint {
        Constraint {
            sources: vec![from],
            target: Some(to),
            origin: Origin::Clause(2),
        }
    }

    /// Every labelled datapoint is classified by its label.
    fn consistent(tree: &DecisionTree, cs: &ConstraintSystem) -> bool {
        cs.datapoints().all(|dp| match cs.label(dp) {
            Some(l) => tree.classify(dp) == Some(l.polarity),
            None => true,
        })
    }

    #[test]
    fn test_empty() {
        let learner = DecisionTreeLearner::new(&vars());
        let tree = learner.learn(&ConstraintSystem::new()).unwrap();
        assert_eq!(tree, DecisionTree::Leaf(true));
        assert_eq!(tree.candidates().formula(NodeIndex::new(3)), Term::true_());
    }

    #[test_log::test]
    fn test_threshold() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(fact(at(0, 0))).unwrap();
        b.add_constraint(step(at(0, 0), at(0, 1))).unwrap();
        b.add_constraint(refute(at(0, 2))).unwrap();
        let cs = b.build();
        let mut learner = DecisionTreeLearner::new(&vars());
        let tree = learner.learn(&cs).unwrap();
        assert!(consistent(&tree, &cs));
        assert_eq!(tree.size(), 3);
        let candidates = learner.suggest(&cs).unwrap();
        insta::assert_snapshot!(candidates.formula(NodeIndex::new(0)), @"(x <= 1)");
    }

    #[test]
    fn test_implications_are_committed() {
        // x=5 => x=6 and x=6 => false: labelling x=5 true is inconsistent
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(fact(at(0, 0))).unwrap();
        b.add_constraint(step(at(0, 5), at(0, 6))).unwrap();
        b.add_constraint(refute(at(0, 6))).unwrap();
        let cs = b.build();
        assert!(cs.is_false(&at(0, 5)));
        let tree = DecisionTreeLearner::new(&vars()).learn(&cs).unwrap();
        assert!(consistent(&tree, &cs));
        assert_eq!(tree.classify(&at(0, 5)), Some(false));
    }

    #[test]
    fn test_sites() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(fact(at(0, 0))).unwrap();
        b.add_constraint(refute(at(1, 0))).unwrap();
        let cs = b.build();
        let tree = DecisionTreeLearner::new(&vars()).learn(&cs).unwrap();
        assert!(matches!(
            &tree,
            DecisionTree::Node { decision: Decision::Invariant(sites), .. }
                if *sites == BTreeSet::from([NodeIndex::new(0)])
        ));
        let candidates = tree.candidates();
        assert_eq!(candidates.formula(NodeIndex::new(0)), Term::true_());
        assert_eq!(candidates.formula(NodeIndex::new(1)), Term::false_());
    }

    #[test]
    fn test_atoms() {
        let mut b = ConstraintSystemBuilder::new();
        b.add_constraint(fact(at(0, 0))).unwrap();
        b.add_constraint(refute(at(0, 3))).unwrap();
        let cs = b.build();

        let mut none = DecisionTreeLearner::atoms_only(&vars(), vec![]);
        assert!(matches!(
            none.suggest(&cs),
            Err(LearnerError::CandidatesNotExpressible(_))
        ));

        let atom = Term::lt(Term::id("x"), Term::int(2));
        let mut some = DecisionTreeLearner::atoms_only(&vars(), vec![atom.clone()]);
        assert_eq!(some.suggest(&cs).unwrap().formula(NodeIndex::new(0)), atom);
        assert_eq!(some.name(), "decision-tree(1-atoms)");
    }
}
