// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Alternate learning and teaching until the candidates are inductive or
//! the constraints are contradictory.

use std::time::Instant;

use chc::{ChcSystem, InvariantCandidates};
use solver::{basics::SessionError, conf::SolverConf};
use thiserror::Error;

use crate::{
    constraints::{ConstraintSystemBuilder, ContradictoryError},
    dtree::DecisionTreeLearner,
    learner::{FallbackLearner, Learner, LearnerError, RoundRobinLearner},
    parallel::solve_concurrently,
    teacher::Teacher,
};

/// How many workers to run and what they may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
    /// Number of learners; more than one runs the concurrent coordinator
    pub learners: usize,
    /// Number of teachers, each with its own solver session; more than one
    /// runs the concurrent coordinator
    pub teachers: usize,
    /// Seed the learners with the atoms of the clause bodies
    pub use_atoms: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            learners: 1,
            teachers: 1,
            use_atoms: false,
        }
    }
}

impl InferenceConfig {
    /// Whether the configuration calls for the concurrent coordinator.
    pub fn is_concurrent(&self) -> bool {
        self.learners > 1 || self.teachers > 1
    }

    /// The `k`-th learner for `system`. With atoms, learners prefer
    /// candidates over the atoms and fall back to value thresholds; in a
    /// concurrent run learner `k` starts its rotation at position `k`.
    pub fn learner(&self, system: &ChcSystem, k: usize) -> Box<dyn Learner> {
        let vars = system.variables();
        if !self.use_atoms {
            return Box::new(DecisionTreeLearner::new(vars));
        }
        let atoms = system.atoms();
        let members: Vec<Box<dyn Learner>> = vec![
            Box::new(DecisionTreeLearner::atoms_only(vars, atoms.clone())),
            Box::new(DecisionTreeLearner::new(vars).with_atoms(atoms)),
        ];
        if self.is_concurrent() {
            Box::new(RoundRobinLearner::starting_at(members, k))
        } else {
            Box::new(FallbackLearner::new(members))
        }
    }
}

/// The outcome of inference.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Inductive invariants proving the error location unreachable
    Safe(InvariantCandidates),
    /// A derivation showing no invariant exists
    Unsafe(ContradictoryError),
}

/// The state of a coordinator.
#[derive(Debug, Clone)]
pub enum State {
    #[allow(missing_docs)]
    Iterating,
    #[allow(missing_docs)]
    Done(Verdict),
}

/// Why inference did not produce invariants.
#[derive(Error, Debug)]
pub enum SolveError {
    /// The program is unsafe
    #[error("program is unsafe: {0}")]
    Unsafe(#[from] ContradictoryError),
    /// Every learner ran out of candidates
    #[error(transparent)]
    NotExpressible(#[from] LearnerError),
    /// A solver session failed
    #[error(transparent)]
    Session(#[from] SessionError),
    /// A round produced only constraints that were already known
    #[error("no progress: the teacher reported only known constraints")]
    NoProgress,
    /// A worker stopped before inference finished
    #[error("inference workers disconnected")]
    Disconnected,
}

/// Runs one learner and one teacher in lockstep on the current thread.
pub struct SequentialCoordinator<'a> {
    system: &'a ChcSystem,
    learner: Box<dyn Learner>,
    teacher: Teacher,
    builder: ConstraintSystemBuilder,
    state: State,
    rounds: usize,
}

impl<'a> SequentialCoordinator<'a> {
    /// A coordinator with a fresh solver session.
    pub fn new(
        system: &'a ChcSystem,
        conf: &SolverConf,
        config: &InferenceConfig,
    ) -> Result<Self, SolveError> {
        Ok(Self::with_parts(
            system,
            config.learner(system, 0),
            Teacher::new(conf, system)?,
        ))
    }

    /// A coordinator from an explicit learner and teacher.
    pub fn with_parts(system: &'a ChcSystem, learner: Box<dyn Learner>, teacher: Teacher) -> Self {
        Self {
            system,
            learner,
            teacher,
            builder: ConstraintSystemBuilder::new(),
            state: State::Iterating,
            rounds: 0,
        }
    }

    /// The current state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The number of completed rounds.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Run one learn-check round, unless already done.
    pub fn step(&mut self) -> Result<&State, SolveError> {
        if let State::Done(_) = self.state {
            return Ok(&self.state);
        }
        let cs = self.builder.build();
        let candidates = self.learner.suggest(&cs)?;
        log::debug!(
            "round {}: candidates\n{}",
            self.rounds,
            candidates.display(self.system.cfa())
        );
        let start = Instant::now();
        let checked = self.teacher.check_candidates(self.system, &candidates)?;
        log::debug!(
            "round {}: checked in {:.1}ms",
            self.rounds,
            start.elapsed().as_secs_f64() * 1000.0
        );
        self.rounds += 1;
        match checked {
            None => self.state = State::Done(Verdict::Safe(candidates)),
            Some(found) => match self.builder.add_constraints(found) {
                Ok(0) => return Err(SolveError::NoProgress),
                Ok(added) => {
                    self.builder.simplify();
                    log::info!(
                        "round {}: {added} new constraints, {} in total",
                        self.rounds,
                        self.builder.build().len()
                    );
                }
                Err(err) => self.state = State::Done(Verdict::Unsafe(err)),
            },
        }
        Ok(&self.state)
    }

    /// Run rounds until done.
    pub fn run(mut self) -> Result<Verdict, SolveError> {
        loop {
            if let State::Done(verdict) = self.step()? {
                let verdict = verdict.clone();
                log::info!("done after {} rounds", self.rounds);
                return Ok(verdict);
            }
        }
    }
}

/// Infer invariants for `system`, returning the verdict.
pub fn infer(
    system: &ChcSystem,
    conf: &SolverConf,
    config: &InferenceConfig,
) -> Result<Verdict, SolveError> {
    log::info!(
        "inferring invariants for {} loop heads with {} learners and {} teachers",
        system.invariants().len(),
        config.learners,
        config.teachers
    );
    if config.is_concurrent() {
        solve_concurrently(system, conf, config)
    } else {
        SequentialCoordinator::new(system, conf, config)?.run()
    }
}

/// Infer invariants for `system`. A proof of unsafety is reported as
/// [`SolveError::Unsafe`].
pub fn solve_chc_system(
    system: &ChcSystem,
    conf: &SolverConf,
    config: &InferenceConfig,
) -> Result<InvariantCandidates, SolveError> {
    match infer(system, conf, config)? {
        Verdict::Safe(candidates) => Ok(candidates),
        Verdict::Unsafe(err) => Err(SolveError::Unsafe(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        infer, solve_chc_system, InferenceConfig, SequentialCoordinator, SolveError, State, Verdict,
    };
    use crate::{observation::Origin, teacher::verify_candidates};
    use cfa::{
        automaton::{Cfa, CfaBuilder},
        semantics::{eval_bool, Valuation, Value},
        syntax::{Sort, Stmt, Term},
    };
    use chc::{cfa_to_chc, ChcSystem, InvariantCandidates};
    use eyre::WrapErr;
    use solver::conf::{Backend, SolverConf};

    fn bounded() -> SolverConf {
        SolverConf::new(Backend::Bounded { radius: 3 })
    }

    fn id(v: &str) -> Term {
        Term::id(v)
    }

    fn zero() -> Term {
        Term::int(0)
    }

    /// Every clause holds under the candidates.
    fn check_inductive(system: &ChcSystem, candidates: &InvariantCandidates) -> eyre::Result<()> {
        let mut session = bounded().session(&system.signature())?;
        let violated = verify_candidates(system, candidates, session.as_mut())
            .wrap_err("verification failed")?;
        eyre::ensure!(violated.is_empty(), "violated clauses {violated:?}");
        Ok(())
    }

    /// x := 0; assume x != 0
    fn straight_line() -> Cfa {
        CfaBuilder::new("entry", "error")
            .var("x", Sort::Int)
            .edge(
                "entry",
                "error",
                [Stmt::assign("x", zero()), Stmt::assume(Term::not_equals(id("x"), zero()))],
            )
            .build()
            .unwrap()
    }

    /// Two independent branches, each `v := 0; assume v != 0`.
    fn two_branches() -> Cfa {
        CfaBuilder::new("entry", "error")
            .var("x", Sort::Int)
            .var("y", Sort::Int)
            .edge(
                "entry",
                "error",
                [Stmt::assign("x", zero()), Stmt::assume(Term::not_equals(id("x"), zero()))],
            )
            .edge(
                "entry",
                "error",
                [Stmt::assign("y", zero()), Stmt::assume(Term::not_equals(id("y"), zero()))],
            )
            .build()
            .unwrap()
    }

    /// x := 0, then a loop incrementing y with an exit to the error
    /// location when x != 0.
    fn counter() -> Cfa {
        CfaBuilder::new("entry", "error")
            .var("x", Sort::Int)
            .var("y", Sort::Int)
            .edge("entry", "mid", [Stmt::assign("x", zero())])
            .edge("mid", "mid", [Stmt::assign("y", Term::add(id("y"), Term::int(1)))])
            .edge("mid", "error", [Stmt::assume(Term::not_equals(id("x"), zero()))])
            .build()
            .unwrap()
    }

    /// Two branches into a loop at mid, setting x resp. y to 0, with error
    /// exits on x != 0 and y != 0 taken from mid.
    fn merge() -> Cfa {
        let both = Term::and([Term::equals(id("x"), zero()), Term::equals(id("y"), zero())]);
        CfaBuilder::new("entry", "error")
            .var("x", Sort::Int)
            .var("y", Sort::Int)
            .edge("entry", "mid", [Stmt::assign("x", zero())])
            .edge("entry", "mid", [Stmt::assign("y", zero())])
            .edge("mid", "mid", [])
            .edge("mid", "error", [Stmt::assume(Term::not_equals(id("x"), zero()))])
            .edge("mid", "error", [Stmt::assume(Term::not_equals(id("y"), zero()))])
            .edge("mid", "final", [Stmt::assume(both)])
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_straight_line_is_safe() -> eyre::Result<()> {
        let system = cfa_to_chc(&straight_line())?;
        assert_eq!(system.simples().len(), 1);
        assert!(system.invariants().is_empty());
        let candidates = solve_chc_system(&system, &bounded(), &InferenceConfig::default())?;
        assert_eq!(candidates, InvariantCandidates::true_());
        check_inductive(&system, &candidates)
    }

    #[test_log::test]
    fn test_unreachable_branches_are_safe() -> eyre::Result<()> {
        let system = cfa_to_chc(&two_branches())?;
        assert_eq!(system.simples().len(), 2);
        let candidates = solve_chc_system(&system, &bounded(), &InferenceConfig::default())?;
        check_inductive(&system, &candidates)
    }

    #[test_log::test]
    fn test_counter_is_safe() -> eyre::Result<()> {
        let cfa = counter();
        let system = cfa_to_chc(&cfa)?;
        let mid = cfa.location("mid").unwrap();
        let mut coordinator =
            SequentialCoordinator::new(&system, &bounded(), &InferenceConfig::default())?;
        while let State::Iterating = coordinator.step()? {
            assert!(coordinator.rounds() < 20, "no convergence");
        }
        let State::Done(Verdict::Safe(candidates)) = coordinator.state() else {
            panic!("expected a safe verdict, got {:?}", coordinator.state());
        };
        check_inductive(&system, candidates)?;
        // the invariant at mid excludes every state with x != 0
        let inv = candidates.formula(mid);
        for (x, y) in [(1, 0), (-2, 3), (3, -1)] {
            let state = Valuation::from([
                ("x".to_string(), Value::Int(x)),
                ("y".to_string(), Value::Int(y)),
            ]);
            assert_eq!(eval_bool(&inv, &state), Some(false), "{inv} admits x = {x}");
        }
        Ok(())
    }

    #[test_log::test]
    fn test_merge_is_unsafe() -> eyre::Result<()> {
        let cfa = merge();
        let system = cfa_to_chc(&cfa)?;
        let verdict = infer(&system, &bounded(), &InferenceConfig::default())?;
        let Verdict::Unsafe(err) = verdict else {
            panic!("expected an unsafe verdict");
        };
        assert!(!err.is_speculative());
        let last = err.witness.last().unwrap();
        assert!(last.target.is_none());
        assert!(matches!(last.origin, Origin::Clause(_)));
        assert!(err.witness.iter().all(|c| !c.sources.is_empty() || c.target.is_some()));

        let result = solve_chc_system(&system, &bounded(), &InferenceConfig::default());
        assert!(matches!(result, Err(SolveError::Unsafe(_))));
        Ok(())
    }

    #[test_log::test]
    fn test_concurrent_counter() -> eyre::Result<()> {
        let system = cfa_to_chc(&counter())?;
        let config = InferenceConfig {
            learners: 2,
            teachers: 2,
            use_atoms: true,
        };
        let candidates = solve_chc_system(&system, &bounded(), &config)?;
        check_inductive(&system, &candidates)
    }

    #[test_log::test]
    fn test_concurrent_merge() -> eyre::Result<()> {
        let system = cfa_to_chc(&merge())?;
        let config = InferenceConfig {
            learners: 2,
            teachers: 1,
            use_atoms: false,
        };
        assert!(matches!(
            infer(&system, &bounded(), &config)?,
            Verdict::Unsafe(_)
        ));
        Ok(())
    }
}
