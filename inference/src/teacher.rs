// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The teacher checks candidates against every clause and turns each
//! violation into a constraint between datapoints.

use std::time::Instant;

use cfa::{
    automaton::Loc,
    semantics::Valuation,
    ssa::{unversioned, Indexing},
};
use chc::{Chc, ChcSystem, InvariantCandidates};
use solver::{
    basics::{check_with_model, BasicCanceler, SessionError, SolverSession},
    conf::SolverConf,
};

use crate::observation::{Constraint, Datapoint, Origin};

/// Owns one solver session for its lifetime.
pub struct Teacher {
    session: Box<dyn SolverSession>,
}

impl Teacher {
    /// A teacher with a fresh session over the variables of `system`.
    pub fn new(conf: &SolverConf, system: &ChcSystem) -> Result<Self, SessionError> {
        Ok(Self::from_session(conf.session(&system.signature())?))
    }

    #[allow(missing_docs)]
    pub fn from_session(session: Box<dyn SolverSession>) -> Self {
        Self { session }
    }

    /// Cancels the session's in-flight and future checks.
    pub fn canceler(&self) -> Box<dyn BasicCanceler> {
        self.session.canceler()
    }

    /// Check every clause against `candidates`. Returns one constraint per
    /// violated clause, or `None` if no clause is violated and the
    /// candidates are inductive invariants.
    pub fn check_candidates(
        &mut self,
        system: &ChcSystem,
        candidates: &InvariantCandidates,
    ) -> Result<Option<Vec<Constraint>>, SessionError> {
        let names: Vec<&str> = system.variables().iter().map(|v| v.name.as_str()).collect();
        let mut constraints = vec![];
        for (i, chc) in system.chcs().iter().enumerate() {
            let start = Instant::now();
            let trans = chc.transition();
            let initial = Indexing::new();
            let mut query = vec![];
            if chc.pre().loop_head().is_some() {
                query.extend(names.iter().map(|v| initial.name(v)));
            }
            if chc.post().loop_head().is_some() {
                query.extend(names.iter().map(|v| trans.indexing.name(v)));
            }
            query.sort();
            query.dedup();

            let violation = chc.violation(candidates);
            let model = check_with_model(self.session.as_mut(), &violation, &query)?;
            log::debug!(
                "clause {i} {} in {:.1}ms",
                if model.is_some() { "violated" } else { "holds" },
                start.elapsed().as_secs_f64() * 1000.0
            );
            if let Some(model) = model {
                let c = counterexample(i, chc, &names, &model);
                log::trace!("counterexample {}", c.display(system.cfa()));
                constraints.push(c);
            }
        }
        Ok(if constraints.is_empty() {
            None
        } else {
            Some(constraints)
        })
    }
}

/// The constraint a model of clause `i`'s violation formula witnesses.
fn counterexample(i: usize, chc: &Chc, names: &[&str], model: &Valuation) -> Constraint {
    let project = |site: Loc, indexing: &Indexing| {
        let valuation: Valuation = names
            .iter()
            .filter_map(|v| Some((v.to_string(), *model.get(&indexing.name(v))?)))
            .collect();
        Datapoint::new(site, valuation)
    };
    let sources = chc
        .pre()
        .loop_head()
        .map(|l| project(l, &Indexing::new()))
        .into_iter()
        .collect();
    let target = chc
        .post()
        .loop_head()
        .map(|l| project(l, &chc.transition().indexing));
    Constraint {
        sources,
        target,
        origin: Origin::Clause(i),
    }
}

/// Look for a run from the entry straight to the error location, ignoring
/// loops entirely. Returns the index of a satisfiable simple clause and the
/// initial values of a run through it.
pub fn find_failing_path(
    system: &ChcSystem,
    session: &mut dyn SolverSession,
) -> Result<Option<(usize, Valuation)>, SessionError> {
    let names: Vec<String> = system
        .variables()
        .iter()
        .map(|v| Indexing::new().name(&v.name))
        .collect();
    for (i, chc) in system.chcs().iter().enumerate() {
        let Chc::Simple { trans } = chc else {
            continue;
        };
        if let Some(model) = check_with_model(session, &trans.body, &names)? {
            let initial = model
                .into_iter()
                .filter_map(|(v, val)| Some((unversioned(&v)?.0.to_string(), val)))
                .collect();
            log::info!("simple clause {i} reaches the error location");
            return Ok(Some((i, initial)));
        }
    }
    Ok(None)
}

/// Independently check candidates against every clause, with the
/// candidates' default for sites they leave out. Returns the indices of the
/// violated clauses.
pub fn verify_candidates(
    system: &ChcSystem,
    candidates: &InvariantCandidates,
    session: &mut dyn SolverSession,
) -> Result<Vec<usize>, SessionError> {
    let mut violated = vec![];
    for (i, chc) in system.chcs().iter().enumerate() {
        let formula = chc.to_solver_expr(candidates, candidates.default());
        if check_with_model(session, &formula, &[])?.is_some() {
            violated.push(i);
        }
    }
    Ok(violated)
}
