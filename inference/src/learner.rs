// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Learners propose candidate invariants consistent with a constraint
//! system, and combinators try several of them.

use chc::InvariantCandidates;
use thiserror::Error;

use crate::constraints::ConstraintSystem;

/// Why a learner could not propose candidates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LearnerError {
    /// No candidate in the learner's vocabulary is consistent with the
    /// constraints
    #[error("candidates not expressible: {0}")]
    CandidatesNotExpressible(String),
}

/// Something that proposes candidates from constraints.
pub trait Learner: Send {
    /// A short name for logs.
    fn name(&self) -> String;

    /// Propose candidates consistent with `cs`. The result depends only on
    /// `cs`.
    fn suggest(&mut self, cs: &ConstraintSystem) -> Result<InvariantCandidates, LearnerError>;
}

/// Tries its learners in order until one succeeds.
pub struct FallbackLearner {
    learners: Vec<Box<dyn Learner>>,
}

impl FallbackLearner {
    #[allow(missing_docs)]
    pub fn new(learners: Vec<Box<dyn Learner>>) -> Self {
        Self { learners }
    }
}

fn try_in_order<'a, I>(
    learners: I,
    cs: &ConstraintSystem,
) -> Result<InvariantCandidates, LearnerError>
where
    I: Iterator<Item = &'a mut Box<dyn Learner>>,
{
    let mut reasons = vec![];
    for learner in learners {
        match learner.suggest(cs) {
            Ok(candidates) => return Ok(candidates),
            Err(LearnerError::CandidatesNotExpressible(reason)) => {
                log::debug!("learner {} gave up: {reason}", learner.name());
                reasons.push(format!("{}: {reason}", learner.name()));
            }
        }
    }
    Err(LearnerError::CandidatesNotExpressible(if reasons.is_empty() {
        "no learners".to_string()
    } else {
        reasons.join("; ")
    }))
}

impl Learner for FallbackLearner {
    fn name(&self) -> String {
        let names: Vec<String> = self.learners.iter().map(|l| l.name()).collect();
        format!("fallback[{}]", names.join(", "))
    }

    fn suggest(&mut self, cs: &ConstraintSystem) -> Result<InvariantCandidates, LearnerError> {
        try_in_order(self.learners.iter_mut(), cs)
    }
}

/// Starts each call at the next learner in turn, falling through the rest.
pub struct RoundRobinLearner {
    learners: Vec<Box<dyn Learner>>,
    next: usize,
}

impl RoundRobinLearner {
    #[allow(missing_docs)]
    pub fn new(learners: Vec<Box<dyn Learner>>) -> Self {
        Self::starting_at(learners, 0)
    }

    /// A round robin whose first call starts at learner `start`.
    pub fn starting_at(learners: Vec<Box<dyn Learner>>, start: usize) -> Self {
        let next = if learners.is_empty() {
            0
        } else {
            start % learners.len()
        };
        Self { learners, next }
    }
}

impl Learner for RoundRobinLearner {
    fn name(&self) -> String {
        let names: Vec<String> = self.learners.iter().map(|l| l.name()).collect();
        format!("round-robin[{}]", names.join(", "))
    }

    fn suggest(&mut self, cs: &ConstraintSystem) -> Result<InvariantCandidates, LearnerError> {
        let start = self.next;
        if !self.learners.is_empty() {
            self.next = (start + 1) % self.learners.len();
        }
        let (before, after) = self.learners.split_at_mut(start);
        try_in_order(after.iter_mut().chain(before.iter_mut()), cs)
    }
}

#[cfg(test)]
mod tests {
    use super::{FallbackLearner, Learner, LearnerError, RoundRobinLearner};
    use crate::constraints::ConstraintSystem;
    use chc::InvariantCandidates;
    use std::sync::{Arc, Mutex};

    /// Succeeds with `true` candidates, or always fails.
    struct Fixed {
        name: &'static str,
        works: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Learner for Fixed {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn suggest(&mut self, _: &ConstraintSystem) -> Result<InvariantCandidates, LearnerError> {
            self.calls.lock().unwrap().push(self.name);
            if self.works {
                Ok(InvariantCandidates::true_())
            } else {
                Err(LearnerError::CandidatesNotExpressible("stuck".to_string()))
            }
        }
    }

    fn learners(
        script: &[(&'static str, bool)],
        calls: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Vec<Box<dyn Learner>> {
        script
            .iter()
            .map(|&(name, works)| {
                Box::new(Fixed {
                    name,
                    works,
                    calls: calls.clone(),
                }) as Box<dyn Learner>
            })
            .collect()
    }

    #[test]
    fn test_fallback() {
        let calls = Arc::new(Mutex::new(vec![]));
        let cs = ConstraintSystem::new();
        let mut l =
            FallbackLearner::new(learners(&[("a", false), ("b", true), ("c", true)], &calls));
        assert!(l.suggest(&cs).is_ok());
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(l.name(), "fallback[a, b, c]");

        let mut l = FallbackLearner::new(learners(&[("a", false), ("b", false)], &calls));
        assert_eq!(
            l.suggest(&cs),
            Err(LearnerError::CandidatesNotExpressible("a: stuck; b: stuck".to_string()))
        );
    }

    #[test]
    fn test_round_robin() {
        let calls = Arc::new(Mutex::new(vec![]));
        let cs = ConstraintSystem::new();
        let mut l = RoundRobinLearner::starting_at(
            learners(&[("a", true), ("b", false), ("c", true)], &calls),
            1,
        );
        for _ in 0..3 {
            assert!(l.suggest(&cs).is_ok());
        }
        // b fails and falls through to c
        assert_eq!(*calls.lock().unwrap(), vec!["b", "c", "c", "a"]);
        assert!(RoundRobinLearner::new(vec![]).suggest(&cs).is_err());
    }
}
