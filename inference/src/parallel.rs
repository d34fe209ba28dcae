// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The concurrent coordinator.
//!
//! Learners and teachers run on their own threads. Constraint snapshots and
//! candidates are handed over through [`Slot`]s, which keep only the latest
//! value, and workers report back to the coordinator over a bounded
//! channel. Only the coordinator thread touches the constraint builder.

use std::collections::BTreeSet;
use std::sync::{mpsc, Condvar, Mutex};
use std::thread;

use chc::{ChcSystem, InvariantCandidates};
use solver::{
    basics::{BasicCanceler, MultiCanceler, SessionError},
    conf::SolverConf,
};

use crate::{
    constraints::{ConstraintSystem, ConstraintSystemBuilder},
    coordinator::{InferenceConfig, SolveError, Verdict},
    learner::{Learner, LearnerError},
    observation::Constraint,
    teacher::Teacher,
};

struct SlotState<T> {
    value: Option<T>,
    generation: u64,
    closed: bool,
}

/// A single-value hand-off where a new value replaces a pending one.
///
/// Every published value gets a generation number; readers wait for a
/// generation newer than the last one they saw. Closing the slot wakes all
/// waiting readers.
pub struct Slot<T> {
    state: Mutex<SlotState<T>>,
    cond: Condvar,
}

impl<T: Clone> Slot<T> {
    /// An empty, open slot.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                generation: 0,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Replace the value, returning its generation.
    pub fn publish(&self, value: T) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.value = Some(value);
        self.cond.notify_all();
        state.generation
    }

    /// Publish `value` if the slot is empty or `replaces` holds of the
    /// current value. Returns whether it was published.
    pub fn offer<F>(&self, value: T, replaces: F) -> bool
    where
        F: FnOnce(&T) -> bool,
    {
        let mut state = self.state.lock().unwrap();
        if state.value.as_ref().is_some_and(|v| !replaces(v)) {
            return false;
        }
        state.generation += 1;
        state.value = Some(value);
        self.cond.notify_all();
        true
    }

    /// Block until a value newer than generation `seen` is published, and
    /// return it with its generation. Returns `None` once the slot is closed.
    pub fn wait_newer(&self, seen: u64) -> Option<(u64, T)> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return None;
            }
            if state.generation > seen {
                if let Some(value) = &state.value {
                    return Some((state.generation, value.clone()));
                }
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Close the slot.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.cond.notify_all();
    }
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What workers report to the coordinator. `snapshot` is the generation of
/// the constraint snapshot the work was based on.
enum Event {
    Checked {
        teacher: usize,
        snapshot: u64,
        candidates: InvariantCandidates,
        result: Result<Option<Vec<Constraint>>, SessionError>,
    },
    LearnerFailed {
        learner: usize,
        snapshot: u64,
        error: LearnerError,
    },
}

fn run_learner(
    k: usize,
    mut learner: Box<dyn Learner>,
    snapshots: &Slot<ConstraintSystem>,
    candidates: &Slot<(u64, InvariantCandidates)>,
    events: mpsc::SyncSender<Event>,
) {
    log::debug!("learner {k} ({}) started", learner.name());
    let mut seen = 0;
    while let Some((snapshot, cs)) = snapshots.wait_newer(seen) {
        seen = snapshot;
        match learner.suggest(&cs) {
            Ok(c) => {
                // candidates from an older snapshot never replace newer ones
                candidates.offer((snapshot, c), |(pending, _)| snapshot >= *pending);
            }
            Err(error) => {
                let failed = Event::LearnerFailed {
                    learner: k,
                    snapshot,
                    error,
                };
                if events.send(failed).is_err() {
                    break;
                }
            }
        }
    }
    log::debug!("learner {k} stopped");
}

fn run_teacher(
    j: usize,
    mut teacher: Teacher,
    system: &ChcSystem,
    candidates: &Slot<(u64, InvariantCandidates)>,
    events: mpsc::SyncSender<Event>,
) {
    log::debug!("teacher {j} started");
    let mut seen = 0;
    while let Some((generation, (snapshot, c))) = candidates.wait_newer(seen) {
        seen = generation;
        let result = teacher.check_candidates(system, &c);
        let checked = Event::Checked {
            teacher: j,
            snapshot,
            candidates: c,
            result,
        };
        if events.send(checked).is_err() {
            break;
        }
    }
    log::debug!("teacher {j} stopped");
}

/// Apply worker reports until a verdict is reached. Returns after the
/// receiver is dropped, which unblocks workers waiting to send.
fn coordinate(
    learners: usize,
    snapshots: &Slot<ConstraintSystem>,
    events: mpsc::Receiver<Event>,
) -> Result<Verdict, SolveError> {
    let mut builder = ConstraintSystemBuilder::new();
    let mut current = snapshots.publish(builder.build());
    let mut failed: BTreeSet<usize> = BTreeSet::new();
    let mut rounds = 0;
    loop {
        let first = events.recv().map_err(|_| SolveError::Disconnected)?;
        // everything already reported is applied before the next snapshot
        let batch: Vec<Event> = [first].into_iter().chain(events.try_iter()).collect();
        let mut added = 0;
        let mut stalled = false;
        for event in batch {
            match event {
                Event::Checked {
                    teacher,
                    candidates,
                    result: Ok(None),
                    ..
                } => {
                    log::info!("teacher {teacher} accepted candidates after {rounds} rounds");
                    return Ok(Verdict::Safe(candidates));
                }
                Event::Checked {
                    teacher,
                    snapshot,
                    result: Ok(Some(found)),
                    ..
                } => {
                    let n = match builder.add_constraints(found) {
                        Ok(n) => n,
                        Err(err) => return Ok(Verdict::Unsafe(err)),
                    };
                    log::debug!("teacher {teacher}: {n} new constraints from snapshot {snapshot}");
                    stalled |= n == 0 && snapshot == current;
                    added += n;
                }
                Event::Checked {
                    result: Err(err), ..
                } => return Err(SolveError::Session(err)),
                Event::LearnerFailed {
                    learner,
                    snapshot,
                    error,
                } => {
                    log::debug!("learner {learner} failed on snapshot {snapshot}: {error}");
                    if snapshot == current {
                        failed.insert(learner);
                        if failed.len() == learners {
                            return Err(SolveError::NotExpressible(error));
                        }
                    }
                }
            }
        }
        if stalled && added == 0 {
            return Err(SolveError::NoProgress);
        }
        if added > 0 {
            builder.simplify();
            rounds += 1;
            current = snapshots.publish(builder.build());
            failed.clear();
            log::info!(
                "round {rounds}: {added} new constraints, {} in total",
                builder.build().len()
            );
        }
    }
}

/// Run `config.learners` learners and `config.teachers` teachers
/// concurrently until one teacher accepts a candidate or the constraints
/// become contradictory. All workers are stopped before returning.
pub fn solve_concurrently(
    system: &ChcSystem,
    conf: &SolverConf,
    config: &InferenceConfig,
) -> Result<Verdict, SolveError> {
    let learners: Vec<Box<dyn Learner>> = (0..config.learners.max(1))
        .map(|k| config.learner(system, k))
        .collect();
    let teachers = (0..config.teachers.max(1))
        .map(|_| Teacher::new(conf, system))
        .collect::<Result<Vec<_>, _>>()?;
    let cancelers = MultiCanceler::new();
    for t in &teachers {
        cancelers.add_canceler(t.canceler());
    }

    let snapshots: Slot<ConstraintSystem> = Slot::new();
    let candidates: Slot<(u64, InvariantCandidates)> = Slot::new();
    let (tx, rx) = mpsc::sync_channel(learners.len() + teachers.len());
    let n_learners = learners.len();

    thread::scope(|s| {
        for (k, learner) in learners.into_iter().enumerate() {
            let (snapshots, candidates, tx) = (&snapshots, &candidates, tx.clone());
            s.spawn(move || run_learner(k, learner, snapshots, candidates, tx));
        }
        for (j, teacher) in teachers.into_iter().enumerate() {
            let (candidates, tx) = (&candidates, tx.clone());
            s.spawn(move || run_teacher(j, teacher, system, candidates, tx));
        }
        drop(tx);

        let verdict = coordinate(n_learners, &snapshots, rx);
        snapshots.close();
        candidates.close();
        cancelers.cancel();
        verdict
    })
}

#[cfg(test)]
mod tests {
    use super::{coordinate, Event, Slot};
    use crate::{
        constraints::ConstraintSystem,
        coordinator::{SolveError, Verdict},
        learner::LearnerError,
        observation::{Constraint, Datapoint, Origin},
    };
    use cfa::semantics::{Valuation, Value};
    use chc::InvariantCandidates;
    use petgraph::graph::NodeIndex;
    use std::sync::{mpsc, Arc};
    use std::thread;

    fn failed(learner: usize, snapshot: u64) -> Event {
        Event::LearnerFailed {
            learner,
            snapshot,
            error: LearnerError::CandidatesNotExpressible(format!("learner {learner}")),
        }
    }

    fn checked(snapshot: u64, found: Option<Vec<Constraint>>) -> Event {
        Event::Checked {
            teacher: 0,
            snapshot,
            candidates: InvariantCandidates::true_(),
            result: Ok(found),
        }
    }

    fn fact() -> Constraint {
        let valuation = Valuation::from([("x".to_string(), Value::Int(0))]);
        Constraint {
            sources: vec![],
            target: Some(Datapoint::new(NodeIndex::new(0), valuation)),
            origin: Origin::Clause(0),
        }
    }

    #[test]
    fn test_every_learner_failing() {
        let snapshots: Slot<ConstraintSystem> = Slot::new();
        let (tx, rx) = mpsc::sync_channel(4);
        // the first snapshot is generation 1; a failure on an older one is stale
        tx.send(failed(0, 1)).unwrap();
        tx.send(failed(1, 0)).unwrap();
        drop(tx);
        assert!(matches!(
            coordinate(2, &snapshots, rx),
            Err(SolveError::Disconnected)
        ));

        let snapshots: Slot<ConstraintSystem> = Slot::new();
        let (tx, rx) = mpsc::sync_channel(4);
        tx.send(failed(0, 1)).unwrap();
        tx.send(failed(1, 1)).unwrap();
        assert!(matches!(
            coordinate(2, &snapshots, rx),
            Err(SolveError::NotExpressible(_))
        ));
    }

    #[test]
    fn test_known_constraints_stall() {
        let snapshots: Slot<ConstraintSystem> = Slot::new();
        let (tx, rx) = mpsc::sync_channel(4);
        let result = thread::scope(|s| {
            let coordinator = s.spawn(|| coordinate(1, &snapshots, rx));
            tx.send(checked(1, Some(vec![fact()]))).unwrap();
            // wait for the snapshot holding the fact
            let (generation, cs) = snapshots.wait_newer(1).unwrap();
            assert_eq!(generation, 2);
            assert_eq!(cs.len(), 1);
            tx.send(checked(generation, Some(vec![fact()]))).unwrap();
            coordinator.join().unwrap()
        });
        assert!(matches!(result, Err(SolveError::NoProgress)));
    }

    #[test]
    fn test_accepted_candidates() {
        let snapshots: Slot<ConstraintSystem> = Slot::new();
        let (tx, rx) = mpsc::sync_channel(4);
        tx.send(failed(0, 1)).unwrap();
        tx.send(checked(1, None)).unwrap();
        let verdict = coordinate(2, &snapshots, rx).unwrap();
        assert!(matches!(verdict, Verdict::Safe(c) if c == InvariantCandidates::true_()));
    }

    #[test]
    fn test_slot() {
        let slot = Arc::new(Slot::new());
        assert_eq!(slot.publish(1), 1);
        assert_eq!(slot.publish(2), 2);
        // readers only see the latest value
        assert_eq!(slot.wait_newer(0), Some((2, 2)));
        assert!(!slot.offer(0, |&v| v < 0));
        assert!(slot.offer(3, |&v| v < 3));

        let reader = {
            let slot = slot.clone();
            thread::spawn(move || {
                let mut seen = 0;
                let mut values = vec![];
                while let Some((generation, v)) = slot.wait_newer(seen) {
                    seen = generation;
                    values.push(v);
                }
                values
            })
        };
        slot.close();
        let values = reader.join().unwrap();
        assert!(values.len() <= 1);
        assert_eq!(slot.wait_newer(0), None);
    }
}
