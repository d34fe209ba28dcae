// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The incremental solver interface used by the teacher, and cancellation of
//! in-flight queries.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use cfa::{
    semantics::Valuation,
    ssa::unversioned,
    syntax::{Sort, Term},
};
use smtlib::proc::{SatResp, SolverError};
use thiserror::Error;

/// The sorts of program variables. Versioned names `x@k` take the sort of
/// `x`.
pub type Signature = BTreeMap<String, Sort>;

/// Look up the sort of a (possibly versioned) variable.
pub fn sort_of(sig: &Signature, name: &str) -> Result<Sort, SessionError> {
    let base = unversioned(name).map_or(name, |(base, _)| base);
    sig.get(base)
        .copied()
        .ok_or_else(|| SessionError::UnknownSort(name.to_string()))
}

/// An error from a solver session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The underlying solver process failed
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The solver could not decide a query
    #[error("solver returned unknown: {0}")]
    Unknown(String),
    /// A variable has no declared sort
    #[error("no sort for variable {0}")]
    UnknownSort(String),
    /// `pop` without a matching `push`
    #[error("pop without a matching push")]
    PopEmpty,
    /// A model was requested without a preceding sat answer
    #[error("no model available")]
    NoModel,
    /// A model value was requested for a variable never declared to the
    /// solver
    #[error("model requested for undeclared variable {0}")]
    Undeclared(String),
    /// The session was canceled
    #[error("solver session was canceled")]
    Canceled,
}

impl SessionError {
    /// Whether the error is the result of a cancellation rather than a
    /// failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            SessionError::Canceled | SessionError::Solver(SolverError::Killed)
        )
    }
}

/// An incremental solver: assertions live in a stack of scopes.
///
/// Sessions are owned by one worker at a time and moved between threads,
/// never shared.
pub trait SolverSession: Send {
    /// Open a scope.
    fn push(&mut self) -> Result<(), SessionError>;

    /// Close the innermost scope, discarding its assertions.
    fn pop(&mut self) -> Result<(), SessionError>;

    /// Declare versioned variables ahead of a check, so their values can
    /// be read from the model afterwards. Declaring twice is harmless.
    fn declare(&mut self, vars: &[String]) -> Result<(), SessionError>;

    /// Assert a Boolean term over versioned variables.
    fn assert(&mut self, term: &Term) -> Result<(), SessionError>;

    /// Check the current assertions.
    fn check_sat(&mut self) -> Result<SatResp, SessionError>;

    /// The values of `vars` in the model found by the last sat check.
    /// Every requested variable gets a value. Variables that do not occur
    /// in an assertion must have been declared before the check.
    fn get_model(&mut self, vars: &[String]) -> Result<Valuation, SessionError>;

    /// A handle that cancels this session's in-flight and future checks.
    fn canceler(&self) -> Box<dyn BasicCanceler>;
}

/// Run `f` inside a fresh scope. The scope is popped whether or not `f`
/// succeeds; an error from `f` takes precedence over one from the pop.
pub fn scoped<S, T, F>(session: &mut S, f: F) -> Result<T, SessionError>
where
    S: SolverSession + ?Sized,
    F: FnOnce(&mut S) -> Result<T, SessionError>,
{
    session.push()?;
    let result = f(session);
    let popped = session.pop();
    let v = result?;
    popped?;
    Ok(v)
}

/// Check whether `term` is satisfiable on top of the session's current
/// assertions, returning a model over `vars` if so.
pub fn check_with_model<S>(
    session: &mut S,
    term: &Term,
    vars: &[String],
) -> Result<Option<Valuation>, SessionError>
where
    S: SolverSession + ?Sized,
{
    scoped(session, |s| {
        // nothing may be declared between check-sat and get-value
        s.declare(vars)?;
        s.assert(term)?;
        match s.check_sat()? {
            SatResp::Sat => Ok(Some(s.get_model(vars)?)),
            SatResp::Unsat => Ok(None),
            SatResp::Unknown(reason) => Err(SessionError::Unknown(reason)),
        }
    })
}

/// A basic canceler object, able to cancel queries at any time
pub trait BasicCanceler: Sync + Send {
    /// Cancel the query associated with this canceler.
    fn cancel(&self);

    /// Check whether the canceler has been canceled.
    fn is_canceled(&self) -> bool;
}

/// A canceler backed by a shared flag, polled by the session.
#[derive(Debug, Clone, Default)]
pub struct FlagCanceler(Arc<AtomicBool>);

impl FlagCanceler {
    /// A fresh, uncanceled flag.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BasicCanceler for FlagCanceler {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A set of cancelers canceled together. Cancelers added after the set was
/// canceled are canceled immediately.
///
/// A [`MultiCanceler`] is itself a [`BasicCanceler`], so sets can be nested.
#[derive(Clone, Default)]
pub struct MultiCanceler(Arc<RwLock<(bool, Vec<Box<dyn BasicCanceler>>)>>);

impl MultiCanceler {
    /// Create a new empty set of cancelers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a canceler. Returns `false` (after canceling it) if the set has
    /// already been canceled.
    pub fn add_canceler(&self, canceler: Box<dyn BasicCanceler>) -> bool {
        let mut cancelers = self.0.write().unwrap();
        if cancelers.0 {
            canceler.cancel();
            false
        } else {
            cancelers.1.push(canceler);
            true
        }
    }
}

impl BasicCanceler for MultiCanceler {
    fn cancel(&self) {
        let mut cancelers = self.0.write().unwrap();
        cancelers.0 = true;
        for canceler in cancelers.1.drain(..) {
            canceler.cancel();
        }
    }

    fn is_canceled(&self) -> bool {
        self.0.read().unwrap().0
    }
}

#[cfg(test)]
mod tests {
    use super::{
        check_with_model, sort_of, BasicCanceler, FlagCanceler, MultiCanceler, SessionError,
        Signature, SolverSession,
    };
    use cfa::{
        semantics::{Valuation, Value},
        syntax::{Sort, Term},
    };
    use smtlib::proc::SatResp;

    /// Records the commands a session receives, like a solver that only
    /// answers for declared constants.
    #[derive(Default)]
    struct Recording {
        commands: Vec<String>,
        declared: Vec<String>,
    }

    impl SolverSession for Recording {
        fn push(&mut self) -> Result<(), SessionError> {
            self.commands.push("push".to_string());
            Ok(())
        }

        fn pop(&mut self) -> Result<(), SessionError> {
            self.commands.push("pop".to_string());
            Ok(())
        }

        fn declare(&mut self, vars: &[String]) -> Result<(), SessionError> {
            for v in vars {
                if !self.declared.contains(v) {
                    self.commands.push(format!("declare {v}"));
                    self.declared.push(v.clone());
                }
            }
            Ok(())
        }

        fn assert(&mut self, term: &Term) -> Result<(), SessionError> {
            let vars: Vec<String> = term.vars().into_iter().collect();
            self.declare(&vars)?;
            self.commands.push(format!("assert {term}"));
            Ok(())
        }

        fn check_sat(&mut self) -> Result<SatResp, SessionError> {
            self.commands.push("check-sat".to_string());
            Ok(SatResp::Sat)
        }

        fn get_model(&mut self, vars: &[String]) -> Result<Valuation, SessionError> {
            self.commands.push("get-value".to_string());
            vars.iter()
                .map(|v| {
                    if self.declared.contains(v) {
                        Ok((v.clone(), Value::Int(0)))
                    } else {
                        Err(SessionError::Undeclared(v.clone()))
                    }
                })
                .collect()
        }

        fn canceler(&self) -> Box<dyn BasicCanceler> {
            Box::new(FlagCanceler::new())
        }
    }

    #[test]
    fn test_model_variables_declared_before_check() {
        let mut session = Recording::default();
        let term = Term::not_equals(Term::id("x@0"), Term::int(0));
        let vars = ["x@0".to_string(), "y@0".to_string()];
        let model = check_with_model(&mut session, &term, &vars).unwrap().unwrap();
        assert_eq!(model.len(), 2);
        // y@0 does not occur in the term but is declared before check-sat
        assert_eq!(
            session.commands,
            vec![
                "push",
                "declare x@0",
                "declare y@0",
                "assert (x@0 != 0)",
                "check-sat",
                "get-value",
                "pop"
            ]
        );
    }

    #[test]
    fn test_multi_canceler() {
        let all = MultiCanceler::new();
        let a = FlagCanceler::new();
        assert!(all.add_canceler(Box::new(a.clone())));
        all.cancel();
        assert!(a.is_canceled());
        assert!(all.is_canceled());
        let late = FlagCanceler::new();
        assert!(!all.add_canceler(Box::new(late.clone())));
        assert!(late.is_canceled());
    }

    #[test]
    fn test_sort_of() {
        let sig = Signature::from([("x".to_string(), Sort::Int), ("b".to_string(), Sort::Bool)]);
        assert_eq!(sort_of(&sig, "x@3").unwrap(), Sort::Int);
        assert_eq!(sort_of(&sig, "b").unwrap(), Sort::Bool);
        assert!(matches!(
            sort_of(&sig, "y@0"),
            Err(SessionError::UnknownSort(_))
        ));
    }
}
