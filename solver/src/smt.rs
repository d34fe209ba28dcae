// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Sessions backed by an SMT-LIB2 solver process.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cfa::{
    semantics::{Valuation, Value},
    syntax::{BinOp, NOp, NumOp, NumRel, Sort, Term, UOp},
};
use smtlib::{
    conf::SolverCmd,
    proc::{SatResp, SmtPid, SmtProc, SolverError},
    sexp::{app, atom_s, int, Sexp},
};

use crate::basics::{sort_of, BasicCanceler, SessionError, Signature, SolverSession};

/// Translate a term to SMT-LIB.
pub fn term_to_sexp(t: &Term) -> Sexp {
    let go = |t: &Term| term_to_sexp(t);
    match t {
        Term::Literal(b) => atom_s(if *b { "true" } else { "false" }),
        Term::Int(i) => int(*i),
        Term::Id(name) => atom_s(name),
        Term::UnaryOp(UOp::Not, t) => app("not", [go(t)]),
        Term::UnaryOp(UOp::Neg, t) => app("-", [go(t)]),
        Term::BinOp(op, lhs, rhs) => {
            let args = [go(lhs), go(rhs)];
            match op {
                BinOp::Equals | BinOp::Iff => app("=", args),
                BinOp::NotEquals => app("distinct", args),
                BinOp::Implies => app("=>", args),
            }
        }
        Term::NumOp(op, lhs, rhs) => {
            let head = match op {
                NumOp::Add => "+",
                NumOp::Sub => "-",
                NumOp::Mul => "*",
            };
            app(head, [go(lhs), go(rhs)])
        }
        Term::NumRel(rel, lhs, rhs) => {
            let head = match rel {
                NumRel::Lt => "<",
                NumRel::Leq => "<=",
                NumRel::Geq => ">=",
                NumRel::Gt => ">",
            };
            app(head, [go(lhs), go(rhs)])
        }
        // `and`/`or` with fewer than two arguments are rejected by some solvers
        Term::NAryOp(NOp::And, ts) if ts.is_empty() => atom_s("true"),
        Term::NAryOp(NOp::Or, ts) if ts.is_empty() => atom_s("false"),
        Term::NAryOp(_, ts) if ts.len() == 1 => go(&ts[0]),
        Term::NAryOp(op, ts) => {
            let head = match op {
                NOp::And => "and",
                NOp::Or => "or",
            };
            app(head, ts.iter().map(go))
        }
        Term::Ite { cond, then, else_ } => app("ite", [go(cond), go(then), go(else_)]),
    }
}

/// Cancels an SMT session by killing its process.
struct SmtCanceler {
    pid: SmtPid,
    canceled: Arc<AtomicBool>,
}

impl BasicCanceler for SmtCanceler {
    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.pid.kill();
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// A session talking to a solver process.
pub struct SmtSession {
    proc: SmtProc,
    sig: Signature,
    // declarations are global, so they survive pops
    declared: HashSet<String>,
    depth: usize,
    canceled: Arc<AtomicBool>,
}

impl SmtSession {
    /// Launch the solver. `cmd` must enable `:global-declarations`.
    pub fn new(cmd: SolverCmd, sig: &Signature, tee: Option<&Path>) -> Result<Self, SessionError> {
        log::debug!("launching {}", cmd.cmdline());
        Ok(Self {
            proc: SmtProc::new(cmd, tee)?,
            sig: sig.clone(),
            declared: HashSet::new(),
            depth: 0,
            canceled: Arc::new(AtomicBool::new(false)),
        })
    }

    fn declare_var(&mut self, name: &str) -> Result<(), SessionError> {
        if self.declared.contains(name) {
            return Ok(());
        }
        let sort = sort_of(&self.sig, name)?;
        self.proc.declare_const(name, &sort.to_string())?;
        self.declared.insert(name.to_string());
        Ok(())
    }

    /// Save the commands sent so far, when teeing.
    pub fn save_tee(&self) {
        if let Some(name) = self.proc.save_tee() {
            log::info!("saved query to {}", name.display());
        }
    }
}

impl SolverSession for SmtSession {
    fn push(&mut self) -> Result<(), SessionError> {
        self.proc.push()?;
        self.depth += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SessionError> {
        if self.depth == 0 {
            return Err(SessionError::PopEmpty);
        }
        self.depth -= 1;
        Ok(self.proc.pop()?)
    }

    fn declare(&mut self, vars: &[String]) -> Result<(), SessionError> {
        for v in vars {
            self.declare_var(v)?;
        }
        Ok(())
    }

    fn assert(&mut self, term: &Term) -> Result<(), SessionError> {
        for v in term.vars() {
            self.declare_var(&v)?;
        }
        Ok(self.proc.assert(term_to_sexp(term))?)
    }

    fn check_sat(&mut self) -> Result<SatResp, SessionError> {
        let start = Instant::now();
        let resp = self.proc.check_sat();
        log::debug!(
            "            check-sat returned {resp:?} after {}ms",
            start.elapsed().as_millis()
        );
        match resp {
            Err(SolverError::Killed) if self.canceled.load(Ordering::SeqCst) => {
                Err(SessionError::Canceled)
            }
            resp => Ok(resp?),
        }
    }

    fn get_model(&mut self, vars: &[String]) -> Result<Valuation, SessionError> {
        // a declaration here would leave sat mode and invalidate get-value
        if let Some(v) = vars.iter().find(|v| !self.declared.contains(*v)) {
            return Err(SessionError::Undeclared(v.clone()));
        }
        let values = self.proc.get_value(vars)?;
        let malformed = |what: &Sexp| SolverError::Parse {
            resp: what.to_string(),
            msg: "expected (name value)".to_string(),
        };
        let mut model = Valuation::new();
        for pair in values.list().unwrap_or_default() {
            let Some([name, value]) = pair.list() else {
                return Err(malformed(pair).into());
            };
            let Some(name) = name.atom_s() else {
                return Err(malformed(pair).into());
            };
            let value = match sort_of(&self.sig, name)? {
                Sort::Bool => value.bool_value().map(Value::Bool),
                Sort::Int => value.int_value().map(Value::Int),
            };
            let Some(value) = value else {
                return Err(malformed(pair).into());
            };
            model.insert(name.to_string(), value);
        }
        Ok(model)
    }

    fn canceler(&self) -> Box<dyn BasicCanceler> {
        Box::new(SmtCanceler {
            pid: self.proc.pid(),
            canceled: self.canceled.clone(),
        })
    }
}
