// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A self-contained session that searches for models with integers in a
//! bounded box.
//!
//! Integer variables range over `[-radius, radius]`, except that a variable
//! defined by an asserted equality `v = e` takes the value of `e` once `e` is
//! known. `Unsat` therefore means "no model in the box". The search
//! backtracks over variables in SSA order and prunes with three-valued
//! evaluation of the asserted conjuncts.

use std::collections::BTreeSet;
use std::time::Instant;

use cfa::{
    semantics::{eval, eval_bool, Valuation, Value},
    ssa::unversioned,
    syntax::{BinOp, Sort, Term},
};
use smtlib::proc::SatResp;

use crate::basics::{sort_of, BasicCanceler, FlagCanceler, SessionError, Signature, SolverSession};

/// A bounded enumerative session.
pub struct BoundedSession {
    sig: Signature,
    radius: i64,
    frames: Vec<Vec<Term>>,
    model: Option<Valuation>,
    canceler: FlagCanceler,
}

impl BoundedSession {
    /// A session over variables of `sig` with integers bounded by `radius`.
    pub fn new(sig: &Signature, radius: i64) -> Self {
        Self {
            sig: sig.clone(),
            radius: radius.abs(),
            frames: vec![vec![]],
            model: None,
            canceler: FlagCanceler::new(),
        }
    }

    /// Extend `val` with values for `vars[i..]` satisfying every conjunct.
    fn search(
        &self,
        i: usize,
        vars: &[String],
        conjuncts: &[Term],
        val: &mut Valuation,
        steps: &mut usize,
    ) -> Result<bool, SessionError> {
        if conjuncts.iter().any(|c| eval_bool(c, val) == Some(false)) {
            return Ok(false);
        }
        if i == vars.len() {
            return Ok(conjuncts.iter().all(|c| eval_bool(c, val) == Some(true)));
        }
        *steps += 1;
        if self.canceler.is_canceled() {
            return Err(SessionError::Canceled);
        }
        let var = &vars[i];
        let values = match defined_value(var, conjuncts, val) {
            Some(v) => vec![v],
            None => self.domain(sort_of(&self.sig, var)?),
        };
        for v in values {
            val.insert(var.clone(), v);
            if self.search(i + 1, vars, conjuncts, val, steps)? {
                return Ok(true);
            }
        }
        val.remove(var);
        Ok(false)
    }

    fn domain(&self, sort: Sort) -> Vec<Value> {
        match sort {
            Sort::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Sort::Int => {
                let mut vals = vec![Value::Int(0)];
                for i in 1..=self.radius {
                    vals.push(Value::Int(i));
                    vals.push(Value::Int(-i));
                }
                vals
            }
        }
    }
}

/// The value forced on `var` by a conjunct `var = e` with `e` already known.
fn defined_value(var: &str, conjuncts: &[Term], val: &Valuation) -> Option<Value> {
    conjuncts.iter().find_map(|c| match c {
        Term::BinOp(BinOp::Equals | BinOp::Iff, lhs, rhs) => match (lhs.as_ref(), rhs.as_ref()) {
            (Term::Id(v), e) | (e, Term::Id(v)) if v == var && !e.vars().contains(var) => {
                eval(e, val)
            }
            _ => None,
        },
        _ => None,
    })
}

fn var_order(name: &str) -> (usize, String) {
    match unversioned(name) {
        Some((base, k)) => (k, base.to_string()),
        None => (0, name.to_string()),
    }
}

impl SolverSession for BoundedSession {
    fn push(&mut self) -> Result<(), SessionError> {
        self.frames.push(vec![]);
        self.model = None;
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SessionError> {
        if self.frames.len() <= 1 {
            return Err(SessionError::PopEmpty);
        }
        self.frames.pop();
        self.model = None;
        Ok(())
    }

    fn declare(&mut self, vars: &[String]) -> Result<(), SessionError> {
        for v in vars {
            sort_of(&self.sig, v)?;
        }
        Ok(())
    }

    fn assert(&mut self, term: &Term) -> Result<(), SessionError> {
        for v in term.vars() {
            sort_of(&self.sig, &v)?;
        }
        self.model = None;
        if let Some(frame) = self.frames.last_mut() {
            frame.extend(term.conjuncts().into_iter().cloned());
        }
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResp, SessionError> {
        let start = Instant::now();
        let conjuncts: Vec<Term> = self.frames.iter().flatten().cloned().collect();
        let mut vars: Vec<String> = conjuncts
            .iter()
            .flat_map(|c| c.vars())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        vars.sort_by_key(|v| var_order(v));

        let mut val = Valuation::new();
        let mut steps = 0;
        let found = self.search(0, &vars, &conjuncts, &mut val, &mut steps)?;
        log::debug!(
            "            bounded check-sat on {} vars returned {} after {steps} steps, {}ms",
            vars.len(),
            if found { "sat" } else { "unsat" },
            start.elapsed().as_millis()
        );
        if found {
            self.model = Some(val);
            Ok(SatResp::Sat)
        } else {
            Ok(SatResp::Unsat)
        }
    }

    fn get_model(&mut self, vars: &[String]) -> Result<Valuation, SessionError> {
        let model = self.model.as_ref().ok_or(SessionError::NoModel)?;
        let mut out = Valuation::new();
        for v in vars {
            let value = match model.get(v) {
                Some(value) => *value,
                None => Value::default_of(sort_of(&self.sig, v)?),
            };
            out.insert(v.clone(), value);
        }
        Ok(out)
    }

    fn canceler(&self) -> Box<dyn BasicCanceler> {
        Box::new(self.canceler.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::BoundedSession;
    use crate::basics::{check_with_model, scoped, Signature, SolverSession};
    use cfa::{
        semantics::Value,
        syntax::{Sort, Term},
    };
    use smtlib::proc::SatResp;

    fn sig() -> Signature {
        Signature::from([("x".to_string(), Sort::Int), ("b".to_string(), Sort::Bool)])
    }

    fn x(k: usize) -> Term {
        Term::Id(format!("x@{k}"))
    }

    #[test_log::test]
    fn test_sat_with_definitions() {
        let mut s = BoundedSession::new(&sig(), 2);
        // x@1 is outside the box but defined from x@0
        let t = Term::and([
            Term::equals(x(1), Term::add(x(0), Term::int(5))),
            Term::lt(Term::int(1), x(0)),
        ]);
        let vars = ["x@0".to_string(), "x@1".to_string(), "b@0".to_string()];
        let model = check_with_model(&mut s, &t, &vars).unwrap().unwrap();
        assert_eq!(model["x@0"], Value::Int(2));
        assert_eq!(model["x@1"], Value::Int(7));
        assert_eq!(model["b@0"], Value::Bool(false));
    }

    #[test_log::test]
    fn test_unsat_and_scopes() {
        let mut s = BoundedSession::new(&sig(), 3);
        s.assert(&Term::equals(x(1), Term::int(0))).unwrap();
        let r = scoped(&mut s, |s| {
            s.assert(&Term::not_equals(x(1), Term::int(0)))?;
            s.check_sat()
        })
        .unwrap();
        assert_eq!(r, SatResp::Unsat);
        assert_eq!(s.check_sat().unwrap(), SatResp::Sat);
        assert!(s.pop().is_err());
    }

    #[test]
    fn test_bool_and_box() {
        let mut s = BoundedSession::new(&sig(), 1);
        let t = Term::and([Term::id("b@0"), Term::lt(Term::int(1), x(0))]);
        assert_eq!(check_with_model(&mut s, &t, &[]).unwrap(), None);
        let t = Term::and([Term::id("b@0"), Term::lt(Term::int(0), x(0))]);
        let m = check_with_model(&mut s, &t, &["b@0".to_string(), "x@0".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(m["b@0"], Value::Bool(true));
        assert_eq!(m["x@0"], Value::Int(1));
    }
}
