// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Values, partial valuations and three-valued evaluation of terms.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use crate::syntax::{BinOp, NOp, NumOp, NumRel, Sort, Term, UOp};

/// A concrete value of a program variable.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// A Boolean value
    Bool(bool),
    /// An integer value
    Int(i64),
}

impl Value {
    /// The inner Boolean, if this is one.
    pub fn bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) => None,
        }
    }

    /// The inner integer, if this is one.
    pub fn int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(_) => None,
        }
    }

    /// The sort of the value.
    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Int(_) => Sort::Int,
        }
    }

    /// The default value of a sort, used to complete models.
    pub fn default_of(sort: Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
        }
    }

    /// The value as a constant term.
    pub fn to_term(&self) -> Term {
        match self {
            Value::Bool(b) => Term::Literal(*b),
            Value::Int(i) => Term::Int(*i),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

/// A partial assignment of values to variables. Variables not in the map are
/// unknown.
pub type Valuation = BTreeMap<String, Value>;

/// Evaluate a term under a partial valuation.
///
/// Returns `None` when the value depends on an unassigned variable, or when
/// the term is ill-sorted or overflows. Connectives short-circuit, so
/// `false & y` is `false` even if `y` is unknown.
pub fn eval(term: &Term, val: &Valuation) -> Option<Value> {
    match term {
        Term::Literal(b) => Some(Value::Bool(*b)),
        Term::Int(i) => Some(Value::Int(*i)),
        Term::Id(name) => val.get(name).copied(),
        Term::UnaryOp(UOp::Not, t) => eval_bool(t, val).map(|b| Value::Bool(!b)),
        Term::UnaryOp(UOp::Neg, t) => eval_int(t, val)?.checked_neg().map(Value::Int),
        Term::BinOp(op, lhs, rhs) => {
            let b = match op {
                BinOp::Equals => eval(lhs, val)? == eval(rhs, val)?,
                BinOp::NotEquals => eval(lhs, val)? != eval(rhs, val)?,
                BinOp::Iff => eval_bool(lhs, val)? == eval_bool(rhs, val)?,
                BinOp::Implies => match (eval_bool(lhs, val), eval_bool(rhs, val)) {
                    (Some(false), _) | (_, Some(true)) => true,
                    (Some(true), Some(false)) => false,
                    _ => return None,
                },
            };
            Some(Value::Bool(b))
        }
        Term::NumOp(op, lhs, rhs) => {
            let (l, r) = (eval_int(lhs, val)?, eval_int(rhs, val)?);
            let v = match op {
                NumOp::Add => l.checked_add(r),
                NumOp::Sub => l.checked_sub(r),
                NumOp::Mul => l.checked_mul(r),
            };
            v.map(Value::Int)
        }
        Term::NumRel(rel, lhs, rhs) => {
            let (l, r) = (eval_int(lhs, val)?, eval_int(rhs, val)?);
            let b = match rel {
                NumRel::Lt => l < r,
                NumRel::Leq => l <= r,
                NumRel::Geq => l >= r,
                NumRel::Gt => l > r,
            };
            Some(Value::Bool(b))
        }
        Term::NAryOp(op, ts) => {
            // the value that decides the connective on its own
            let absorbing = matches!(op, NOp::Or);
            let mut unknown = false;
            for t in ts {
                match eval_bool(t, val) {
                    Some(b) if b == absorbing => return Some(Value::Bool(absorbing)),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(Value::Bool(!absorbing))
            }
        }
        Term::Ite { cond, then, else_ } => match eval_bool(cond, val) {
            Some(true) => eval(then, val),
            Some(false) => eval(else_, val),
            None => {
                let (t, e) = (eval(then, val)?, eval(else_, val)?);
                if t == e {
                    Some(t)
                } else {
                    None
                }
            }
        },
    }
}

/// Evaluate a term expected to be Boolean.
pub fn eval_bool(term: &Term, val: &Valuation) -> Option<bool> {
    eval(term, val)?.bool()
}

/// Evaluate a term expected to be an integer.
pub fn eval_int(term: &Term, val: &Valuation) -> Option<i64> {
    eval(term, val)?.int()
}

/// Print a valuation as `{x = 1, b = true}`.
pub fn valuation_to_string(val: &Valuation) -> String {
    let entries: Vec<String> = val.iter().map(|(k, v)| format!("{k} = {v}")).collect();
    format!("{{{}}}", entries.join(", "))
}
