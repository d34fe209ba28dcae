// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Terms and statements labelling the edges of a control-flow automaton.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// The sort of a program variable.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sort {
    /// Booleans
    Bool,
    /// Mathematical integers
    Int,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
        }
    }
}

/// Unary operators
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UOp {
    /// Boolean negation
    Not,
    /// Integer negation
    Neg,
}

/// Binary logical operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinOp {
    Equals,
    NotEquals,
    Implies,
    Iff,
}

/// Integer arithmetic
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NumOp {
    Add,
    Sub,
    Mul,
}

/// Integer comparisons
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NumRel {
    Lt,
    Leq,
    Geq,
    Gt,
}

impl NumRel {
    /// The relation holding exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            NumRel::Lt => NumRel::Geq,
            NumRel::Leq => NumRel::Gt,
            NumRel::Geq => NumRel::Lt,
            NumRel::Gt => NumRel::Leq,
        }
    }
}

/// N-ary logical operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NOp {
    And,
    Or,
}

/// A quantifier-free term over Boolean and integer variables.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// A constant true or false
    Literal(bool),
    /// An integer constant
    Int(i64),
    /// A variable
    Id(String),
    /// An applied unary operation
    UnaryOp(UOp, Box<Term>),
    /// An applied binary logical operation
    BinOp(BinOp, Box<Term>, Box<Term>),
    /// Integer arithmetic
    NumOp(NumOp, Box<Term>, Box<Term>),
    /// Integer comparison
    NumRel(NumRel, Box<Term>, Box<Term>),
    /// An applied n-ary operation
    NAryOp(NOp, Vec<Term>),
    /// If-then-else
    Ite {
        /// A boolean conditional
        cond: Box<Term>,
        /// Value when `cond` is true
        then: Box<Term>,
        /// Value when `cond` is false
        else_: Box<Term>,
    },
}

impl From<&Term> for Term {
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Self::Literal(value)
    }
}

/// Smart constructors. These clone arguments passed by reference.
impl Term {
    /// Literal(true)
    pub fn true_() -> Self {
        Self::Literal(true)
    }

    /// Literal(false)
    pub fn false_() -> Self {
        Self::Literal(false)
    }

    /// A variable
    pub fn id(name: &str) -> Self {
        Self::Id(name.to_string())
    }

    /// An integer constant
    pub fn int(i: i64) -> Self {
        Self::Int(i)
    }

    /// Negation. Cancels double negation, flips equalities and comparisons
    /// and evaluates literals.
    pub fn not<T>(t: T) -> Self
    where
        T: Into<Term>,
    {
        match t.into() {
            Self::Literal(b) => Self::Literal(!b),
            Self::UnaryOp(UOp::Not, body) => *body,
            Self::BinOp(BinOp::Equals, lhs, rhs) => Self::BinOp(BinOp::NotEquals, lhs, rhs),
            Self::BinOp(BinOp::NotEquals, lhs, rhs) => Self::BinOp(BinOp::Equals, lhs, rhs),
            Self::NumRel(rel, lhs, rhs) => Self::NumRel(rel.negate(), lhs, rhs),
            t => Self::UnaryOp(UOp::Not, Box::new(t)),
        }
    }

    /// Integer negation
    pub fn neg<T>(t: T) -> Self
    where
        T: Into<Term>,
    {
        match t.into() {
            Self::Int(i) => Self::Int(-i),
            t => Self::UnaryOp(UOp::Neg, Box::new(t)),
        }
    }

    /// `lhs = rhs`
    pub fn equals<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::BinOp(BinOp::Equals, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `lhs != rhs`
    pub fn not_equals<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::BinOp(BinOp::NotEquals, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `lhs -> rhs`
    pub fn implies<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::BinOp(BinOp::Implies, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `lhs <-> rhs`
    pub fn iff<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::BinOp(BinOp::Iff, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    fn num_op<T1, T2>(op: NumOp, lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::NumOp(op, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `lhs + rhs`
    pub fn add<T1: Into<Term>, T2: Into<Term>>(lhs: T1, rhs: T2) -> Self {
        Self::num_op(NumOp::Add, lhs, rhs)
    }

    /// `lhs - rhs`
    pub fn sub<T1: Into<Term>, T2: Into<Term>>(lhs: T1, rhs: T2) -> Self {
        Self::num_op(NumOp::Sub, lhs, rhs)
    }

    /// `lhs * rhs`
    pub fn mul<T1: Into<Term>, T2: Into<Term>>(lhs: T1, rhs: T2) -> Self {
        Self::num_op(NumOp::Mul, lhs, rhs)
    }

    /// A comparison `lhs rel rhs`
    pub fn num_rel<T1, T2>(rel: NumRel, lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::NumRel(rel, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `lhs <= rhs`
    pub fn leq<T1: Into<Term>, T2: Into<Term>>(lhs: T1, rhs: T2) -> Self {
        Self::num_rel(NumRel::Leq, lhs, rhs)
    }

    /// `lhs < rhs`
    pub fn lt<T1: Into<Term>, T2: Into<Term>>(lhs: T1, rhs: T2) -> Self {
        Self::num_rel(NumRel::Lt, lhs, rhs)
    }

    fn flatten(ts: Vec<Term>, op: NOp) -> Vec<Term> {
        ts.into_iter()
            .flat_map(|t| match t {
                Self::NAryOp(op2, ts2) if op == op2 => ts2,
                _ => vec![t],
            })
            .collect()
    }

    /// Conjunction. Drops `true` conjuncts, collapses to `false` if any
    /// conjunct is `false`, and flattens nested conjunctions one level.
    pub fn and<I>(ts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let ts = ts
            .into_iter()
            .map(|t| t.into())
            .filter(|t| *t != Self::true_())
            .collect_vec();
        if ts.contains(&Self::false_()) {
            return Self::false_();
        }
        let mut ts = Self::flatten(ts, NOp::And);
        match ts.len() {
            0 => Self::true_(),
            1 => ts.remove(0),
            _ => Self::NAryOp(NOp::And, ts),
        }
    }

    /// Disjunction, dual to [`Term::and`].
    pub fn or<I>(ts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let ts = ts
            .into_iter()
            .map(|t| t.into())
            .filter(|t| *t != Self::false_())
            .collect_vec();
        if ts.contains(&Self::true_()) {
            return Self::true_();
        }
        let mut ts = Self::flatten(ts, NOp::Or);
        match ts.len() {
            0 => Self::false_(),
            1 => ts.remove(0),
            _ => Self::NAryOp(NOp::Or, ts),
        }
    }

    /// If-then-else
    pub fn ite<T1, T2, T3>(cond: T1, then: T2, else_: T3) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
        T3: Into<Term>,
    {
        Self::Ite {
            cond: Box::new(cond.into()),
            then: Box::new(then.into()),
            else_: Box::new(else_.into()),
        }
    }

    /// The free variables of the term, in sorted order.
    pub fn vars(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut BTreeSet<String>) {
        match self {
            Term::Literal(_) | Term::Int(_) => {}
            Term::Id(name) => {
                vars.insert(name.clone());
            }
            Term::UnaryOp(_, t) => t.collect_vars(vars),
            Term::BinOp(_, lhs, rhs) | Term::NumOp(_, lhs, rhs) | Term::NumRel(_, lhs, rhs) => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
            Term::NAryOp(_, ts) => ts.iter().for_each(|t| t.collect_vars(vars)),
            Term::Ite { cond, then, else_ } => {
                cond.collect_vars(vars);
                then.collect_vars(vars);
                else_.collect_vars(vars);
            }
        }
    }

    /// Rename every variable with `f`, leaving the structure untouched.
    pub fn rename<F>(&self, f: &F) -> Term
    where
        F: Fn(&str) -> String,
    {
        let go = |t: &Term| Box::new(t.rename(f));
        match self {
            Term::Literal(_) | Term::Int(_) => self.clone(),
            Term::Id(name) => Term::Id(f(name)),
            Term::UnaryOp(op, t) => Term::UnaryOp(*op, go(t)),
            Term::BinOp(op, lhs, rhs) => Term::BinOp(*op, go(lhs), go(rhs)),
            Term::NumOp(op, lhs, rhs) => Term::NumOp(*op, go(lhs), go(rhs)),
            Term::NumRel(rel, lhs, rhs) => Term::NumRel(*rel, go(lhs), go(rhs)),
            Term::NAryOp(op, ts) => Term::NAryOp(*op, ts.iter().map(|t| t.rename(f)).collect()),
            Term::Ite { cond, then, else_ } => Term::Ite {
                cond: go(cond),
                then: go(then),
                else_: go(else_),
            },
        }
    }

    /// The top-level conjuncts of the term.
    pub fn conjuncts(&self) -> Vec<&Term> {
        match self {
            Term::NAryOp(NOp::And, ts) => ts.iter().flat_map(|t| t.conjuncts()).collect(),
            Term::Literal(true) => vec![],
            _ => vec![self],
        }
    }

    /// Whether the term is a comparison or (dis)equality between integer
    /// expressions, the shape of atoms a learner can split on.
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Term::NumRel(..) | Term::BinOp(BinOp::Equals | BinOp::NotEquals, ..)
        )
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Literal(b) => write!(f, "{b}"),
            Term::Int(i) => write!(f, "{i}"),
            Term::Id(name) => write!(f, "{name}"),
            Term::UnaryOp(UOp::Not, t) => write!(f, "!{t}"),
            Term::UnaryOp(UOp::Neg, t) => write!(f, "-{t}"),
            Term::BinOp(op, lhs, rhs) => {
                let op = match op {
                    BinOp::Equals => "=",
                    BinOp::NotEquals => "!=",
                    BinOp::Implies => "->",
                    BinOp::Iff => "<->",
                };
                write!(f, "({lhs} {op} {rhs})")
            }
            Term::NumOp(op, lhs, rhs) => {
                let op = match op {
                    NumOp::Add => "+",
                    NumOp::Sub => "-",
                    NumOp::Mul => "*",
                };
                write!(f, "({lhs} {op} {rhs})")
            }
            Term::NumRel(rel, lhs, rhs) => {
                let rel = match rel {
                    NumRel::Lt => "<",
                    NumRel::Leq => "<=",
                    NumRel::Geq => ">=",
                    NumRel::Gt => ">",
                };
                write!(f, "({lhs} {rel} {rhs})")
            }
            Term::NAryOp(op, ts) => {
                let sep = match op {
                    NOp::And => " & ",
                    NOp::Or => " | ",
                };
                write!(f, "({})", ts.iter().join(sep))
            }
            Term::Ite { cond, then, else_ } => write!(f, "(if {cond} then {then} else {else_})"),
        }
    }
}

/// A statement on a CFA edge.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize)]
pub enum Stmt {
    /// `var := term`
    Assign(String, Term),
    /// Block unless the condition holds.
    Assume(Term),
    /// Give a variable an arbitrary value.
    Havoc(String),
}

impl Stmt {
    /// `var := term`
    pub fn assign<T: Into<Term>>(var: &str, term: T) -> Self {
        Stmt::Assign(var.to_string(), term.into())
    }

    /// `assume cond`
    pub fn assume<T: Into<Term>>(cond: T) -> Self {
        Stmt::Assume(cond.into())
    }

    /// `havoc var`
    pub fn havoc(var: &str) -> Self {
        Stmt::Havoc(var.to_string())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign(v, t) => write!(f, "{v} := {t}"),
            Stmt::Assume(t) => write!(f, "assume {t}"),
            Stmt::Havoc(v) => write!(f, "havoc {v}"),
        }
    }
}
