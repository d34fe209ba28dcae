// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Static single assignment unrolling of statement sequences.
//!
//! Every program variable `x` is split into versions `x@0`, `x@1`, ...; an
//! [`Indexing`] records the current version of each variable. Indexings are
//! plain values passed around explicitly, so unrolling has no hidden state.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::syntax::{Stmt, Term};

/// The name of version `k` of variable `name`.
pub fn versioned(name: &str, k: usize) -> String {
    format!("{name}@{k}")
}

/// Split a versioned name back into the variable and its version.
pub fn unversioned(name: &str) -> Option<(&str, usize)> {
    let (base, k) = name.rsplit_once('@')?;
    Some((base, k.parse().ok()?))
}

/// The current SSA version of each variable. Missing variables are at
/// version 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Indexing(BTreeMap<String, usize>);

impl Indexing {
    /// Every variable at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The version of `var`.
    pub fn get(&self, var: &str) -> usize {
        self.0.get(var).copied().unwrap_or(0)
    }

    /// Move `var` to a fresh version and return it.
    pub fn bump(&mut self, var: &str) -> usize {
        let k = self.0.entry(var.to_string()).or_insert(0);
        *k += 1;
        *k
    }

    /// The versioned name of `var` under this indexing.
    pub fn name(&self, var: &str) -> String {
        versioned(var, self.get(var))
    }

    /// Rename every variable of a term over program variables to its current
    /// version.
    pub fn instantiate(&self, term: &Term) -> Term {
        term.rename(&|v| self.name(v))
    }

    /// Variables whose version is not 0.
    pub fn changed(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0
            .iter()
            .filter(|(_, k)| **k > 0)
            .map(|(v, k)| (v.as_str(), *k))
    }
}

/// Unroll a statement sequence starting from `start`, returning the
/// conjunction of the statements' effects over versioned variables and the
/// indexing after the last statement.
pub fn unroll<'a, I>(stmts: I, start: &Indexing) -> (Term, Indexing)
where
    I: IntoIterator<Item = &'a Stmt>,
{
    let mut idx = start.clone();
    let mut conjuncts = vec![];
    for stmt in stmts {
        match stmt {
            Stmt::Assign(var, rhs) => {
                let rhs = idx.instantiate(rhs);
                let k = idx.bump(var);
                conjuncts.push(Term::equals(Term::Id(versioned(var, k)), rhs));
            }
            Stmt::Assume(cond) => conjuncts.push(idx.instantiate(cond)),
            Stmt::Havoc(var) => {
                idx.bump(var);
            }
        }
    }
    (Term::and(conjuncts), idx)
}

#[cfg(test)]
mod tests {
    use super::{unroll, unversioned, Indexing};
    use crate::syntax::{Stmt, Term};

    #[test]
    fn test_unroll() {
        let x = || Term::id("x");
        let stmts = [
            Stmt::assign("x", Term::int(0)),
            Stmt::havoc("y"),
            Stmt::assign("x", Term::add(x(), Term::id("y"))),
            Stmt::assume(Term::not_equals(x(), Term::int(0))),
        ];
        let (body, idx) = unroll(&stmts, &Indexing::new());
        insta::assert_snapshot!(body, @"((x@1 = 0) & (x@2 = (x@1 + y@1)) & (x@2 != 0))");
        assert_eq!(idx.get("x"), 2);
        assert_eq!(idx.get("y"), 1);
        assert_eq!(idx.get("z"), 0);
        assert_eq!(
            idx.changed().collect::<Vec<_>>(),
            vec![("x", 2), ("y", 1)]
        );
    }

    #[test]
    fn test_empty_unroll() {
        let none: [Stmt; 0] = [];
        let (body, idx) = unroll(&none, &Indexing::new());
        assert_eq!(body, Term::true_());
        assert_eq!(idx, Indexing::new());
        assert_eq!(unversioned("x@12"), Some(("x", 12)));
        assert_eq!(unversioned("x"), None);
    }
}
