// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Horn clauses built from decomposed segments.

use std::fmt;

use cfa::{
    automaton::{Cfa, Loc},
    ssa::{unroll, Indexing},
    syntax::Term,
};
use petgraph::graph::EdgeIndex;

use crate::{
    candidates::{dnf_to_term, Dnf, InvariantCandidates},
    decompose::{Segment, StructuralEndpoint},
    StructureError,
};

/// The symbolic effect of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The unrolled statements, over versioned variables starting at version 0
    pub body: Term,
    /// The version of each variable after the body
    pub indexing: Indexing,
    /// The edges the body was unrolled from
    pub edges: Vec<EdgeIndex>,
}

impl Transition {
    fn unroll(cfa: &Cfa, edges: &[EdgeIndex]) -> Self {
        let stmts = edges.iter().flat_map(|&e| cfa.stmts(e));
        let (body, indexing) = unroll(stmts, &Indexing::new());
        Self {
            body,
            indexing,
            edges: edges.to_vec(),
        }
    }
}

/// A constrained Horn clause, classified by the endpoints it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chc {
    /// From the entry to a loop head: the invariant holds initially
    Fact {
        #[allow(missing_docs)]
        post: Loc,
        #[allow(missing_docs)]
        trans: Transition,
    },
    /// From a loop head to the error location: the invariant excludes errors
    Query {
        #[allow(missing_docs)]
        pre: Loc,
        #[allow(missing_docs)]
        trans: Transition,
    },
    /// Between two loop heads: the invariants are preserved
    Inductive {
        #[allow(missing_docs)]
        pre: Loc,
        #[allow(missing_docs)]
        post: Loc,
        #[allow(missing_docs)]
        trans: Transition,
    },
    /// From the entry straight to the error location
    Simple {
        #[allow(missing_docs)]
        trans: Transition,
    },
}

impl Chc {
    /// Build the clause for a segment.
    pub fn from_segment(cfa: &Cfa, seg: &Segment) -> Result<Self, StructureError> {
        use StructuralEndpoint::*;
        let trans = Transition::unroll(cfa, &seg.edges);
        match (seg.start, seg.end) {
            (Entry, LoopHead(post)) => Ok(Chc::Fact { post, trans }),
            (LoopHead(pre), ErrorExit) => Ok(Chc::Query { pre, trans }),
            (LoopHead(pre), LoopHead(post)) => Ok(Chc::Inductive { pre, post, trans }),
            (Entry, ErrorExit) => Ok(Chc::Simple { trans }),
            (start, end) => Err(StructureError::UnexpectedSegment {
                from: start.display(cfa).to_string(),
                to: end.display(cfa).to_string(),
            }),
        }
    }

    /// The endpoint the clause starts from.
    pub fn pre(&self) -> StructuralEndpoint {
        match self {
            Chc::Fact { .. } | Chc::Simple { .. } => StructuralEndpoint::Entry,
            Chc::Query { pre, .. } | Chc::Inductive { pre, .. } => {
                StructuralEndpoint::LoopHead(*pre)
            }
        }
    }

    /// The endpoint the clause ends at.
    pub fn post(&self) -> StructuralEndpoint {
        match self {
            Chc::Query { .. } | Chc::Simple { .. } => StructuralEndpoint::ErrorExit,
            Chc::Fact { post, .. } | Chc::Inductive { post, .. } => {
                StructuralEndpoint::LoopHead(*post)
            }
        }
    }

    /// The transition of the clause.
    pub fn transition(&self) -> &Transition {
        match self {
            Chc::Fact { trans, .. }
            | Chc::Query { trans, .. }
            | Chc::Inductive { trans, .. }
            | Chc::Simple { trans } => trans,
        }
    }

    /// The loop heads this clause constrains.
    pub fn invariants_to_find(&self) -> Vec<Loc> {
        let mut sites = vec![];
        sites.extend(self.pre().loop_head());
        if let Some(post) = self.post().loop_head() {
            if !sites.contains(&post) {
                sites.push(post);
            }
        }
        sites
    }

    /// The formula that is satisfiable exactly when the clause is violated
    /// by `candidates`, with `default` standing in for sites the candidates
    /// leave out. The pre-site invariant is instantiated at version 0 and the
    /// post-site invariant at the clause's final indexing.
    pub fn to_solver_expr(&self, candidates: &InvariantCandidates, default: &Dnf) -> Term {
        let inv = |l: &Loc| dnf_to_term(candidates.get(*l).unwrap_or(default));
        let trans = self.transition();
        let pre = |l: &Loc| Indexing::new().instantiate(&inv(l));
        let post = |l: &Loc| trans.indexing.instantiate(&inv(l));
        match self {
            Chc::Fact { post: p, .. } => Term::and([trans.body.clone(), Term::not(post(p))]),
            Chc::Query { pre: p, .. } => Term::and([pre(p), trans.body.clone()]),
            Chc::Inductive {
                pre: p, post: q, ..
            } => Term::and([pre(p), trans.body.clone(), Term::not(post(q))]),
            Chc::Simple { .. } => trans.body.clone(),
        }
    }

    /// [`Chc::to_solver_expr`] with the candidates' own default.
    pub fn violation(&self, candidates: &InvariantCandidates) -> Term {
        self.to_solver_expr(candidates, candidates.default())
    }

    /// Display the clause with location names from `cfa`.
    pub fn display<'a>(&'a self, cfa: &'a Cfa) -> impl fmt::Display + 'a {
        ChcDisplay { chc: self, cfa }
    }
}

struct ChcDisplay<'a> {
    chc: &'a Chc,
    cfa: &'a Cfa,
}

impl fmt::Display for ChcDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.chc {
            Chc::Fact { .. } => "fact",
            Chc::Query { .. } => "query",
            Chc::Inductive { .. } => "inductive",
            Chc::Simple { .. } => "simple",
        };
        let trans = self.chc.transition();
        let vars = self.cfa.variables();
        let inv = |e: StructuralEndpoint, idx: &Indexing| match e {
            StructuralEndpoint::LoopHead(l) => {
                let args: Vec<String> = vars.iter().map(|v| idx.name(&v.name)).collect();
                format!("inv_{}({})", self.cfa.name(l), args.join(", "))
            }
            StructuralEndpoint::Entry => "true".to_string(),
            StructuralEndpoint::ErrorExit => "false".to_string(),
        };
        write!(
            f,
            "{kind} {} -> {}: {} & {} => {}",
            self.chc.pre().display(self.cfa),
            self.chc.post().display(self.cfa),
            inv(self.chc.pre(), &Indexing::new()),
            trans.body,
            inv(self.chc.post(), &trans.indexing),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Chc;
    use crate::{
        candidates::InvariantCandidates,
        decompose::{decompose, StructuralEndpoint},
    };
    use cfa::{
        automaton::CfaBuilder,
        syntax::{Sort, Stmt, Term},
    };

    #[test]
    fn test_violation_formulas() {
        let x = || Term::id("x");
        let cfa = CfaBuilder::new("entry", "error")
            .var("x", Sort::Int)
            .edge("entry", "mid", [Stmt::assign("x", Term::int(0))])
            .edge("mid", "mid", [Stmt::assign("x", Term::add(x(), Term::int(2)))])
            .edge("mid", "error", [Stmt::assume(Term::lt(x(), Term::int(0)))])
            .build()
            .unwrap();
        let d = decompose(&cfa).unwrap();
        let chcs: Vec<Chc> = d
            .segments
            .iter()
            .map(|s| Chc::from_segment(&cfa, s).unwrap())
            .collect();
        let mid = cfa.location("mid").unwrap();
        assert_eq!(chcs.len(), 3);
        assert!(matches!(chcs[0], Chc::Fact { post, .. } if post == mid));
        assert_eq!(chcs[1].pre(), StructuralEndpoint::LoopHead(mid));
        assert_eq!(chcs[1].invariants_to_find(), vec![mid]);

        let mut cands = InvariantCandidates::new(vec![]);
        cands.insert(mid, vec![vec![Term::leq(Term::int(0), x())]]);
        insta::assert_snapshot!(chcs[0].violation(&cands), @"((x@1 = 0) & (0 > x@1))");
        insta::assert_snapshot!(chcs[1].violation(&cands), @"((0 <= x@0) & (x@1 = (x@0 + 2)) & (0 > x@1))");
        insta::assert_snapshot!(chcs[2].violation(&cands), @"((0 <= x@0) & (x@0 < 0))");
        // an absent site takes the given default
        let none = InvariantCandidates::new(vec![]);
        assert_eq!(
            chcs[2].to_solver_expr(&none, &vec![vec![]]),
            Term::lt(Term::id("x@0"), Term::int(0))
        );
        assert_eq!(chcs[2].violation(&none), Term::false_());
        insta::assert_snapshot!(chcs[1].display(&cfa), @"inductive mid -> mid: inv_mid(x@0) & (x@1 = (x@0 + 2)) => inv_mid(x@1)");
    }
}
