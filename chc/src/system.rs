// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The CHC system of an automaton.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use cfa::{
    automaton::{Cfa, Loc, VarDecl},
    ssa::unversioned,
    syntax::{BinOp, Term, UOp},
};
use itertools::Itertools;
use petgraph::{Directed, Graph};
use solver::basics::Signature;

use crate::{clause::Chc, decompose::decompose, StructureError};

/// All Horn clauses of one automaton. Built once and never changed; the
/// flattened clause list and the set of sites needing an invariant are
/// derived on first use.
#[derive(Debug)]
pub struct ChcSystem {
    cfa: Cfa,
    facts: Vec<Chc>,
    queries: Vec<Chc>,
    inductives: Vec<Chc>,
    simples: Vec<Chc>,
    chcs: OnceLock<Vec<Chc>>,
    invariants: OnceLock<BTreeSet<Loc>>,
}

/// Decompose `cfa` and build its CHC system.
pub fn cfa_to_chc(cfa: &Cfa) -> Result<ChcSystem, StructureError> {
    let decomposition = decompose(cfa)?;
    let mut system = ChcSystem {
        cfa: cfa.clone(),
        facts: vec![],
        queries: vec![],
        inductives: vec![],
        simples: vec![],
        chcs: OnceLock::new(),
        invariants: OnceLock::new(),
    };
    for seg in &decomposition.segments {
        let chc = Chc::from_segment(cfa, seg)?;
        match chc {
            Chc::Fact { .. } => system.facts.push(chc),
            Chc::Query { .. } => system.queries.push(chc),
            Chc::Inductive { .. } => system.inductives.push(chc),
            Chc::Simple { .. } => system.simples.push(chc),
        }
    }
    log::info!(
        "built {} facts, {} queries, {} inductive and {} simple clauses over {} loop heads",
        system.facts.len(),
        system.queries.len(),
        system.inductives.len(),
        system.simples.len(),
        decomposition.loop_heads.len()
    );
    Ok(system)
}

impl ChcSystem {
    /// The automaton the clauses were built from.
    pub fn cfa(&self) -> &Cfa {
        &self.cfa
    }

    /// The program variables, which every invariant ranges over.
    pub fn variables(&self) -> &[VarDecl] {
        self.cfa.variables()
    }

    /// The sorts of the program variables.
    pub fn signature(&self) -> Signature {
        self.variables()
            .iter()
            .map(|v| (v.name.clone(), v.sort))
            .collect()
    }

    /// Clauses from the entry to a loop head.
    pub fn facts(&self) -> &[Chc] {
        &self.facts
    }

    /// Clauses from a loop head to the error location.
    pub fn queries(&self) -> &[Chc] {
        &self.queries
    }

    /// Clauses between loop heads.
    pub fn inductives(&self) -> &[Chc] {
        &self.inductives
    }

    /// Clauses from the entry straight to the error location.
    pub fn simples(&self) -> &[Chc] {
        &self.simples
    }

    /// Every clause: facts, inductive clauses, queries, then simple clauses.
    /// A clause is identified by its position in this list.
    pub fn chcs(&self) -> &[Chc] {
        self.chcs.get_or_init(|| {
            self.facts
                .iter()
                .chain(&self.inductives)
                .chain(&self.queries)
                .chain(&self.simples)
                .cloned()
                .collect()
        })
    }

    /// The loop heads that need an invariant.
    pub fn invariants(&self) -> &BTreeSet<Loc> {
        self.invariants.get_or_init(|| {
            self.chcs()
                .iter()
                .flat_map(|chc| chc.invariants_to_find())
                .collect()
        })
    }

    /// The clause dependency graph: node `i` is clause `i`, with an edge
    /// `i -> j` when clause `i` ends at the loop head clause `j` starts from.
    pub fn dependencies(&self) -> Graph<usize, (), Directed> {
        let chcs = self.chcs();
        let mut g = Graph::new();
        let nodes = (0..chcs.len()).map(|i| g.add_node(i)).collect_vec();
        for (i, j) in (0..chcs.len()).cartesian_product(0..chcs.len()) {
            let feeds = chcs[i]
                .post()
                .loop_head()
                .is_some_and(|l| chcs[j].pre().loop_head() == Some(l));
            if feeds {
                g.add_edge(nodes[i], nodes[j], ());
            }
        }
        g
    }

    /// The comparison atoms occurring in clause bodies, over unversioned
    /// variables. Negated atoms are collected un-negated.
    pub fn atoms(&self) -> Vec<Term> {
        let mut atoms = BTreeSet::new();
        for chc in self.chcs() {
            collect_atoms(&chc.transition().body, &mut atoms);
        }
        atoms
            .into_iter()
            .map(|t| t.rename(&|v| unversioned(v).map_or(v, |(base, _)| base).to_string()))
            .filter(|t| !t.vars().is_empty())
            .unique()
            .collect()
    }

    /// Display every clause, one per line, prefixed by its index.
    pub fn display(&self) -> impl fmt::Display + '_ {
        SystemDisplay(self)
    }
}

fn collect_atoms(t: &Term, atoms: &mut BTreeSet<Term>) {
    match t {
        Term::NAryOp(_, ts) => ts.iter().for_each(|t| collect_atoms(t, atoms)),
        Term::UnaryOp(UOp::Not, t) => collect_atoms(t, atoms),
        // definitions `x@1 = e` are not atoms of the program
        Term::BinOp(BinOp::Equals, lhs, _) if matches!(**lhs, Term::Id(_)) => {}
        t if t.is_atom() => {
            atoms.insert(t.clone());
        }
        _ => {}
    }
}

struct SystemDisplay<'a>(&'a ChcSystem);

impl fmt::Display for SystemDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfa = self.0.cfa();
        let lines = self
            .0
            .chcs()
            .iter()
            .enumerate()
            .map(|(i, chc)| format!("{i}: {}", chc.display(cfa)));
        write!(f, "{}", lines.format("\n"))
    }
}
