// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Candidate invariants for the loop heads of a CHC system.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cfa::{
    automaton::{Cfa, Loc},
    syntax::Term,
};
use itertools::Itertools;

/// A formula in disjunctive normal form: a disjunction of conjunctions.
/// `vec![vec![]]` is true and `vec![]` is false.
pub type Dnf = Vec<Vec<Term>>;

/// The term for a formula in disjunctive normal form.
pub fn dnf_to_term(dnf: &Dnf) -> Term {
    Term::or(dnf.iter().map(|conj| Term::and(conj.iter().cloned())))
}

/// A formula for each loop head over the (unversioned) program variables,
/// plus a default for loop heads without their own entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantCandidates {
    sites: BTreeMap<Loc, Dnf>,
    default: Dnf,
}

impl InvariantCandidates {
    /// Candidates that give every site `default`.
    pub fn new(default: Dnf) -> Self {
        Self {
            sites: BTreeMap::new(),
            default,
        }
    }

    /// Every site is `true`.
    pub fn true_() -> Self {
        Self::new(vec![vec![]])
    }

    /// Every site is `false`.
    pub fn false_() -> Self {
        Self::new(vec![])
    }

    /// Set the formula of one site.
    pub fn insert(&mut self, site: Loc, dnf: Dnf) {
        self.sites.insert(site, dnf);
    }

    /// The formula given explicitly for `site`, if any.
    pub fn get(&self, site: Loc) -> Option<&Dnf> {
        self.sites.get(&site)
    }

    /// The formula for `site`, falling back to the default.
    pub fn dnf(&self, site: Loc) -> &Dnf {
        self.sites.get(&site).unwrap_or(&self.default)
    }

    /// The formula for sites without their own entry.
    pub fn default(&self) -> &Dnf {
        &self.default
    }

    /// The formula for `site` as a term.
    pub fn formula(&self, site: Loc) -> Term {
        dnf_to_term(self.dnf(site))
    }

    /// The sites with explicit entries.
    pub fn sites(&self) -> impl Iterator<Item = (Loc, &Dnf)> {
        self.sites.iter().map(|(l, d)| (*l, d))
    }

    fn map<F: Fn(&Dnf) -> Dnf>(&self, f: F) -> Self {
        Self {
            sites: self.sites.iter().map(|(l, d)| (*l, f(d))).collect(),
            default: f(&self.default),
        }
    }

    /// Conjoin `atom` onto every disjunct of every formula.
    pub fn guard(&self, atom: &Term) -> Self {
        self.map(|dnf| {
            dnf.iter()
                .map(|conj| {
                    let mut conj = conj.clone();
                    conj.push(atom.clone());
                    conj
                })
                .collect()
        })
    }

    /// The site-wise disjunction of two candidate maps.
    pub fn or(&self, other: &Self) -> Self {
        let keys: BTreeSet<Loc> = self.sites.keys().chain(other.sites.keys()).copied().collect();
        let join = |a: &Dnf, b: &Dnf| a.iter().chain(b.iter()).cloned().collect::<Dnf>();
        Self {
            sites: keys
                .into_iter()
                .map(|l| (l, join(self.dnf(l), other.dnf(l))))
                .collect(),
            default: join(&self.default, &other.default),
        }
    }

    /// Take the formulas of `inside` for the sites in `sites` and those of
    /// `outside` everywhere else.
    pub fn select(sites: &BTreeSet<Loc>, inside: &Self, outside: &Self) -> Self {
        let mut out = Self {
            sites: outside
                .sites
                .iter()
                .filter(|(l, _)| !sites.contains(*l))
                .map(|(l, d)| (*l, d.clone()))
                .collect(),
            default: outside.default.clone(),
        };
        for &l in sites {
            out.insert(l, inside.dnf(l).clone());
        }
        out
    }

    /// Display the candidates with location names from `cfa`.
    pub fn display<'a>(&'a self, cfa: &'a Cfa) -> impl fmt::Display + 'a {
        CandidatesDisplay {
            candidates: self,
            cfa,
        }
    }
}

struct CandidatesDisplay<'a> {
    candidates: &'a InvariantCandidates,
    cfa: &'a Cfa,
}

impl fmt::Display for CandidatesDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .candidates
            .sites()
            .map(|(l, dnf)| format!("{}: {}", self.cfa.name(l), dnf_to_term(dnf)))
            .chain([format!("default: {}", dnf_to_term(&self.candidates.default))]);
        write!(f, "{}", lines.format("\n"))
    }
}
