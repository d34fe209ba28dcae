// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Control-flow automata: locations connected by edges labelled with
//! statement sequences, with a distinguished entry and error location.

use petgraph::{
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
    Direction,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::{
    syntax::{Sort, Stmt},
    CfaError,
};

/// A location of the automaton, identified by its node index.
pub type Loc = NodeIndex;

/// A named program location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Location name, unique within the automaton
    pub name: String,
}

/// An edge, executing its statements in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Statements
    pub stmts: Vec<Stmt>,
}

/// A declared program variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    /// Variable name
    pub name: String,
    /// Variable sort
    pub sort: Sort,
}

/// The serialized form of an edge.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDesc {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

/// The serialized form of an automaton, as read from JSON.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfaDesc {
    pub variables: Vec<VarDecl>,
    pub locations: Vec<String>,
    pub entry: String,
    pub error: String,
    pub edges: Vec<EdgeDesc>,
}

/// A control-flow automaton.
#[derive(Debug, Clone)]
pub struct Cfa {
    graph: DiGraph<Location, Edge>,
    variables: Vec<VarDecl>,
    entry: Loc,
    error: Loc,
}

impl Cfa {
    /// The underlying graph.
    pub fn graph(&self) -> &DiGraph<Location, Edge> {
        &self.graph
    }

    /// The entry location.
    pub fn entry(&self) -> Loc {
        self.entry
    }

    /// The error location.
    pub fn error(&self) -> Loc {
        self.error
    }

    /// The declared variables, in declaration order.
    pub fn variables(&self) -> &[VarDecl] {
        &self.variables
    }

    /// The name of a location.
    pub fn name(&self, loc: Loc) -> &str {
        &self.graph[loc].name
    }

    /// Look up a location by name.
    pub fn location(&self, name: &str) -> Option<Loc> {
        self.graph
            .node_indices()
            .find(|&l| self.graph[l].name == name)
    }

    /// The statements on an edge.
    pub fn stmts(&self, edge: EdgeIndex) -> &[Stmt] {
        &self.graph[edge].stmts
    }

    /// Outgoing edges of `loc` with their targets, in the order the edges
    /// were added.
    pub fn successors(&self, loc: Loc) -> Vec<(EdgeIndex, Loc)> {
        let mut succs: Vec<(EdgeIndex, Loc)> = self
            .graph
            .edges_directed(loc, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        succs.sort_by_key(|(e, _)| e.index());
        succs
    }

    /// Locations reachable from the entry, in breadth-first order.
    pub fn reachable(&self) -> Vec<Loc> {
        let mut seen = HashSet::from([self.entry]);
        let mut order = vec![];
        let mut queue = VecDeque::from([self.entry]);
        while let Some(loc) = queue.pop_front() {
            order.push(loc);
            for (_, next) in self.successors(loc) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Build an automaton from its description, checking that every name it
    /// mentions is declared.
    pub fn from_desc(desc: &CfaDesc) -> Result<Self, CfaError> {
        let mut sorts = BTreeMap::new();
        for v in &desc.variables {
            if sorts.insert(v.name.clone(), v.sort).is_some() {
                return Err(CfaError::DuplicateVariable(v.name.clone()));
            }
            if v.name.contains('@') {
                return Err(CfaError::ReservedName(v.name.clone()));
            }
        }
        let mut graph = DiGraph::new();
        let mut locs = BTreeMap::new();
        for name in &desc.locations {
            let loc = graph.add_node(Location { name: name.clone() });
            if locs.insert(name.clone(), loc).is_some() {
                return Err(CfaError::DuplicateLocation(name.clone()));
            }
        }
        let lookup = |name: &str| {
            locs.get(name)
                .copied()
                .ok_or_else(|| CfaError::UnknownLocation(name.to_string()))
        };
        for e in &desc.edges {
            for stmt in &e.stmts {
                check_stmt(stmt, &sorts, e)?;
            }
            graph.add_edge(
                lookup(&e.from)?,
                lookup(&e.to)?,
                Edge {
                    stmts: e.stmts.clone(),
                },
            );
        }
        Ok(Self {
            entry: lookup(&desc.entry)?,
            error: lookup(&desc.error)?,
            graph,
            variables: desc.variables.clone(),
        })
    }

    /// The description this automaton can be rebuilt from.
    pub fn to_desc(&self) -> CfaDesc {
        let name = |l: Loc| self.graph[l].name.clone();
        CfaDesc {
            variables: self.variables.clone(),
            locations: self.graph.node_indices().map(name).collect(),
            entry: name(self.entry),
            error: name(self.error),
            edges: self
                .graph
                .edge_indices()
                .filter_map(|e| {
                    let (from, to) = self.graph.edge_endpoints(e)?;
                    Some(EdgeDesc {
                        from: name(from),
                        to: name(to),
                        stmts: self.graph[e].stmts.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Parse an automaton from JSON.
    pub fn from_json(s: &str) -> Result<Self, CfaError> {
        let desc: CfaDesc = serde_json::from_str(s)?;
        Self::from_desc(&desc)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CfaError> {
        Ok(serde_json::to_string_pretty(&self.to_desc())?)
    }
}

fn check_stmt(stmt: &Stmt, sorts: &BTreeMap<String, Sort>, e: &EdgeDesc) -> Result<(), CfaError> {
    let unknown = |var: &str| CfaError::UnknownVariable {
        var: var.to_string(),
        from: e.from.clone(),
        to: e.to.clone(),
    };
    let (written, read) = match stmt {
        Stmt::Assign(v, t) => (Some(v), t.vars()),
        Stmt::Assume(t) => (None, t.vars()),
        Stmt::Havoc(v) => (Some(v), Default::default()),
    };
    for v in written.into_iter().chain(read.iter()) {
        if !sorts.contains_key(v) {
            return Err(unknown(v));
        }
    }
    Ok(())
}

/// Incrementally describe an automaton, mostly for tests and tools.
#[derive(Debug, Clone, Default)]
pub struct CfaBuilder {
    desc: CfaDesc,
}

impl CfaBuilder {
    /// An empty automaton with `entry` and `error` locations.
    pub fn new(entry: &str, error: &str) -> Self {
        let mut b = Self::default();
        b.desc.entry = entry.to_string();
        b.desc.error = error.to_string();
        b.location(entry).location(error)
    }

    /// Declare a variable.
    pub fn var(mut self, name: &str, sort: Sort) -> Self {
        self.desc.variables.push(VarDecl {
            name: name.to_string(),
            sort,
        });
        self
    }

    /// Declare a location (declaring the same location twice is a no-op).
    pub fn location(mut self, name: &str) -> Self {
        if !self.desc.locations.iter().any(|l| l == name) {
            self.desc.locations.push(name.to_string());
        }
        self
    }

    /// Add an edge, declaring its endpoints if needed.
    pub fn edge<I>(self, from: &str, to: &str, stmts: I) -> Self
    where
        I: IntoIterator<Item = Stmt>,
    {
        let mut b = self.location(from).location(to);
        b.desc.edges.push(EdgeDesc {
            from: from.to_string(),
            to: to.to_string(),
            stmts: stmts.into_iter().collect(),
        });
        b
    }

    /// Check and build the automaton.
    pub fn build(&self) -> Result<Cfa, CfaError> {
        Cfa::from_desc(&self.desc)
    }
}
