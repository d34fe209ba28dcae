// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Cutting an automaton into loop-free segments between structural
//! endpoints.
//!
//! Loops are found as strongly-connected components. Each loop must be left
//! through a single location, which becomes the loop head: the place where
//! an invariant is needed. Removing the head from its component exposes the
//! nested loops, which are decomposed the same way. Finally every path from
//! the entry or a loop head to the next loop head or to the error location
//! becomes a segment.

use std::collections::VecDeque;
use std::fmt;

use cfa::automaton::{Cfa, Loc};
use fxhash::FxBuildHasher;
use itertools::Itertools;
use petgraph::graph::EdgeIndex;

use crate::StructureError;

// insertion-ordered, so loops and segments come out in a stable order
type HashMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;
type HashSet<K> = indexmap::IndexSet<K, FxBuildHasher>;

/// A place between which segments run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StructuralEndpoint {
    /// The entry of the program
    Entry,
    /// Reaching the error location
    ErrorExit,
    /// The head of a loop, which needs an invariant
    LoopHead(Loc),
}

impl StructuralEndpoint {
    /// The loop head, if this endpoint is one.
    pub fn loop_head(&self) -> Option<Loc> {
        match self {
            StructuralEndpoint::LoopHead(l) => Some(*l),
            StructuralEndpoint::Entry | StructuralEndpoint::ErrorExit => None,
        }
    }

    /// Display the endpoint with location names from `cfa`.
    pub fn display<'a>(&'a self, cfa: &'a Cfa) -> impl fmt::Display + 'a {
        EndpointDisplay { endpoint: self, cfa }
    }
}

struct EndpointDisplay<'a> {
    endpoint: &'a StructuralEndpoint,
    cfa: &'a Cfa,
}

impl fmt::Display for EndpointDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.endpoint {
            StructuralEndpoint::Entry => write!(f, "entry"),
            StructuralEndpoint::ErrorExit => write!(f, "error"),
            StructuralEndpoint::LoopHead(l) => write!(f, "{}", self.cfa.name(*l)),
        }
    }
}

/// A loop-free path between two structural endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Where the path starts
    pub start: StructuralEndpoint,
    /// Where the path ends
    pub end: StructuralEndpoint,
    /// The edges taken, in order
    pub edges: Vec<EdgeIndex>,
}

/// The result of decomposing an automaton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    /// Loop heads, in breadth-first order from the entry
    pub loop_heads: Vec<Loc>,
    /// Segments, grouped by start endpoint
    pub segments: Vec<Segment>,
}

#[derive(Default)]
struct Tarjan {
    index: HashMap<Loc, usize>,
    lowlink: HashMap<Loc, usize>,
    on_stack: HashSet<Loc>,
    stack: Vec<Loc>,
    // frames of (location, next successor to visit)
    calls: Vec<(Loc, usize)>,
    sccs: Vec<Vec<Loc>>,
}

impl Tarjan {
    fn visit(&mut self, v: Loc) {
        let i = self.index.len();
        self.index.insert(v, i);
        self.lowlink.insert(v, i);
        self.stack.push(v);
        self.on_stack.insert(v);
        self.calls.push((v, 0));
    }

    fn lower(&mut self, v: Loc, to: usize) {
        if let Some(low) = self.lowlink.get_mut(&v) {
            *low = (*low).min(to);
        }
    }

    fn run(&mut self, root: Loc, succs: &HashMap<Loc, Vec<Loc>>) {
        self.visit(root);
        while let Some(&(v, next)) = self.calls.last() {
            if let Some(&w) = succs.get(&v).and_then(|ws| ws.get(next)) {
                if let Some(frame) = self.calls.last_mut() {
                    frame.1 += 1;
                }
                match self.index.get(&w) {
                    None => self.visit(w),
                    Some(&iw) if self.on_stack.contains(&w) => self.lower(v, iw),
                    Some(_) => {}
                }
                continue;
            }
            self.calls.pop();
            let low = self.lowlink[&v];
            if let Some(&(u, _)) = self.calls.last() {
                self.lower(u, low);
            }
            if low == self.index[&v] {
                let mut scc = vec![];
                while let Some(w) = self.stack.pop() {
                    self.on_stack.swap_remove(&w);
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                scc.reverse();
                self.sccs.push(scc);
            }
        }
    }
}

/// Tarjan's algorithm over the subgraph induced by `nodes`, with an explicit
/// call stack. Components come out in reverse topological order; the order
/// is fixed by the order of `nodes` and of each location's edges.
pub fn strongly_connected(cfa: &Cfa, nodes: &[Loc]) -> Vec<Vec<Loc>> {
    let members: HashSet<Loc> = nodes.iter().copied().collect();
    let succs: HashMap<Loc, Vec<Loc>> = nodes
        .iter()
        .map(|&l| (l, local_successors(cfa, l, &members)))
        .collect();
    let mut tarjan = Tarjan::default();
    for &root in nodes {
        if !tarjan.index.contains_key(&root) {
            tarjan.run(root, &succs);
        }
    }
    tarjan.sccs
}

// The error location is terminal: leaving it is never part of a loop.
fn local_successors(cfa: &Cfa, loc: Loc, members: &HashSet<Loc>) -> Vec<Loc> {
    if loc == cfa.error() {
        return vec![];
    }
    cfa.successors(loc)
        .into_iter()
        .map(|(_, next)| next)
        .filter(|next| members.contains(next))
        .collect()
}

/// Find the loop heads among `nodes`, appending them to `heads`.
fn find_loop_heads(cfa: &Cfa, nodes: &[Loc], heads: &mut Vec<Loc>) -> Result<(), StructureError> {
    for scc in strongly_connected(cfa, nodes) {
        let members: HashSet<Loc> = scc.iter().copied().collect();
        let cyclic = scc.len() > 1
            || local_successors(cfa, scc[0], &members).contains(&scc[0]);
        if !cyclic {
            continue;
        }
        let exits = scc
            .iter()
            .copied()
            .filter(|&l| {
                cfa.successors(l)
                    .iter()
                    .any(|(_, next)| !members.contains(next))
            })
            .collect_vec();
        match exits[..] {
            [] => {
                log::debug!(
                    "dropping loop {:?} that is never left",
                    scc.iter().map(|&l| cfa.name(l)).collect_vec()
                );
            }
            [head] => {
                log::trace!("loop head {}", cfa.name(head));
                heads.push(head);
                let rest = scc.iter().copied().filter(|&l| l != head).collect_vec();
                find_loop_heads(cfa, &rest, heads)?;
            }
            _ => {
                return Err(StructureError::MultipleLoopExits {
                    scc: scc.iter().map(|&l| cfa.name(l).to_string()).collect(),
                    exits: exits.iter().map(|&l| cfa.name(l).to_string()).collect(),
                })
            }
        }
    }
    Ok(())
}

/// Decompose the reachable part of `cfa` into loop heads and segments.
pub fn decompose(cfa: &Cfa) -> Result<Decomposition, StructureError> {
    let reachable = cfa.reachable();
    let mut loop_heads = vec![];
    find_loop_heads(cfa, &reachable, &mut loop_heads)?;
    let rank: HashMap<Loc, usize> = reachable.iter().enumerate().map(|(i, &l)| (l, i)).collect();
    loop_heads.sort_by_key(|l| rank[l]);
    let heads: HashSet<Loc> = loop_heads.iter().copied().collect();

    let endpoint_at = |l: Loc| {
        if heads.contains(&l) {
            Some(StructuralEndpoint::LoopHead(l))
        } else if l == cfa.error() {
            Some(StructuralEndpoint::ErrorExit)
        } else {
            None
        }
    };

    let mut segments = vec![];
    let entry = cfa.entry();
    let mut starts = vec![];
    match endpoint_at(entry) {
        // the entry path to a loop head at the entry is empty
        Some(end) => segments.push(Segment {
            start: StructuralEndpoint::Entry,
            end,
            edges: vec![],
        }),
        None => starts.push((StructuralEndpoint::Entry, entry)),
    }
    starts.extend(loop_heads.iter().map(|&l| (StructuralEndpoint::LoopHead(l), l)));

    for (start, from) in starts {
        // paths in flight: current location, edges so far, locations visited
        let mut queue: VecDeque<(Loc, Vec<EdgeIndex>, HashSet<Loc>)> =
            VecDeque::from([(from, vec![], HashSet::from_iter([from]))]);
        while let Some((loc, edges, visited)) = queue.pop_front() {
            for (e, next) in cfa.successors(loc) {
                let mut path = edges.clone();
                path.push(e);
                if let Some(end) = endpoint_at(next) {
                    segments.push(Segment {
                        start,
                        end,
                        edges: path,
                    });
                } else if !visited.contains(&next) {
                    let mut visited = visited.clone();
                    visited.insert(next);
                    queue.push_back((next, path, visited));
                }
            }
        }
    }
    log::debug!(
        "decomposed into {} loop heads and {} segments",
        loop_heads.len(),
        segments.len()
    );

    Ok(Decomposition {
        loop_heads,
        segments,
    })
}
