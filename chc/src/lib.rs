// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Constrained Horn clauses (CHC) derived from a control-flow automaton.
//!
//! The automaton is cut at its loop heads into loop-free segments
//! ([`decompose`]), each segment becomes one Horn clause ([`clause`]), and
//! the clauses together form a [`system::ChcSystem`]. A solution assigns an
//! [`candidates::InvariantCandidates`] formula to every loop head.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

use thiserror::Error;

pub mod candidates;
pub mod clause;
pub mod decompose;
pub mod system;

pub use candidates::{Dnf, InvariantCandidates};
pub use clause::{Chc, Transition};
pub use decompose::StructuralEndpoint;
pub use system::{cfa_to_chc, ChcSystem};

/// The automaton cannot be cut into Horn clauses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// A loop nest can be left through more than one location
    #[error("program structure does not allow translation to CHC: loop {scc:?} has exits {exits:?}")]
    MultipleLoopExits {
        /// locations of the loop
        scc: Vec<String>,
        /// locations with an edge leaving the loop
        exits: Vec<String>,
    },
    /// A segment connects endpoints no clause kind covers
    #[error("no clause for a segment from {from} to {to}")]
    UnexpectedSegment {
        #[allow(missing_docs)]
        from: String,
        #[allow(missing_docs)]
        to: String,
    },
}
