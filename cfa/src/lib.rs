// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Control-flow automata over integer and Boolean variables, the terms
//! labelling their edges, and the symbolic operations invariant inference
//! needs on them: three-valued evaluation and SSA unrolling.

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

pub mod automaton;
pub mod semantics;
pub mod ssa;
pub mod syntax;

/// A malformed automaton description.
#[derive(Error, Debug)]
pub enum CfaError {
    /// The description is not valid JSON for an automaton
    #[error("could not read automaton: {0}")]
    Json(#[from] serde_json::Error),
    /// A location is declared twice
    #[error("location {0} is declared twice")]
    DuplicateLocation(String),
    /// A location is used but not declared
    #[error("unknown location {0}")]
    UnknownLocation(String),
    /// A variable is declared twice
    #[error("variable {0} is declared twice")]
    DuplicateVariable(String),
    /// A variable name clashes with SSA versioning
    #[error("variable name {0} may not contain '@'")]
    ReservedName(String),
    /// A statement uses an undeclared variable
    #[error("unknown variable {var} on edge {from} -> {to}")]
    UnknownVariable {
        /// the variable
        var: String,
        /// edge source
        from: String,
        /// edge target
        to: String,
    },
}
