// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Incremental solver sessions over [`Term`](cfa::syntax::Term)s, backed by
//! an SMT solver process or by a bounded in-process search.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod basics;
pub mod bounded;
pub mod conf;
pub mod smt;

pub use smtlib::path::{find_solver, solver_path};
pub use smtlib::proc::SatResp;
