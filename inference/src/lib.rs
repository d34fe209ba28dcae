// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Invariant inference by learning from implication counterexamples.
//!
//! A [`learner::Learner`] proposes candidate invariants consistent with a
//! [`constraints::ConstraintSystem`]; a [`teacher::Teacher`] checks them
//! against the Horn clauses and reports violations as constraints between
//! datapoints. A coordinator alternates the two until the candidates are
//! inductive or the constraints prove the program unsafe.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![deny(clippy::uninlined_format_args)]
#![allow(clippy::len_without_is_empty)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod constraints;
pub mod coordinator;
pub mod dtree;
pub mod learner;
pub mod observation;
pub mod parallel;
pub mod teacher;

pub use constraints::{ConstraintSystem, ConstraintSystemBuilder, ContradictoryError};
pub use coordinator::{infer, solve_chc_system, InferenceConfig, SolveError, Verdict};
pub use observation::{Constraint, Datapoint, Origin};
