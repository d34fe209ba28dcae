// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The ice-verifier binary's command-line interface.

use std::path::PathBuf;
use std::time::Instant;
use std::{fs, process};

use cfa::{automaton::Cfa, CfaError};
use chc::{cfa_to_chc, ChcSystem};
use clap::Args;
use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{
        self as terminal,
        termcolor::{ColorChoice, StandardStream},
    },
};
use inference::{coordinator::infer, teacher::verify_candidates, InferenceConfig, Verdict};
use petgraph::visit::EdgeRef;
use solver::conf::{Backend, SolverConf};

/// Exit status when the program is proven unsafe.
pub const EXIT_UNSAFE: i32 = 2;

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum SolverType {
    Z3,
    Cvc5,
    Bounded,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum ColorOutput {
    Never,
    Auto,
    Always,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct SolverArgs {
    #[arg(value_enum, long, default_value_t = SolverType::Z3, global = true)]
    /// Solver to use
    solver: SolverType,

    #[arg(long, default_value_t = 8, global = true)]
    /// Integers range over [-radius, radius] with the bounded solver
    bound_radius: i64,

    #[arg(long, global = true)]
    /// Directory to save the SMT queries of each session to
    smt: Option<PathBuf>,

    #[arg(long, default_value_t = 600, global = true)]
    /// SMT solver timeout in seconds (0 for none)
    timeout: usize,

    #[arg(long, default_value_t = 0, global = true)]
    /// SMT solver random seed
    solver_seed: usize,
}

impl SolverArgs {
    fn get_solver_conf(&self) -> SolverConf {
        let backend = match self.solver {
            SolverType::Z3 => Backend::Z3,
            SolverType::Cvc5 => Backend::Cvc5,
            SolverType::Bounded => Backend::Bounded {
                radius: self.bound_radius,
            },
        };
        let mut conf = SolverConf::new(backend);
        conf.timeout_ms = (self.timeout > 0).then_some(self.timeout * 1000);
        conf.seed = self.solver_seed;
        conf.tee = self.smt.clone();
        conf
    }
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct InferArgs {
    #[command(flatten)]
    solver: SolverArgs,

    #[arg(long, default_value_t = 1)]
    /// Number of learners (more than one runs them concurrently)
    learners: usize,

    #[arg(long, default_value_t = 1)]
    /// Number of teachers, each with its own solver (more than one runs them
    /// concurrently)
    teachers: usize,

    #[arg(long)]
    /// Let learners split on the comparisons occurring in the program
    atoms: bool,

    #[arg(long)]
    /// Check the inferred invariants again with a fresh solver
    verify: bool,

    /// File name for a JSON automaton
    file: String,
}

impl InferArgs {
    fn config(&self) -> InferenceConfig {
        InferenceConfig {
            learners: self.learners,
            teachers: self.teachers,
            use_atoms: self.atoms,
        }
    }
}

#[derive(clap::Subcommand, Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Infer loop invariants proving the error location unreachable
    Infer(InferArgs),
    /// Print the Horn clauses of an automaton and their dependencies
    Print {
        /// File name for a JSON automaton
        file: String,
    },
}

impl Command {
    fn file(&self) -> &str {
        match self {
            Command::Infer(InferArgs { file, .. }) => file,
            Command::Print { file } => file,
        }
    }
}

/// Command-line arguments of the ice-verifier binary.
#[derive(clap::Parser, Debug)]
#[command(about, long_about=None)]
pub struct App {
    #[arg(value_enum, long, default_value_t = ColorOutput::Auto)]
    color: ColorOutput,

    #[command(subcommand)]
    command: Command,
}

/// Byte offset of a 1-based line and column in `text`.
fn offset_of(text: &str, line: usize, column: usize) -> usize {
    let start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (start + column.saturating_sub(1)).min(text.len())
}

/// A diagnostic for a malformed automaton, pointing at the offending part
/// of `text` when it can be found.
fn cfa_diagnostic(err: &CfaError, text: &str) -> Diagnostic<()> {
    let diagnostic = Diagnostic::error().with_message(err.to_string());
    let span = match err {
        CfaError::Json(e) => {
            let start = offset_of(text, e.line(), e.column());
            Some(start..(start + 1).min(text.len()))
        }
        CfaError::DuplicateLocation(name)
        | CfaError::UnknownLocation(name)
        | CfaError::DuplicateVariable(name)
        | CfaError::ReservedName(name)
        | CfaError::UnknownVariable { var: name, .. } => {
            let quoted = format!("\"{name}\"");
            // duplicates are reported at their second occurrence
            let nth = usize::from(matches!(
                err,
                CfaError::DuplicateLocation(_) | CfaError::DuplicateVariable(_)
            ));
            text.match_indices(&quoted)
                .nth(nth)
                .or_else(|| text.match_indices(&quoted).next())
                .map(|(start, s)| start..start + s.len())
        }
    };
    match span {
        Some(span) => diagnostic.with_labels(vec![Label::primary((), span)]),
        None => diagnostic,
    }
}

/// With the bounded backend, unsat only means no model in the box, so a
/// verdict holds for that box alone.
fn bounded_note(backend: &Backend) -> Option<String> {
    match backend {
        Backend::Bounded { radius } => Some(format!(
            "note: bounded solver, integers range over [-{radius}, {radius}]"
        )),
        Backend::Z3 | Backend::Cvc5 => None,
    }
}

fn print_system(system: &ChcSystem) {
    let cfa = system.cfa();
    let heads: Vec<&str> = system.invariants().iter().map(|&l| cfa.name(l)).collect();
    println!("loop heads: {}", heads.join(", "));
    println!("{}", system.display());
    let deps = system.dependencies();
    for e in deps.edge_references() {
        println!("clause {} -> clause {}", deps[e.source()], deps[e.target()]);
    }
}

impl App {
    /// Run the command, exiting with status 0 when the program is safe (or
    /// the command succeeds), [`EXIT_UNSAFE`] when it is unsafe, and 1 on
    /// errors.
    pub fn exec(self) {
        let file = match fs::read_to_string(self.command.file()) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("could not read {}: {err}", self.command.file());
                process::exit(1);
            }
        };
        let files = SimpleFile::new(self.command.file(), &file);

        let writer = StandardStream::stderr(match &self.color {
            ColorOutput::Never => ColorChoice::Never,
            ColorOutput::Always => ColorChoice::Always,
            ColorOutput::Auto => ColorChoice::Auto,
        });
        let config = codespan_reporting::term::Config {
            start_context_lines: 3,
            end_context_lines: 3,
            ..Default::default()
        };

        let cfa = match Cfa::from_json(&file) {
            Ok(cfa) => cfa,
            Err(err) => {
                let diagnostic = cfa_diagnostic(&err, &file);
                if terminal::emit(&mut writer.lock(), &config, &files, &diagnostic).is_err() {
                    eprintln!("{err}");
                }
                process::exit(1);
            }
        };
        let system = match cfa_to_chc(&cfa) {
            Ok(system) => system,
            Err(err) => {
                eprintln!("{err}");
                process::exit(1);
            }
        };

        match self.command {
            Command::Print { .. } => print_system(&system),
            Command::Infer(ref args) => {
                let conf = args.solver.get_solver_conf();
                let start = Instant::now();
                let verdict = infer(&system, &conf, &args.config());
                log::info!("inference finished in {:.1}s", start.elapsed().as_secs_f64());
                let note = bounded_note(&conf.backend);
                match verdict {
                    Ok(Verdict::Safe(candidates)) => {
                        if args.verify {
                            let violated = conf.session(&system.signature()).and_then(|mut s| {
                                verify_candidates(&system, &candidates, s.as_mut())
                            });
                            match violated {
                                Ok(violated) if violated.is_empty() => {
                                    log::info!("invariants verified against every clause");
                                }
                                Ok(violated) => {
                                    eprintln!("invariants violate clauses {violated:?}");
                                    process::exit(1);
                                }
                                Err(err) => {
                                    eprintln!("could not verify invariants: {err}");
                                    process::exit(1);
                                }
                            }
                        }
                        println!("safe");
                        if let Some(note) = &note {
                            println!("{note}");
                        }
                        println!("{}", candidates.display(&cfa));
                    }
                    Ok(Verdict::Unsafe(err)) => {
                        log::info!("witness of {} constraints", err.witness.len());
                        println!("unsafe");
                        if let Some(note) = &note {
                            println!("{note}");
                        }
                        println!("{}", err.display(&cfa));
                        process::exit(EXIT_UNSAFE);
                    }
                    Err(err) => {
                        eprintln!("inference failed: {err}");
                        process::exit(1);
                    }
                }
            }
        }
    }
}
