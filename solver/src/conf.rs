// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Holds the configuration needed to launch a solver session.

use std::path::PathBuf;

use smtlib::{
    conf::{Cvc5Conf, SolverCmd, Z3Conf},
    path::solver_path,
};

use crate::{
    basics::{SessionError, Signature, SolverSession},
    bounded::BoundedSession,
    smt::SmtSession,
};

/// Which kind of session to launch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Z3 as an external process
    Z3,
    /// CVC5 as an external process
    Cvc5,
    /// The in-process bounded search, with integers in `[-radius, radius]`
    Bounded {
        #[allow(missing_docs)]
        radius: i64,
    },
}

/// Wrapper around the configuration needed to launch a solver.
#[derive(Debug, Clone)]
pub struct SolverConf {
    /// Which backend to use for launched sessions.
    pub backend: Backend,
    /// Per-query timeout for process backends.
    pub timeout_ms: Option<usize>,
    /// Random seed for process backends (0 leaves the solver's default).
    pub seed: usize,
    /// The optional directory to tee SMT queries to.
    pub tee: Option<PathBuf>,
}

impl SolverConf {
    /// A configuration with no timeout, seed, or tee.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            timeout_ms: None,
            seed: 0,
            tee: None,
        }
    }

    fn z3_cmd(&self) -> SolverCmd {
        let mut conf = Z3Conf::new(&solver_path("z3"));
        conf.timeout_ms(self.timeout_ms);
        if self.seed != 0 {
            conf.seed(self.seed);
        }
        with_global_declarations(conf.done())
    }

    fn cvc5_cmd(&self) -> SolverCmd {
        let mut conf = Cvc5Conf::new(&solver_path("cvc5"));
        conf.timeout_ms(self.timeout_ms);
        if self.seed != 0 {
            conf.seed(self.seed);
        }
        with_global_declarations(conf.done())
    }

    /// Launch a new session over the variables of `sig`.
    pub fn session(&self, sig: &Signature) -> Result<Box<dyn SolverSession>, SessionError> {
        let cmd = match self.backend {
            Backend::Bounded { radius } => return Ok(Box::new(BoundedSession::new(sig, radius))),
            Backend::Z3 => self.z3_cmd(),
            Backend::Cvc5 => self.cvc5_cmd(),
        };
        Ok(Box::new(SmtSession::new(cmd, sig, self.tee.as_deref())?))
    }
}

// sessions declare versioned constants lazily inside scopes
fn with_global_declarations(mut cmd: SolverCmd) -> SolverCmd {
    cmd.option("global-declarations", "true");
    cmd
}

#[cfg(test)]
mod tests {
    use super::{Backend, SolverConf};

    #[test]
    fn test_process_options() {
        let mut conf = SolverConf::new(Backend::Z3);
        conf.timeout_ms = Some(500);
        let cmd = conf.z3_cmd();
        assert!(cmd
            .options
            .contains(&("global-declarations".to_string(), "true".to_string())));
        assert!(cmd
            .options
            .contains(&("timeout".to_string(), "500".to_string())));
        let cmd = SolverConf::new(Backend::Cvc5).cvc5_cmd();
        assert!(cmd
            .options
            .contains(&("global-declarations".to_string(), "true".to_string())));
    }
}
