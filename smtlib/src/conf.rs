// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Launch configurations for Z3 and CVC5.

/// The full invocation of a solver binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverCmd {
    /// Binary to launch
    pub cmd: String,
    /// Arguments to pass
    pub args: Vec<String>,
    /// SMT options sent with `set-option` on startup
    pub options: Vec<(String, String)>,
    /// Logic sent with `set-logic` on startup
    pub logic: String,
}

impl SolverCmd {
    fn new(cmd: &str, args: &[&str]) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            options: vec![],
            logic: "QF_LIA".to_string(),
        }
    }

    /// Set an option, replacing any earlier value for the same option.
    pub fn option<S: AsRef<str>>(&mut self, name: &str, val: S) {
        self.options.retain(|(n, _)| n != name);
        self.options
            .push((name.to_string(), val.as_ref().to_string()));
    }

    /// The command line, for tee'd files and log messages.
    pub fn cmdline(&self) -> String {
        let mut line = self.cmd.clone();
        for a in &self.args {
            line.push(' ');
            if a.contains(' ') {
                line.push_str(&format!("\"{a}\""));
            } else {
                line.push_str(a);
            }
        }
        line
    }
}

/// Builder for a Z3 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct Z3Conf(SolverCmd);

impl Z3Conf {
    /// Z3 reading SMT-LIB2 from stdin, with complete models.
    pub fn new(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd, &["-in", "-smt2"]);
        cmd.option("model.completion", "true");
        Self(cmd)
    }

    /// Set a per-query timeout; `None` leaves Z3's default (no timeout).
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        if let Some(ms) = ms {
            self.0.option("timeout", format!("{ms}"));
        }
    }

    /// Set the random seed used by the SMT core.
    pub fn seed(&mut self, seed: usize) {
        self.0.option("smt.random_seed", format!("{seed}"));
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

/// Builder for a CVC5 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct Cvc5Conf(SolverCmd);

impl Cvc5Conf {
    /// CVC5 in incremental mode reading SMT-LIB2 from stdin.
    pub fn new(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd, &["-q", "--lang", "smt2"]);
        cmd.option("interactive", "false");
        cmd.option("incremental", "true");
        Self(cmd)
    }

    /// Set a per-query time limit. `None` sets no limit.
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        self.0.option("tlimit-per", format!("{}", ms.unwrap_or(0)));
    }

    /// Set the random seed.
    pub fn seed(&mut self, seed: usize) {
        self.0.option("seed", format!("{seed}"));
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{Cvc5Conf, Z3Conf};

    #[test]
    fn test_cmdline() {
        let mut z3 = Z3Conf::new("z3");
        z3.timeout_ms(Some(1000));
        z3.timeout_ms(Some(2000));
        let cmd = z3.done();
        assert_eq!(cmd.cmdline(), "z3 -in -smt2");
        assert_eq!(
            cmd.options,
            vec![
                ("model.completion".to_string(), "true".to_string()),
                ("timeout".to_string(), "2000".to_string()),
            ]
        );

        let cvc5 = Cvc5Conf::new("/opt/my solvers/cvc5").done();
        assert_eq!(cvc5.cmdline(), "/opt/my solvers/cvc5 -q --lang smt2");
        assert_eq!(cvc5.logic, "QF_LIA");
    }
}
