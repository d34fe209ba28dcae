// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A running SMT-LIB2 solver process.
//!
//! Commands are written to the solver's stdin; responses are delimited by
//! asking the solver to echo a marker after each command that produces
//! output. The process can be killed from another thread through an
//! [`SmtPid`] while a `check-sat` is in progress.

use crate::conf::SolverCmd;
use crate::sexp::{self, app, atom_s, sexp_l, Sexp};
use crate::tee::Tee;
use nix::{errno::Errno, sys::signal, unistd::Pid};
use std::{
    ffi::OsStr,
    io::{self, BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::{Arc, Mutex},
};
use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Status {
    /// Running; `in_call` is set during `check-sat` and `get-value`.
    Running { in_call: bool },
    /// Cancellation was requested outside an expensive call. The next call
    /// that needs a response kills the process instead of running.
    Stopping,
    /// Killed, but not yet reaped.
    NeedsWait,
    /// Exited and reaped.
    Terminated,
}

/// A solver process.
#[derive(Debug)]
pub struct SmtProc {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    tee: Option<Tee>,
    // shared with every SmtPid so a stale pid is never signalled
    status: Arc<Mutex<Status>>,
}

/// A handle for killing the process from another thread.
#[derive(Debug, Clone)]
pub struct SmtPid {
    pid: Pid,
    status: Arc<Mutex<Status>>,
}

/// The solver's answer to `(check-sat)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResp {
    /// Satisfiable
    Sat,
    /// Unsatisfiable
    Unsat,
    /// Unknown, with the solver's `:reason-unknown`
    Unknown(String),
}

/// An error from talking to the solver process.
#[derive(Error, Debug)]
pub enum SolverError {
    /// I/O went wrong
    #[error("some I/O went wrong: {0}")]
    Io(#[from] io::Error),
    /// The solver reported an error or exited unexpectedly
    #[error("solver returned an error:\n{0}")]
    UnexpectedClose(String),
    /// A response could not be parsed
    #[error("could not parse solver response `{resp}`: {msg}")]
    Parse {
        /// the raw response
        resp: String,
        /// what went wrong
        msg: String,
    },
    /// The solver was killed through an [`SmtPid`]
    #[error("solver was killed")]
    Killed,
}

type Result<T> = std::result::Result<T, SolverError>;

impl Drop for SmtProc {
    fn drop(&mut self) {
        _ = writeln!(self.stdin, "(exit)");
        _ = self.stdin.flush();
        _ = self.child.kill();
        _ = self.child.wait();
        if let Ok(mut status) = self.status.lock() {
            *status = Status::Terminated;
        }
    }
}

impl SmtPid {
    /// Kill the process. Outside of an expensive call this only marks the
    /// process as stopping.
    pub fn kill(&self) {
        let mut status = self.status.lock().unwrap();
        if let Status::Running { in_call } = *status {
            if in_call {
                match signal::kill(self.pid, signal::Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(errno) => log::warn!("killing SMT process {} failed: {errno}", self.pid),
                }
                *status = Status::NeedsWait;
            } else {
                *status = Status::Stopping;
            }
        }
    }
}

impl SmtProc {
    /// Launch a solver. With `tee`, everything sent is also recorded and can
    /// be saved under that directory with [`SmtProc::save_tee`].
    pub fn new(cmd: SolverCmd, tee: Option<&Path>) -> Result<Self> {
        let mut child = Command::new(OsStr::new(&cmd.cmd))
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SolverError::UnexpectedClose(
                "solver pipes unavailable".to_string(),
            ));
        };
        let tee = tee.map(|dir| {
            let mut t = Tee::new(dir);
            t.append(Sexp::Comment(cmd.cmdline()));
            t
        });
        let mut proc = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            tee,
            status: Arc::new(Mutex::new(Status::Running { in_call: false })),
        };
        proc.send(&app(
            "set-option",
            [atom_s(":produce-models"), atom_s("true")],
        ))?;
        for (option, val) in &cmd.options {
            proc.send(&app("set-option", [atom_s(format!(":{option}")), atom_s(val)]))?;
        }
        proc.send(&app("set-logic", [atom_s(&cmd.logic)]))?;
        Ok(proc)
    }

    /// A handle for cancellation.
    pub fn pid(&self) -> SmtPid {
        SmtPid {
            // Child ids are positive and fit in a pid_t
            pid: Pid::from_raw(self.child.id() as i32),
            status: self.status.clone(),
        }
    }

    /// Reap or kill the process if a cancellation happened.
    fn handle_termination(&mut self, status: &mut Status) -> Result<()> {
        match *status {
            Status::Running { .. } => return Ok(()),
            Status::Stopping => {
                _ = self.child.kill();
                _ = self.child.wait();
            }
            Status::NeedsWait => {
                _ = self.child.wait();
            }
            Status::Terminated => {}
        }
        *status = Status::Terminated;
        Err(SolverError::Killed)
    }

    fn check_killed(&mut self) -> Result<()> {
        let status = self.status.clone();
        let mut status = status.lock().unwrap();
        self.handle_termination(&mut status)
    }

    fn set_in_call(&mut self, in_call: bool) -> Result<()> {
        let status = self.status.clone();
        let mut status = status.lock().unwrap();
        self.handle_termination(&mut status)?;
        *status = Status::Running { in_call };
        Ok(())
    }

    /// Send a command that produces no output. After a cancellation this
    /// reports [`SolverError::Killed`] without writing anything.
    pub fn send(&mut self, data: &Sexp) -> Result<()> {
        self.check_killed()?;
        if let Some(t) = &mut self.tee {
            t.append(data.clone());
        }
        match writeln!(self.stdin, "{data}") {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                self.check_killed()?;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    const DONE: &'static str = "<<DONE>>";

    /// Read everything the solver prints up to the echoed marker.
    fn get_response(&mut self) -> Result<String> {
        let marker = format!(r#"(echo "{}")"#, Self::DONE);
        if let Err(err) = writeln!(self.stdin, "{marker}").and_then(|_| self.stdin.flush()) {
            self.check_killed()?;
            return Err(err.into());
        }
        let mut buf = String::new();
        loop {
            let start = buf.len();
            let n = self.stdout.read_line(&mut buf)?;
            if n == 0 {
                self.check_killed()?;
                return Err(SolverError::UnexpectedClose(Self::parse_error(&buf)));
            }
            let line = buf[start..].trim_end();
            // z3 echoes the marker bare, cvc5 quoted
            if line == Self::DONE || line == format!("\"{}\"", Self::DONE) {
                return Ok(buf[..start].trim_end().to_string());
            }
        }
    }

    fn send_with_reply(&mut self, data: &Sexp) -> Result<Sexp> {
        self.send(data)?;
        let resp = self.get_response()?;
        if resp.starts_with("(error") {
            return Err(SolverError::UnexpectedClose(Self::parse_error(&resp)));
        }
        sexp::parse(&resp).map_err(|err| SolverError::Parse {
            resp: resp.clone(),
            msg: err.to_string(),
        })
    }

    /// Extract the message of an `(error "..")` response, or fall back to the
    /// raw text.
    fn parse_error(resp: &str) -> String {
        let msg = sexp::parse_many(resp).ok().and_then(|sexps| {
            sexps.iter().find_map(|s| match s.app() {
                Some(("error", [msg])) => msg.atom_s().map(|m| m.to_string()),
                _ => None,
            })
        });
        msg.unwrap_or_else(|| resp.to_string())
    }

    /// Open an assertion scope.
    pub fn push(&mut self) -> Result<()> {
        self.send(&app("push", [sexp::atom_i(1)]))
    }

    /// Close the innermost assertion scope.
    pub fn pop(&mut self) -> Result<()> {
        self.send(&app("pop", [sexp::atom_i(1)]))
    }

    /// Declare an uninterpreted constant of the given sort.
    pub fn declare_const(&mut self, name: &str, sort: &str) -> Result<()> {
        self.send(&app("declare-const", [atom_s(name), atom_s(sort)]))
    }

    /// Assert a formula.
    pub fn assert(&mut self, formula: Sexp) -> Result<()> {
        self.send(&app("assert", [formula]))
    }

    /// Run `(check-sat)`.
    pub fn check_sat(&mut self) -> Result<SatResp> {
        self.send(&app("check-sat", []))?;
        self.set_in_call(true)?;
        let resp = self.get_response();
        self.set_in_call(false)?;
        let resp = resp?;
        match resp.as_str() {
            "sat" => Ok(SatResp::Sat),
            "unsat" => Ok(SatResp::Unsat),
            "unknown" => {
                let reason = self.get_info(":reason-unknown")?;
                if let Some(name) = self.save_tee() {
                    log::info!("unknown response, query saved to {}", name.display());
                }
                Ok(SatResp::Unknown(reason.to_string()))
            }
            _ => Err(SolverError::UnexpectedClose(Self::parse_error(&resp))),
        }
    }

    /// Run `(get-value (names..))` after a sat response, returning the
    /// `((name value) ..)` list.
    pub fn get_value(&mut self, names: &[String]) -> Result<Sexp> {
        if names.is_empty() {
            return Ok(sexp_l([]));
        }
        self.set_in_call(true)?;
        let resp = self.send_with_reply(&app("get-value", [sexp_l(names.iter().map(atom_s))]));
        self.set_in_call(false)?;
        resp
    }

    /// Get an attribute with `(get-info ..)`.
    pub fn get_info(&mut self, attribute: &str) -> Result<Sexp> {
        let resp = self.send_with_reply(&app("get-info", [atom_s(attribute)]))?;
        match resp.list() {
            Some([key, val]) if key.atom_s() == Some(attribute) => Ok(val.clone()),
            _ => Err(SolverError::Parse {
                resp: resp.to_string(),
                msg: format!("expected ({attribute} value)"),
            }),
        }
    }

    /// Add a comment to the tee'd file. The closure only runs when teeing.
    pub fn comment_with<F>(&mut self, comment: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(t) = &mut self.tee {
            t.append(Sexp::Comment("".to_string()));
            t.append(Sexp::Comment(comment()));
        }
    }

    /// Save the tee'd commands, if teeing, returning the created file.
    pub fn save_tee(&self) -> Option<PathBuf> {
        let tee = self.tee.as_ref()?;
        match tee.save() {
            Ok(name) => Some(name),
            Err(err) => {
                log::warn!("failed to save tee: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        conf::Z3Conf,
        path::find_solver,
        proc::{SatResp, SmtProc, SolverError},
        sexp::{app, atom_i, atom_s, parse},
    };
    use eyre::Context;
    use std::{sync::mpsc, thread, time::Duration};

    fn z3_with_logic(logic: &str) -> Option<SmtProc> {
        let Some(path) = find_solver("z3") else {
            eprintln!("could not find z3, skipping test");
            return None;
        };
        let mut cmd = Z3Conf::new(&path).done();
        cmd.logic = logic.to_string();
        Some(SmtProc::new(cmd, None).unwrap())
    }

    fn z3() -> Option<SmtProc> {
        z3_with_logic("QF_LIA")
    }

    #[test]
    fn test_check_sat_and_values() {
        let Some(mut solver) = z3() else { return };
        solver.declare_const("x@0", "Int").unwrap();
        solver
            .assert(parse("(and (< 3 x@0) (< x@0 5))").unwrap())
            .unwrap();
        let response = solver.check_sat().wrap_err("could not check-sat").unwrap();
        assert_eq!(response, SatResp::Sat);
        let values = solver.get_value(&["x@0".to_string()]).unwrap();
        insta::assert_snapshot!(values, @"((x@0 4))");
    }

    #[test]
    fn test_push_pop() {
        let Some(mut solver) = z3() else { return };
        solver.declare_const("b", "Bool").unwrap();
        solver.push().unwrap();
        solver
            .assert(app("and", [atom_s("b"), app("not", [atom_s("b")])]))
            .unwrap();
        insta::assert_debug_snapshot!(solver.check_sat().unwrap(), @"Unsat");
        solver.pop().unwrap();
        assert_eq!(solver.check_sat().unwrap(), SatResp::Sat);
    }

    #[test]
    fn test_ill_formed() {
        let Some(mut solver) = z3() else { return };
        // unbound symbol
        solver.assert(app("=", [atom_s("p"), atom_i(1)])).unwrap();
        let r = solver.check_sat();
        assert!(
            matches!(r, Err(SolverError::UnexpectedClose(_))),
            "expected a solver error, got {r:?}"
        );
    }

    #[test]
    fn test_kill_during_check() {
        let Some(mut solver) = z3_with_logic("ALL") else { return };
        let pid = solver.pid();
        // a nonlinear problem z3 takes a long time on
        for line in [
            "(declare-const a Int)",
            "(declare-const b Int)",
            "(declare-const c Int)",
            "(assert (> a 1))",
            "(assert (> b 1))",
            "(assert (> c 1))",
            "(assert (= (+ (* a a a) (* b b b)) (* c c c)))",
        ] {
            solver.send(&parse(line).unwrap()).unwrap();
        }
        let (send, recv) = mpsc::channel();
        thread::spawn(move || {
            send.send(solver.check_sat()).unwrap();
        });
        thread::sleep(Duration::from_millis(100));
        pid.kill();
        match recv.recv().unwrap() {
            Ok(SatResp::Unknown(_)) | Err(SolverError::Killed) => {}
            r => panic!("check-sat should have been killed, got {r:?}"),
        }
    }

    #[test]
    fn test_kill_before_send() {
        let Some(mut solver) = z3() else { return };
        let pid = solver.pid();
        pid.kill();
        assert!(matches!(
            solver.declare_const("a", "Int"),
            Err(SolverError::Killed)
        ));
        assert!(matches!(solver.check_sat(), Err(SolverError::Killed)));
    }
}
