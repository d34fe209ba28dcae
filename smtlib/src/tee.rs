// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Record the SMT-LIB sent to a solver so a query can be replayed by hand.

use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
    io,
    path::{Path, PathBuf},
};

use crate::sexp::Sexp;

/// The commands sent to one solver process so far.
#[derive(Debug)]
pub struct Tee {
    dir: PathBuf,
    contents: Vec<Sexp>,
}

impl Tee {
    /// Start recording; files are saved under `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            contents: vec![],
        }
    }

    /// Record a command.
    pub fn append(&mut self, s: Sexp) {
        self.contents.push(s)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for s in &self.contents {
            match s {
                Sexp::Comment(c) if c.is_empty() => {}
                Sexp::Comment(c) => out.push_str(&format!(";; {c}")),
                _ => out.push_str(&s.to_string()),
            }
            out.push('\n');
        }
        out
    }

    /// Save everything recorded so far to `query-<hash>.smt2`, named by a
    /// hash of the contents, and return the path of the file.
    pub fn save(&self) -> io::Result<PathBuf> {
        let contents = self.render();
        let mut hasher = DefaultHasher::new();
        contents.hash(&mut hasher);
        let hash = format!("{:016x}", hasher.finish());
        fs::create_dir_all(&self.dir)?;
        let dest = self.dir.join(format!("query-{}.smt2", &hash[..8]));
        fs::write(&dest, contents)?;
        Ok(dest)
    }
}
