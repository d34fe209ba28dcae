// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! S-expressions as exchanged with an SMT-LIB2 solver.
//!
//! Comments are part of the grammar so that tee'd query files can be
//! annotated and so that solver responses containing comments still parse.

use peg::str::LineCol;
use serde::Serialize;
use std::fmt;

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Atom {
    I(u64),
    S(String),
}

/// An s-expression which also tracks comments.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Sexp {
    Atom(Atom),
    Comment(String),
    List(Vec<Sexp>),
}

/// Construct a symbol atom.
pub fn atom_s<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::S(s.as_ref().to_string()))
}

/// Construct a numeral atom.
pub fn atom_i(i: u64) -> Sexp {
    Sexp::Atom(Atom::I(i))
}

/// Construct an integer constant, using `(- n)` for negative values since
/// SMT-LIB numerals are unsigned.
pub fn int(i: i64) -> Sexp {
    if i < 0 {
        app("-", [atom_i(i.unsigned_abs())])
    } else {
        atom_i(i as u64)
    }
}

/// Construct an sexp list from an iterable.
pub fn sexp_l<I>(i: I) -> Sexp
where
    I: IntoIterator<Item = Sexp>,
{
    Sexp::List(i.into_iter().collect())
}

/// Construct an application `(head args..)`.
pub fn app<I>(head: &str, args: I) -> Sexp
where
    I: IntoIterator<Item = Sexp>,
{
    let mut ss = vec![atom_s(head)];
    ss.extend(args);
    Sexp::List(ss)
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::I(i) => write!(f, "{i}"),
            Atom::S(s) if s.contains([' ', '"', '\'', '(', ')']) => write!(f, "|{s}|"),
            Atom::S(s) => write!(f, "{s}"),
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(a) => write!(f, "{a}"),
            Sexp::Comment(c) => write!(f, ";{c}"),
            Sexp::List(ss) => {
                write!(f, "(")?;
                let mut prev_comment = false;
                for (i, s) in ss.iter().enumerate() {
                    let is_comment = matches!(s, Sexp::Comment(_));
                    if is_comment {
                        write!(f, "\n{s}\n")?;
                    } else {
                        if i > 0 && !prev_comment {
                            write!(f, " ")?;
                        }
                        write!(f, "{s}")?;
                    }
                    prev_comment = is_comment;
                }
                write!(f, ")")
            }
        }
    }
}

impl Sexp {
    /// The elements of a list.
    pub fn list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(ss) => Some(ss),
            _ => None,
        }
    }

    /// The symbol of a string atom.
    pub fn atom_s(&self) -> Option<&str> {
        match self {
            Sexp::Atom(Atom::S(s)) => Some(s),
            _ => None,
        }
    }

    /// Split `(head rest..)` into its parts.
    pub fn app(&self) -> Option<(&str, &[Sexp])> {
        let ss = self.list()?;
        let (head, rest) = ss.split_first()?;
        Some((head.atom_s()?, rest))
    }

    /// Read the sexp as a Boolean constant.
    pub fn bool_value(&self) -> Option<bool> {
        match self.atom_s()? {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    /// Read the sexp as an integer constant, accepting `(- n)`.
    pub fn int_value(&self) -> Option<i64> {
        match self {
            Sexp::Atom(Atom::I(i)) => i64::try_from(*i).ok(),
            _ => match self.app()? {
                ("-", [arg]) => arg.int_value().map(|i| -i),
                _ => None,
            },
        }
    }
}

peg::parser! {
grammar parser() for str {
  rule ident_start() = ['a'..='z' | 'A'..='Z' | '_' | '\'' | '<' | '>' | ':' | '=' | '$' | '@' | '+' | '-' | '*' | '/' | '~' | '^' | '&' | '?']
  rule ident_char() = ident_start() / ['0'..='9' | '!' | '#' | '%' | '.']
  rule ident() = quiet! { ident_start() ident_char()* } / expected!("symbol")

  rule _ = [' ' | '\t' | '\n' | '\r']*

  rule string_atom() -> Atom
  = "\"" s:$([^'"']*) "\"" { Atom::S(s.to_string()) }

  rule quoted_symbol() -> Atom
  = "|" s:$([^'|']*) "|" { Atom::S(s.to_string()) }

  rule symbol() -> Atom
  = s:$(ident()) { Atom::S(s.to_string()) }

  rule numeral() -> Atom
  = i:$(['0'..='9']+) {? i.parse().map(Atom::I).or(Err("numeral")) }

  rule atom() -> Sexp
  = a:(string_atom() / quoted_symbol() / symbol() / numeral()) { Sexp::Atom(a) }

  rule comment() -> Sexp
  = ";" s:$([^'\n']*) "\n" { Sexp::Comment(s.to_string()) }

  rule list() -> Sexp
  = "(" _ ss:(sexp() ** _) _ ")" { Sexp::List(ss) }

  rule sexp() -> Sexp
  = atom() / comment() / list()

  pub(super) rule one() -> Sexp
  = _ s:sexp() _ { s }

  pub(super) rule many() -> Vec<Sexp>
  = _ ss:(sexp() ** _) _ { ss }
}
}

/// Parse a single sexp, allowing surrounding whitespace.
pub fn parse(s: &str) -> Result<Sexp, peg::error::ParseError<LineCol>> {
    parser::one(s)
}

/// Parse a whitespace-separated sequence of sexps.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, peg::error::ParseError<LineCol>> {
    parser::many(s)
}

#[cfg(test)]
mod tests {
    use super::{app, atom_i, atom_s, int, parse, parse_many, sexp_l};

    #[test]
    fn test_parsing() {
        assert_eq!(
            parse("(assert  (<= x@0 (+ y@1 3)))"),
            Ok(app(
                "assert",
                [app(
                    "<=",
                    [atom_s("x@0"), app("+", [atom_s("y@1"), atom_i(3)])]
                )]
            ))
        );
        assert_eq!(parse("()"), Ok(sexp_l([])));
    }

    #[test]
    fn test_values() {
        let vals = parse("((x@0 (- 7)) (y@2 12) (b true))").unwrap();
        let pairs = vals.list().unwrap();
        assert_eq!(pairs[0].list().unwrap()[1].int_value(), Some(-7));
        assert_eq!(pairs[1].list().unwrap()[1].int_value(), Some(12));
        assert_eq!(pairs[2].list().unwrap()[1].bool_value(), Some(true));
        assert_eq!(int(-7), parse("(- 7)").unwrap());
        assert_eq!(int(4), atom_i(4));
    }

    #[test]
    fn test_printing() {
        let e = parse(
            r#"(check (pair
            ; model comment
            (x 1)))
            "#,
        )
        .unwrap();
        insta::assert_snapshot!(e, @r###"
        (check (pair
        ; model comment
        (x 1)))
        "###);
    }

    #[test]
    fn test_unusual_symbols() {
        let printed: Vec<String> = parse_many(
            r#"(p Loc!val!0) (q mid@3) <<DONE>> (:reason-unknown "timeout") |two words|"#,
        )
        .unwrap()
        .iter()
        .map(|s| s.to_string())
        .collect();
        insta::assert_snapshot!(printed.join("\n"), @r###"
        (p Loc!val!0)
        (q mid@3)
        <<DONE>>
        (:reason-unknown timeout)
        |two words|
        "###);
    }
}
