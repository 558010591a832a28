use std::fmt;

use pest::Parser;

use crate::{
    error::{ParseResult, SyntaxError},
    parser::{LineParser, Rule},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// `var |-> num`
    PointsTo(String, String),
    /// `var = num`
    Equals(String, String),
}

/// `AND_ASSERT @ STAR_ASSERT`: facts joined by `&`, then facts joined by `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Postcondition {
    pub and_list: Vec<Assertion>,
    pub star_list: Vec<Assertion>,
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::PointsTo(var, num) => write!(f, "points_to({var}, {num})"),
            Assertion::Equals(var, num) => write!(f, "equals({var}, {num})"),
        }
    }
}

fn parse_clause(text: &str) -> ParseResult<Assertion> {
    let malformed = || SyntaxError::MalformedClause(text.to_owned());
    let clause = LineParser::parse(Rule::clause, text)
        .map_err(|_| malformed())?
        .next()
        .and_then(|clause| clause.into_inner().next())
        .ok_or_else(malformed)?;

    let rule = clause.as_rule();
    let mut inner = clause.into_inner().map(|p| p.as_str().to_owned());
    let (var, num) = inner.next().zip(inner.next()).ok_or_else(malformed)?;
    match rule {
        Rule::points_to => Ok(Assertion::PointsTo(var, num)),
        Rule::equals => Ok(Assertion::Equals(var, num)),
        _ => Err(malformed()),
    }
}

fn parse_half(half: &str, separator: char) -> ParseResult<Vec<Assertion>> {
    half.split(separator)
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(parse_clause)
        .collect()
}

/// Parses a postcondition from the first line of `text`; later lines are
/// ignored. Either half may be empty.
pub fn parse(text: &str) -> ParseResult<Postcondition> {
    let line = text.lines().next().unwrap_or_default().trim();
    let (ands, stars) = line
        .split_once('@')
        .ok_or_else(|| SyntaxError::MissingSeparator(line.to_owned()))?;
    Ok(Postcondition {
        and_list: parse_half(ands, '&')?,
        star_list: parse_half(stars, '*')?,
    })
}

fn term_list(assertions: &[Assertion]) -> String {
    let terms = assertions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    format!("[{}]", terms.join(", "))
}

impl Postcondition {
    /// `[points_to(x, 1), ...]` for the conjunctive half.
    pub fn and_terms(&self) -> String {
        term_list(&self.and_list)
    }

    pub fn star_terms(&self) -> String {
        term_list(&self.star_list)
    }

    /// Inline maths for a slide, e.g. `$pointsto(x, 1) \& equals(y, 2) | pointsto(z, 3)$`.
    pub fn to_latex(&self) -> String {
        let render = |list: &[Assertion], joiner: &str| {
            list.iter()
                .map(|a| a.to_string().replace('_', ""))
                .collect::<Vec<_>>()
                .join(joiner)
        };
        format!(
            "${} | {}$",
            render(&self.and_list, " \\& "),
            render(&self.star_list, " * ")
        )
    }
}
