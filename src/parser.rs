use lazy_static::lazy_static;
use log::debug;
use pest::Parser;
use pest_derive::Parser;
use regex::Regex;

use crate::{
    error::{ParseResult, SyntaxError},
    syntax::{BinOp, Command, Expr, Program},
};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct LineParser;

lazy_static! {
    // Operators must be surrounded by whitespace, so `<` never claims `x <= 1`.
    static ref OPERATOR_PATTERNS: Vec<(BinOp, Regex)> = BinOp::ALL
        .iter()
        .map(|&op| {
            let symbol = regex::escape(op.symbol());
            let pattern = format!(r"^(?P<lhs>.+)\s+{symbol}\s+(?P<rhs>.+)$");
            (op, Regex::new(&pattern).expect("operator pattern is a valid regex"))
        })
        .collect();
}

/// Turns `lhs OP rhs` into a prefix term. Operators are tried in the order of
/// [`BinOp::ALL`] and the first that matches wins; text with no operator comes
/// back as an atom.
pub fn translate(text: &str) -> Expr {
    let text = text.trim();
    OPERATOR_PATTERNS
        .iter()
        .find_map(|(op, pattern)| {
            pattern.captures(text).map(|caps| {
                Expr::binary(
                    *op,
                    Expr::atom(caps["lhs"].trim()),
                    Expr::atom(caps["rhs"].trim()),
                )
            })
        })
        .unwrap_or_else(|| Expr::atom(text))
}

enum Line {
    Command(Command),
    If(Expr),
    Else,
    Fi,
}

fn classify(text: &str) -> Option<Line> {
    let line = LineParser::parse(Rule::line, text).ok()?.next()?;
    let pair = line.into_inner().next()?;
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();
    let mut next = || inner.next().map(|p| p.as_str().to_owned());

    let line = match rule {
        Rule::new_cmd => Line::Command(Command::New(next()?, translate(&next()?))),
        Rule::mutate_cmd => Line::Command(Command::Mutate(next()?, translate(&next()?))),
        Rule::lookup_cmd => Line::Command(Command::Lookup(next()?, next()?)),
        Rule::free_cmd => Line::Command(Command::Free(next()?)),
        Rule::assign_cmd => Line::Command(Command::Assign(next()?, translate(&next()?))),
        Rule::if_cmd => Line::If(translate(&next()?)),
        Rule::else_kw => Line::Else,
        Rule::fi_kw => Line::Fi,
        _ => return None,
    };
    Some(line)
}

struct OpenConditional {
    line: usize,
    cond: Expr,
    then_branch: Vec<Command>,
    else_branch: Option<Vec<Command>>,
}

impl OpenConditional {
    fn close(self) -> Command {
        let else_branch = self.else_branch.unwrap_or_default();
        Command::IfThenElse(self.cond, self.then_branch, else_branch)
    }
}

fn append_target<'a>(
    top: &'a mut Vec<Command>,
    open: &'a mut Option<OpenConditional>,
) -> &'a mut Vec<Command> {
    match open {
        Some(OpenConditional {
            else_branch: Some(branch),
            ..
        }) => branch,
        Some(cond) => &mut cond.then_branch,
        None => top,
    }
}

/// Compiles program source, one command per line, into a command list.
///
/// Only one conditional may be open at a time; an `if` inside a branch is
/// rejected. A conditional closed without `else` gets an empty else branch.
pub fn compile(source: &str) -> ParseResult<Program> {
    let mut top = Vec::new();
    let mut open: Option<OpenConditional> = None;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }

        let classified = classify(text).ok_or_else(|| SyntaxError::UnrecognisedLine {
            line,
            text: text.to_owned(),
        })?;

        match classified {
            Line::Command(command) => {
                debug!("line {line}: {command}");
                append_target(&mut top, &mut open).push(command);
            }
            Line::If(cond) => {
                if open.is_some() {
                    return Err(SyntaxError::NestedConditional {
                        line,
                        text: text.to_owned(),
                    });
                }
                debug!("line {line}: opening conditional on {cond}");
                open = Some(OpenConditional {
                    line,
                    cond,
                    then_branch: Vec::new(),
                    else_branch: None,
                });
            }
            Line::Else => match open.as_mut() {
                None => return Err(SyntaxError::UnexpectedElse { line }),
                Some(cond) if cond.else_branch.is_some() => {
                    return Err(SyntaxError::DuplicateElse { line });
                }
                Some(cond) => cond.else_branch = Some(Vec::new()),
            },
            Line::Fi => {
                let cond = open.take().ok_or(SyntaxError::UnexpectedFi { line })?;
                top.push(cond.close());
            }
        }
    }

    match open {
        Some(cond) => Err(SyntaxError::UnterminatedConditional { line: cond.line }),
        None => Ok(Program(top)),
    }
}
