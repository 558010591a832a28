use std::fmt;

use serde::Serialize;

pub type Ident = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinOp {
    Plus,
    Mult,
    Minus,
    And,
    Or,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    /// Every operator, in the order the translator tries them.
    pub const ALL: [BinOp; 11] = [
        BinOp::Plus,
        BinOp::Mult,
        BinOp::Minus,
        BinOp::And,
        BinOp::Or,
        BinOp::Lt,
        BinOp::Gt,
        BinOp::Le,
        BinOp::Ge,
        BinOp::Eq,
        BinOp::Ne,
    ];

    /// Infix spelling in program source.
    pub const fn symbol(self) -> &'static str {
        match self {
            BinOp::Plus => "+",
            BinOp::Mult => "*",
            BinOp::Minus => "-",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
        }
    }

    /// Functor name in the compiled term.
    pub const fn functor(self) -> &'static str {
        match self {
            BinOp::Plus => "plus",
            BinOp::Mult => "mult",
            BinOp::Minus => "minus",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::Le => "le",
            BinOp::Ge => "ge",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Expr {
    /// Variable or numeral, passed through untouched.
    Atom(String),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn atom(text: impl Into<String>) -> Self {
        Expr::Atom(text.into())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinOp(op, Box::new(lhs), Box::new(rhs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Command {
    Assign(Ident, Expr),
    New(Ident, Expr),
    Mutate(Ident, Expr),
    Lookup(Ident, Ident),
    Free(Ident),
    IfThenElse(Expr, Vec<Command>, Vec<Command>),
}

/// A compiled top-level command list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program(pub Vec<Command>);

impl Program {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// The Display impls below produce the term syntax the symbolic executor consults.

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Atom(text) => f.write_str(text),
            Expr::BinOp(op, lhs, rhs) => write!(f, "{}({}, {})", op.functor(), lhs, rhs),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Assign(var, exp) => write!(f, "assign({var}, {exp})"),
            Command::New(var, exp) => write!(f, "new({var}, {exp})"),
            Command::Mutate(var, exp) => write!(f, "mutate({var}, {exp})"),
            Command::Lookup(dst, src) => write!(f, "lookup({dst}, {src})"),
            Command::Free(var) => write!(f, "deallocate({var})"),
            Command::IfThenElse(cond, then_branch, else_branch) => {
                write!(f, "ifthenelse({cond}, ")?;
                write_list(f, then_branch)?;
                f.write_str(", ")?;
                write_list(f, else_branch)?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, &self.0)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, commands: &[Command]) -> fmt::Result {
    f.write_str("[")?;
    for (i, command) in commands.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{command}")?;
    }
    f.write_str("]")
}
