use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;
pub type ParseResult<T> = std::result::Result<T, SyntaxError>;
pub type DecodeResult<T> = std::result::Result<T, TraceFormatError>;
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Program or postcondition text that matches no recognised shape.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SyntaxError {
    #[error("line {line}: unrecognised command `{text}`")]
    UnrecognisedLine { line: usize, text: String },

    #[error("line {line}: conditionals cannot be nested (`{text}`)")]
    NestedConditional { line: usize, text: String },

    #[error("line {line}: `else` without an open `if`")]
    UnexpectedElse { line: usize },

    #[error("line {line}: second `else` for the same `if`")]
    DuplicateElse { line: usize },

    #[error("line {line}: `fi` without an open `if`")]
    UnexpectedFi { line: usize },

    #[error("line {line}: `if` is never closed by `fi`")]
    UnterminatedConditional { line: usize },

    #[error("incorrect assertion syntax `{0}`")]
    MalformedClause(String),

    #[error("postcondition `{0}` has no `@` between its two halves")]
    MissingSeparator(String),
}

/// Engine output that breaks the fixed record grammar.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TraceFormatError {
    #[error("no record marker `{sentinel}` found in the trace")]
    MissingSentinel { sentinel: &'static str },

    #[error("line {line}: unknown record tag `{tag}`")]
    UnknownTag { line: usize, tag: String },

    #[error("line {line}: `{tag}` needs {expected} lines, {available} remain")]
    TruncatedRecord {
        line: usize,
        tag: &'static str,
        expected: usize,
        available: usize,
    },

    #[error("line {line}: malformed heap/store mapping `{text}`")]
    MalformedMapping { line: usize, text: String },

    #[error("line {line}: `{text}` is neither a record nor the final state")]
    UnexpectedLine { line: usize, text: String },

    #[error("the trace ends without the final store and heap lines")]
    MissingFinalState,
}

/// Failures talking to an external engine process.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("could not start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("`{command}` was killed by a signal")]
    Killed { command: String },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` produced no output")]
    EmptyOutput { command: String },

    #[error("lost contact with `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    TraceFormat(#[from] TraceFormatError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialise stages: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The pipeline step an error surfaced in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Configure,
    Compile,
    Execute,
    Decode,
    Verify,
    Render,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Configure => "configure",
            Phase::Compile => "compile",
            Phase::Execute => "execute",
            Phase::Decode => "decode",
            Phase::Verify => "verify",
            Phase::Render => "render",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{phase} failed: {source}")]
pub struct PipelineError {
    pub phase: Phase,
    #[source]
    pub source: Error,
}

/// Tags a failure with the phase it happened in.
pub trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> std::result::Result<T, PipelineError>;
}

impl<T, E: Into<Error>> InPhase<T> for std::result::Result<T, E> {
    fn in_phase(self, phase: Phase) -> std::result::Result<T, PipelineError> {
        self.map_err(|e| PipelineError {
            phase,
            source: e.into(),
        })
    }
}
