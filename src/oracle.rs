//! The external engines: a symbolic executor that turns a compiled program
//! into a trace, and a verifier that judges a postcondition against the final
//! state. Both are Prolog programs driven through `gprolog`.

use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, trace};

use crate::{
    assertion::Postcondition,
    error::{OracleError, OracleResult},
    settings::Settings,
    syntax::Program,
    trace::HeapStoreMapping,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State the executor starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    /// Last address handed out; the engine allocates from the next one.
    pub address_counter: i64,
    pub heap: HeapStoreMapping,
    pub store: HeapStoreMapping,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            address_counter: -1,
            heap: HeapStoreMapping::new(),
            store: HeapStoreMapping::new(),
        }
    }
}

pub trait ExecutionOracle {
    /// Runs `program` from `initial` and returns the raw trace text.
    fn execute(&self, program: &Program, initial: &InitialState) -> OracleResult<String>;
}

pub trait VerificationOracle {
    /// Checks `postcondition` against a final state. The verdict is the last
    /// line of the returned text, see [`verdict`].
    fn verify(
        &self,
        postcondition: &Postcondition,
        store: &HeapStoreMapping,
        heap: &HeapStoreMapping,
    ) -> OracleResult<String>;
}

/// Last non-blank line of a verifier's output.
pub fn verdict(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrologOracle {
    pub command: String,
    pub consult_file: String,
    pub execute_goal: String,
    pub verify_goal: String,
    pub timeout: Duration,
}

impl PrologOracle {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            command: settings.oracle_command.clone(),
            consult_file: settings.consult_file.clone(),
            execute_goal: settings.execute_goal.clone(),
            verify_goal: settings.verify_goal.clone(),
            timeout: settings.oracle_timeout(),
        }
    }

    pub fn execute_query(&self, program: &Program, initial: &InitialState) -> String {
        format!(
            "{}(({}, {}, {}, {}),X)",
            self.execute_goal, program, initial.address_counter, initial.heap, initial.store
        )
    }

    pub fn verify_query(
        &self,
        postcondition: &Postcondition,
        store: &HeapStoreMapping,
        heap: &HeapStoreMapping,
    ) -> String {
        format!(
            "{}(({}, {}, {}, {}),X)",
            self.verify_goal,
            postcondition.and_terms(),
            postcondition.star_terms(),
            store,
            heap
        )
    }

    fn run_query(&self, query: &str) -> OracleResult<String> {
        let goal = format!("{query}, halt");
        let output = run(
            &self.command,
            &["--consult-file", self.consult_file.as_str(), "--query-goal", goal.as_str()],
            self.timeout,
        )?;
        if output.trim().is_empty() {
            return Err(OracleError::EmptyOutput {
                command: self.command.clone(),
            });
        }
        Ok(output)
    }
}

impl ExecutionOracle for PrologOracle {
    fn execute(&self, program: &Program, initial: &InitialState) -> OracleResult<String> {
        let query = self.execute_query(program, initial);
        info!("executing {} commands symbolically", program.len());
        self.run_query(&query)
    }
}

impl VerificationOracle for PrologOracle {
    fn verify(
        &self,
        postcondition: &Postcondition,
        store: &HeapStoreMapping,
        heap: &HeapStoreMapping,
    ) -> OracleResult<String> {
        let query = self.verify_query(postcondition, store, heap);
        info!("verifying postcondition");
        self.run_query(&query)
    }
}

/// Plays back a captured trace in place of the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay(pub String);

impl ExecutionOracle for Replay {
    fn execute(&self, program: &Program, _initial: &InitialState) -> OracleResult<String> {
        debug!("replaying a captured trace for {} commands", program.len());
        Ok(self.0.clone())
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain(mut source: impl Read + Send + 'static) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

/// Runs `command` to completion and returns its standard output.
///
/// The child is killed once `timeout` elapses. A non-zero exit counts as
/// failure.
pub fn run(command: &str, args: &[&str], timeout: Duration) -> OracleResult<String> {
    debug!("spawning {command} {args:?}");
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| OracleError::Spawn {
            command: command.to_owned(),
            source,
        })?;

    // Pipes are drained on the side so a chatty child cannot block on a full buffer.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    // A timeout too large to represent as an instant means no deadline at all.
    let deadline = Instant::now().checked_add(timeout);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                reap(&mut child);
                return Err(OracleError::Wait {
                    command: command.to_owned(),
                    source,
                });
            }
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            reap(&mut child);
            return Err(OracleError::Timeout {
                command: command.to_owned(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let collect = |handle: Option<thread::JoinHandle<String>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    let stdout = collect(stdout);
    let stderr = collect(stderr);
    trace!("{command} wrote:\n{stdout}");

    match status.code() {
        Some(0) => {}
        Some(code) => {
            return Err(OracleError::NonZeroExit {
                command: command.to_owned(),
                status: code,
                stderr: stderr.trim().to_owned(),
            });
        }
        None => {
            return Err(OracleError::Killed {
                command: command.to_owned(),
            });
        }
    }
    Ok(stdout)
}
