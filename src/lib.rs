use log::info;
use wasm_bindgen::prelude::*;

use crate::{
    document::Verdict,
    error::{InPhase, OracleError, Phase, PipelineError, TraceFormatError},
    oracle::{ExecutionOracle, InitialState, VerificationOracle},
    syntax::Program,
    trace::Trace,
};

pub mod assertion;
pub mod diagram;
pub mod document;
pub mod error;
pub mod oracle;
pub mod parser;
pub mod settings;
pub mod syntax;
pub mod trace;

/// Everything one run through the engines produced.
#[derive(Debug, Clone)]
pub struct Session {
    pub program: Program,
    pub trace: Trace,
    pub verdict: Option<Verdict>,
}

/// Compiles `source`, runs it through `executor`, decodes the trace and, when
/// a postcondition is given, asks `verifier` to judge the final state.
pub fn run_pipeline(
    source: &str,
    postcondition: Option<&str>,
    initial: &InitialState,
    executor: &impl ExecutionOracle,
    verifier: &impl VerificationOracle,
) -> Result<Session, PipelineError> {
    let program = parser::compile(source).in_phase(Phase::Compile)?;
    let postcondition = postcondition
        .map(assertion::parse)
        .transpose()
        .in_phase(Phase::Compile)?;
    info!("compiled {} top-level commands", program.len());

    let output = executor.execute(&program, initial).in_phase(Phase::Execute)?;
    let trace = trace::decode_trace(&output).in_phase(Phase::Decode)?;
    info!("decoded {} stages", trace.stages.len());

    let verdict = match postcondition {
        None => None,
        Some(postcondition) => {
            let state = trace
                .final_state
                .as_ref()
                .ok_or(TraceFormatError::MissingFinalState)
                .in_phase(Phase::Decode)?;
            let output = verifier
                .verify(&postcondition, &state.store, &state.heap)
                .in_phase(Phase::Verify)?;
            let text = oracle::verdict(&output)
                .ok_or(OracleError::EmptyOutput {
                    command: "verifier".into(),
                })
                .in_phase(Phase::Verify)?
                .to_owned();
            info!("verdict: {text}");
            Some(Verdict {
                postcondition,
                text,
            })
        }
    };

    Ok(Session {
        program,
        trace,
        verdict,
    })
}

#[wasm_bindgen]
pub fn compile_str(source: &str) -> String {
    match parser::compile(source) {
        Ok(program) => program.to_string(),
        Err(e) => format!("error: {e}"),
    }
}

/// Decodes a trace into JSON stages for a browser front end.
#[wasm_bindgen]
pub fn decode_str(trace_text: &str) -> String {
    match trace::decode(trace_text) {
        Ok(stages) => serde_json::to_string(&stages).unwrap_or_else(|e| format!("error: {e}")),
        Err(e) => format!("error: {e}"),
    }
}
