use std::{env, path::Path, time::Duration};

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Runtime settings, layered from (lowest to highest priority) built-in
/// defaults, `Heaptrace.toml`, the file named by `HEAPTRACE_CONFIG` or passed
/// explicitly, and `HEAPTRACE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Prolog binary that runs the symbolic executor and the verifier.
    pub oracle_command: String,
    pub consult_file: String,
    pub execute_goal: String,
    pub verify_goal: String,
    pub initial_address_counter: i64,
    pub oracle_timeout_ms: u64,
    pub preamble: String,
    pub output: String,
    /// Typesetting command run on the written document; empty to skip.
    pub renderer: String,
}

fn default_layer() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("oracle_command", "gprolog")?
        .set_default("consult_file", "symbex.pl")?
        .set_default("execute_goal", "execute_top")?
        .set_default("verify_goal", "verify_top")?
        .set_default("initial_address_counter", -1_i64)?
        .set_default("oracle_timeout_ms", 30_000_i64)?
        .set_default("preamble", "preamble.tex")?
        .set_default("output", "trace.tex")?
        .set_default("renderer", "")?;
    Ok(builder)
}

impl Settings {
    /// The built-in defaults alone, ignoring every file and the environment.
    pub fn defaults() -> Result<Self> {
        Ok(default_layer()?.build()?.try_deserialize()?)
    }

    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder =
            default_layer()?.add_source(File::with_name("Heaptrace").required(false));
        if let Ok(path) = env::var("HEAPTRACE_CONFIG") {
            if !path.is_empty() {
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix("HEAPTRACE").ignore_empty(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}
