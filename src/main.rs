use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use log::info;

use heaptrace::{
    document,
    error::{Error, InPhase, Phase, PipelineError},
    oracle::{InitialState, PrologOracle, Replay},
    parser, run_pipeline,
    settings::Settings,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Beamer slides written to the output file
    Tex,
    /// Decoded stages as JSON on stdout
    Json,
    /// The compiled program only; the executor is not run
    Program,
}

#[derive(Parser)]
#[command(name = "heaptrace")]
#[command(about = "Runs a heap program symbolically and draws each step")]
struct Args {
    /// Program source, one command per line
    program: PathBuf,

    /// Postcondition to verify against the final state
    #[arg(short, long)]
    postcondition: Option<PathBuf>,

    /// Where to write the slides (overrides the `output` setting)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "tex")]
    emit: Emit,

    /// Decode a previously captured trace instead of running the executor
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

fn run(args: &Args) -> Result<(), PipelineError> {
    let settings = Settings::load(args.config.as_deref()).in_phase(Phase::Configure)?;
    let source = read(&args.program).in_phase(Phase::Compile)?;

    if args.emit == Emit::Program {
        let program = parser::compile(&source).in_phase(Phase::Compile)?;
        println!("{program}");
        return Ok(());
    }

    let postcondition_text = args
        .postcondition
        .as_deref()
        .map(read)
        .transpose()
        .in_phase(Phase::Compile)?;
    // Only the first line of a postcondition file is read as the assertion.
    let postcondition = postcondition_text.as_deref();
    let initial = InitialState {
        address_counter: settings.initial_address_counter,
        ..InitialState::default()
    };
    let prolog = PrologOracle::from_settings(&settings);

    let session = match &args.trace {
        Some(path) => {
            let replay = Replay(read(path).in_phase(Phase::Execute)?);
            run_pipeline(&source, postcondition, &initial, &replay, &prolog)?
        }
        None => run_pipeline(&source, postcondition, &initial, &prolog, &prolog)?,
    };

    if args.emit == Emit::Json {
        let json = serde_json::to_string_pretty(&session.trace.stages)
            .in_phase(Phase::Render)?;
        println!("{json}");
        info!("emitted {} stages as JSON", session.trace.stages.len());
        Ok(())
    } else {
        document::render(&settings, args.output.as_deref(), &session)?;
        Ok(())
    }
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().filter_or("HEAPTRACE_LOG", "info"));
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
