//! Beamer slides: one frame per stage, plus a frame for the verdict when a
//! postcondition was checked.

use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    assertion::Postcondition,
    diagram,
    error::{Error, InPhase, Phase, PipelineError},
    oracle,
    settings::Settings,
    trace::Stage,
    Session,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub postcondition: Postcondition,
    pub text: String,
}

fn stage_frame(out: &mut String, stage: &Stage) {
    out.push_str("\\begin{frame}\n\n");
    let before = diagram::build(&stage.initial_heap, &stage.initial_store);
    out.push_str(&before.to_tikz());
    let _ = writeln!(out, "\nCurrent command: \\il{{{}}}", stage.description);
    out.push_str("\\vspace{1cm}\n\n");
    let after = diagram::build(&stage.final_heap, &stage.final_store);
    out.push_str(&after.to_tikz());
    out.push_str("\\end{frame}\n");
}

fn verdict_frame(out: &mut String, verdict: &Verdict) {
    out.push_str("\\begin{frame}\n\n");
    let _ = writeln!(out, "Postcondition: {}\n", verdict.postcondition.to_latex());
    let _ = writeln!(out, "Verdict: \\il{{{}}}", verdict.text);
    out.push_str("\\end{frame}\n");
}

/// Appends the frames to `preamble` and closes the document.
pub fn assemble(preamble: &str, stages: &[Stage], verdict: Option<&Verdict>) -> String {
    let mut out = String::from(preamble);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("\\begin{document}\n");
    for stage in stages {
        stage_frame(&mut out, stage);
    }
    if let Some(verdict) = verdict {
        verdict_frame(&mut out, verdict);
    }
    out.push_str("\\end{document}");
    out
}

/// Writes the slides for `session` after the configured preamble, then runs
/// the configured renderer on the file. Returns the path written.
pub fn render(
    settings: &Settings,
    output: Option<&Path>,
    session: &Session,
) -> Result<PathBuf, PipelineError> {
    let preamble_path = Path::new(&settings.preamble);
    let preamble = fs::read_to_string(preamble_path)
        .map_err(|e| Error::io(preamble_path, e))
        .in_phase(Phase::Render)?;
    let document = assemble(&preamble, &session.trace.stages, session.verdict.as_ref());

    let output = output.map_or_else(|| PathBuf::from(&settings.output), Path::to_path_buf);
    fs::write(&output, document)
        .map_err(|e| Error::io(&output, e))
        .in_phase(Phase::Render)?;
    info!("wrote {}", output.display());

    let mut renderer = settings.renderer.split_whitespace();
    if let Some(command) = renderer.next() {
        let target = output.to_string_lossy().into_owned();
        let mut args = renderer.collect::<Vec<_>>();
        args.push(&target);
        oracle::run(command, &args, settings.oracle_timeout()).in_phase(Phase::Render)?;
        info!("typeset {} with {command}", output.display());
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assertion, parser, trace};

    const TRACE: &str = "M@assign\nx\n1\n[]\n[]\n[(x, 1)]\n[]\n\
                         M@new\ny\n2\n[(x, 1)]\n[]\n[(x, 1), (y, 0)]\n[(0, 2)]\n";

    const PREAMBLE: &str = "\\documentclass{beamer}";
    const HEAD: &str = "\\documentclass{beamer}\n\\begin{document}\n";

    fn scratch_dir(name: &str) -> PathBuf {
        let unique = format!("heaptrace-{name}-{}", std::process::id());
        let dir = std::env::temp_dir().join(unique);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(dir: &Path, renderer: &str) -> Settings {
        Settings {
            preamble: dir.join("preamble.tex").to_string_lossy().into_owned(),
            output: dir.join("trace.tex").to_string_lossy().into_owned(),
            renderer: renderer.into(),
            ..Settings::defaults().unwrap()
        }
    }

    fn session() -> Session {
        Session {
            program: parser::compile("x := 1\ny := new(2)").unwrap(),
            trace: trace::decode_trace(TRACE).unwrap(),
            verdict: None,
        }
    }

    #[test]
    fn test_frame_per_stage() {
        let stages = trace::decode(TRACE).unwrap();
        let doc = assemble(PREAMBLE, &stages, None);

        assert!(doc.starts_with(HEAD));
        assert!(doc.ends_with("\\end{document}"));
        assert_eq!(doc.matches("\\begin{frame}").count(), 2);
        assert_eq!(doc.matches("\\begin{tikzpicture}").count(), 4);
        assert!(doc.contains("Current command: \\il{x := 1}"));
        assert!(doc.contains("Current command: \\il{y := new(2)}"));
        assert!(doc.contains("\\path (y) edge node {} (0);"));
    }

    #[test]
    fn test_verdict_frame() {
        let verdict = Verdict {
            postcondition: assertion::parse("x = 1 @ y |-> 2").unwrap(),
            text: "true".into(),
        };
        let doc = assemble("", &[], Some(&verdict));
        assert_eq!(
            doc,
            "\\begin{document}\n\\begin{frame}\n\n\
             Postcondition: $equals(x, 1) | pointsto(y, 2)$\n\n\
             Verdict: \\il{true}\n\\end{frame}\n\\end{document}"
        );
    }

    #[test]
    fn test_render_writes_slides() {
        let dir = scratch_dir("render");
        fs::write(dir.join("preamble.tex"), PREAMBLE).unwrap();

        let written = render(&settings(&dir, ""), None, &session()).unwrap();
        assert_eq!(written, dir.join("trace.tex"));
        let doc = fs::read_to_string(&written).unwrap();
        assert!(doc.starts_with(HEAD));
        assert_eq!(doc.matches("\\begin{frame}").count(), 2);

        let explicit = dir.join("explicit.tex");
        let written = render(&settings(&dir, ""), Some(&explicit), &session()).unwrap();
        assert_eq!(written, explicit);
        assert!(explicit.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_render_runs_renderer_on_output() {
        let dir = scratch_dir("renderer");
        fs::write(dir.join("preamble.tex"), "").unwrap();

        let marker = dir.join("typeset.log");
        let renderer = format!("touch {}", marker.display());
        render(&settings(&dir, &renderer), None, &session()).unwrap();
        assert!(marker.exists());

        let err = render(&settings(&dir, "false"), None, &session()).unwrap_err();
        assert_eq!(err.phase, Phase::Render);
        assert!(matches!(err.source, Error::Oracle(_)));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_render_missing_preamble() {
        let dir = scratch_dir("preamble");
        let err = render(&settings(&dir, ""), None, &session()).unwrap_err();
        assert_eq!(err.phase, Phase::Render);
        assert!(matches!(err.source, Error::Io { .. }));
        fs::remove_dir_all(&dir).unwrap();
    }
}
