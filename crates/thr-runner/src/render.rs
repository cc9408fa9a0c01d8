use crate::absolutize;
use crate::staging::StagedFile;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub const PATH_PARAM: &str = "path";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub spec: String,
    pub params: BTreeMap<String, String>,
}

impl RenderRequest {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn for_staged(spec: impl Into<String>, staged: &StagedFile) -> Self {
        Self::new(spec).param(PATH_PARAM, quote_string(&staged.path.to_string_lossy()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    pub exit_code: Option<i32>,
}

impl RenderOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// `render` returns only after the render has finished.
pub trait Renderer {
    fn render(&mut self, request: &RenderRequest) -> Result<RenderOutcome>;
}

#[derive(Debug, Clone)]
pub struct GnuplotRenderer {
    pub program: String,
    pub scripts_dir: PathBuf,
    pub workdir: Option<PathBuf>,
}

impl GnuplotRenderer {
    pub fn new(program: impl Into<String>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scripts_dir: scripts_dir.into(),
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn script_path(&self, spec: &str) -> PathBuf {
        let script = self.scripts_dir.join(format!("{}.gp", spec));
        absolutize(&script)
    }

    pub fn command(&self, request: &RenderRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        let assignments = params_to_gnuplot(&request.params);
        if !assignments.is_empty() {
            cmd.arg("-e").arg(assignments);
        }
        cmd.arg(self.script_path(&request.spec));
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

impl Renderer for GnuplotRenderer {
    fn render(&mut self, request: &RenderRequest) -> Result<RenderOutcome> {
        let mut cmd = self.command(request);
        debug!(program = %self.program, spec = %request.spec, "invoking renderer");
        let status = cmd
            .status()
            .map_err(|e| anyhow!("failed to run renderer '{}': {}", self.program, e))?;
        let outcome = RenderOutcome {
            exit_code: status.code(),
        };
        if !outcome.succeeded() {
            warn!(
                spec = %request.spec,
                exit_code = ?outcome.exit_code,
                "renderer exited unsuccessfully"
            );
        }
        Ok(outcome)
    }
}

fn params_to_gnuplot(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

fn quote_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;
    use std::path::Path;

    #[cfg(unix)]
    fn write_stub(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(dir).expect("stub dir");
        let stub = dir.join("stub-renderer");
        fs::write(&stub, format!("#!/bin/sh\n{}\n", body)).expect("write stub");
        fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).expect("chmod stub");
        stub
    }

    #[test]
    fn for_staged_binds_quoted_path() {
        let staged = StagedFile {
            index: 3,
            path: PathBuf::from("/tmp/thr_stage_1_2/tmp3"),
        };
        let req = RenderRequest::for_staged("inter_throughput", &staged);
        assert_eq!(req.spec, "inter_throughput");
        assert_eq!(req.params.len(), 1);
        assert_eq!(req.params[PATH_PARAM], "\"/tmp/thr_stage_1_2/tmp3\"");
    }

    #[test]
    fn quote_string_escapes_embedded_quotes() {
        assert_eq!(quote_string(r#"/a "b"/c"#), r#""/a \"b\"/c""#);
        assert_eq!(quote_string(r"C:\x"), r#""C:\\x""#);
    }

    #[test]
    fn gnuplot_command_passes_params_then_script() {
        let renderer =
            GnuplotRenderer::new("gnuplot", "/opt/scripts").with_workdir("/tmp/graphs");
        let req = RenderRequest::new("inter_throughput")
            .param("path", "\"/tmp/x/tmp0\"")
            .param("title", "\"t\"");
        let cmd = renderer.command(&req);
        assert_eq!(cmd.get_program(), "gnuplot");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-e".to_string(),
                "path=\"/tmp/x/tmp0\"; title=\"t\"".to_string(),
                "/opt/scripts/inter_throughput.gp".to_string(),
            ]
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/tmp/graphs")));
    }

    #[test]
    fn relative_scripts_dir_is_resolved_against_cwd() {
        let renderer = GnuplotRenderer::new("gnuplot", "scripts");
        let script = renderer.script_path("inter_throughput");
        assert!(script.is_absolute());
        assert!(script.ends_with("scripts/inter_throughput.gp"));
    }

    #[test]
    fn missing_renderer_program_is_an_error() {
        let mut renderer = GnuplotRenderer::new("thr-definitely-not-installed", "/nonexistent");
        let err = renderer
            .render(&RenderRequest::new("inter_throughput"))
            .expect_err("spawn must fail");
        assert!(err.to_string().contains("thr-definitely-not-installed"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let dir = std::env::temp_dir().join(format!(
            "thr_render_exit_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        let marker = dir.join("finished");
        let stub = write_stub(
            &dir,
            &format!("sleep 1\ntouch '{}'\nexit 3", marker.display()),
        );
        let mut renderer = GnuplotRenderer::new(stub.to_string_lossy(), &dir);
        let outcome = renderer
            .render(&RenderRequest::new("inter_throughput"))
            .expect("non-zero exit is not an error");
        assert_eq!(outcome, RenderOutcome { exit_code: Some(3) });
        assert!(!outcome.succeeded());
        assert!(marker.exists(), "render returned before the renderer finished");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn outcome_success_requires_zero_exit() {
        assert!(RenderOutcome { exit_code: Some(0) }.succeeded());
        assert!(!RenderOutcome { exit_code: Some(1) }.succeeded());
        assert!(!RenderOutcome { exit_code: None }.succeeded());
    }
}
