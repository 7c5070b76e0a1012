//! Step running an external tool.

use anyhow::Context;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{StepAction, StepScope};
use crate::context::BuildContext;
use crate::logger::{BuildLoggerLevel, BuildLoggerVerbosity};

/// Runs an application (or a shell command line when no application is
/// given) and forwards its output to the build log
#[derive(Debug, Clone)]
pub struct StepProcess {
    pub application: Option<PathBuf>,
    pub arguments: Vec<String>,
    pub expected_exit_code: i32,
    pub ignore_exit_code: bool,
    pub redirect_output: bool,
    pub redirect_error: bool,
    pub ignore_whitespace: bool,
    /// Leading output lines holding the tool's banner
    pub copyright_notice: usize,
    pub environment: Vec<(String, String)>,
    exit_code: Option<i32>,
}

impl Default for StepProcess {
    fn default() -> Self {
        Self {
            application: None,
            arguments: Vec::new(),
            expected_exit_code: 0,
            ignore_exit_code: false,
            redirect_output: true,
            redirect_error: true,
            ignore_whitespace: true,
            copyright_notice: 0,
            environment: Vec::new(),
            exit_code: None,
        }
    }
}

impl StepProcess {
    pub fn new(application: impl Into<PathBuf>) -> Self {
        Self {
            application: Some(application.into()),
            ..Default::default()
        }
    }

    /// Run `command_line` through the platform shell
    pub fn shell(command_line: impl Into<String>) -> Self {
        Self {
            arguments: vec![command_line.into()],
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn expect_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    pub fn ignore_exit_code(mut self) -> Self {
        self.ignore_exit_code = true;
        self
    }

    /// Exit code of the last run
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn command(&self, working_dir: &Path) -> Command {
        let mut command = match &self.application {
            Some(application) => {
                let mut command = Command::new(application);
                command.args(&self.arguments);
                command
            }
            None => {
                let (shell, shell_args) = shell();
                let mut command = Command::new(shell);
                command.args(shell_args).arg(self.arguments.join(" "));
                command
            }
        };
        if !working_dir.as_os_str().is_empty() {
            command.current_dir(working_dir);
        }
        for (key, value) in &self.environment {
            command.env(key, value);
        }
        command
    }

    fn write_output(&self, ctx: &mut BuildContext, output: &str, skip_banner: bool) {
        let mut banner = if skip_banner { self.copyright_notice } else { 0 };
        for line in output.lines() {
            if banner > 0 {
                banner -= 1;
                ctx.log(line, BuildLoggerLevel::Copyright);
                continue;
            }
            if self.ignore_whitespace && line.trim().is_empty() {
                continue;
            }
            ctx.log(line, BuildLoggerLevel::None);
        }
    }
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static [&'static str]) {
    ("/bin/sh", &["-c"])
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static [&'static str]) {
    ("cmd", &["/C"])
}

impl StepAction for StepProcess {
    fn kind(&self) -> &'static str {
        "StepProcess"
    }

    fn execute(&mut self, ctx: &mut BuildContext, scope: &StepScope<'_>) -> anyhow::Result<bool> {
        if self.application.is_none() && self.arguments.is_empty() {
            return Ok(false);
        }

        let mut command = self.command(scope.working_dir);
        debug!("Running {:?} in {}", command, scope.working_dir.display());
        let output = command.output().with_context(|| {
            let program = self
                .application
                .as_ref()
                .map(|a| a.display().to_string())
                .unwrap_or_else(|| "shell".to_string());
            format!("Failed to start {}", program)
        })?;

        // Quiet builds keep only the step titles and errors
        if scope.verbosity != BuildLoggerVerbosity::Quiet {
            if self.redirect_output {
                self.write_output(ctx, &String::from_utf8_lossy(&output.stdout), true);
            }
            if self.redirect_error {
                self.write_output(ctx, &String::from_utf8_lossy(&output.stderr), false);
            }
        }

        self.exit_code = output.status.code();
        debug!("Process exited with {:?}", self.exit_code);
        if self.ignore_exit_code {
            return Ok(true);
        }
        Ok(self.exit_code == Some(self.expected_exit_code))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::step::BuildStep;
    use crate::testing::test_context;
    use tempfile::TempDir;

    fn run(process: StepProcess, working_dir: &Path) -> (bool, crate::logger::BufferLogger) {
        let (mut ctx, log) = test_context();
        let mut step = BuildStep::new("Process", process).with_working_dir(working_dir);
        step.log_time_span = false;
        assert!(step.initialize(&mut ctx));
        let result = step.execute(&mut ctx).unwrap();
        (result, log)
    }

    #[test]
    fn test_shell_output_is_logged() {
        let temp_dir = TempDir::new().unwrap();
        let (ok, log) = run(
            StepProcess::shell("echo Banner; echo; echo compiled 3 topics"),
            temp_dir.path(),
        );
        assert!(ok);
        assert!(log.contains("compiled 3 topics"));
        assert!(log.lines().iter().all(|(_, line)| !line.is_empty()));
    }

    #[test]
    fn test_copyright_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let mut process = StepProcess::shell("echo Copyright 2008; echo working");
        process.copyright_notice = 1;
        let (ok, log) = run(process, temp_dir.path());
        assert!(ok);
        assert!(!log.contains("Copyright 2008"));
        assert!(log.contains("working"));
    }

    #[test]
    fn test_exit_code_policy() {
        let temp_dir = TempDir::new().unwrap();
        let (ok, _) = run(StepProcess::shell("exit 1"), temp_dir.path());
        assert!(!ok);

        // hhc.exe style tools report success with 1
        let (ok, _) = run(StepProcess::shell("exit 1").expect_exit_code(1), temp_dir.path());
        assert!(ok);

        let (ok, _) = run(StepProcess::shell("exit 3").ignore_exit_code(), temp_dir.path());
        assert!(ok);
    }

    #[test]
    fn test_runs_in_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("marker.txt"), "x").unwrap();
        let (ok, _) = run(StepProcess::shell("test -f marker.txt"), temp_dir.path());
        assert!(ok);
    }

    #[test]
    fn test_missing_application_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (ok, log) = run(
            StepProcess::new("/nonexistent/BuildAssembler.exe"),
            temp_dir.path(),
        );
        assert!(!ok);
        assert!(log.contains("Failed to start /nonexistent/BuildAssembler.exe"));

        let (ok, _) = run(StepProcess::default(), temp_dir.path());
        assert!(!ok);
    }
}
