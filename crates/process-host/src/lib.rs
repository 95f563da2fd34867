use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A program to run, with its arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

/// Everything a child wrote to stdout, plus how it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub success: bool,
    pub code: Option<i32>,
}

/// Process capabilities needed to talk to delegated programs.
pub trait ProcessHost {
    /// Run to completion with stdin and stderr closed, collecting stdout.
    fn capture_stdout(&self, invocation: &Invocation) -> Result<Captured>;

    /// Hand control to the program.
    ///
    /// On Unix this replaces the current process image and only returns on
    /// failure. Elsewhere the child is waited for and its exit code returned.
    fn exec(&self, invocation: &Invocation) -> Result<i32>;
}

/// [`ProcessHost`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl ProcessHost for SystemHost {
    fn capture_stdout(&self, invocation: &Invocation) -> Result<Captured> {
        tracing::debug!(program = %invocation.program.display(), "capturing stdout");
        let output = invocation
            .command()
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .stdout(Stdio::piped())
            .output()
            .with_context(|| format!("failed to run {}", invocation.program.display()))?;
        Ok(Captured {
            stdout: output.stdout,
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    #[cfg(unix)]
    fn exec(&self, invocation: &Invocation) -> Result<i32> {
        use std::os::unix::process::CommandExt;

        tracing::debug!(program = %invocation.program.display(), "exec");
        let err = invocation.command().exec();
        Err(err).with_context(|| format!("failed to exec {}", invocation.program.display()))
    }

    #[cfg(not(unix))]
    fn exec(&self, invocation: &Invocation) -> Result<i32> {
        tracing::debug!(program = %invocation.program.display(), "spawning in place of exec");
        let status = invocation
            .command()
            .status()
            .with_context(|| format!("failed to run {}", invocation.program.display()))?;
        Ok(status.code().unwrap_or(1))
    }
}
