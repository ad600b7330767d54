//! External command invocation.
//!
//! Every probe and the tmux controller talk to their tools through
//! [`CommandRunner`], so tests can script the tools' answers.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[cfg(test)]
impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ExecError {
    pub fn stderr(&self) -> &str {
        match self {
            ExecError::Spawn { .. } => "",
            ExecError::Failed { stderr, .. } => stderr,
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output, whatever the exit status
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecError>;

    /// Run to completion; a non-zero exit is an error
    async fn run(&self, program: &str, args: &[String]) -> Result<String, ExecError> {
        let output = self.output(program, args).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ExecError::Failed {
                program: program.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs real processes with `tokio::process`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecError> {
        trace!(program, ?args, "exec");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Owned argument vector from string slices
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
pub mod fake {
    use std::sync::Mutex;

    use super::*;

    type Handler = dyn Fn(&str, &[String]) -> CommandOutput + Send + Sync;

    /// Scripted runner: `handler` answers every call, and calls are recorded
    /// as `program arg arg ...` strings.
    pub struct FakeRunner {
        handler: Box<Handler>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new(handler: impl Fn(&str, &[String]) -> CommandOutput + Send + Sync + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_matching(&self, needle: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.contains(needle))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecError> {
            let line = std::iter::once(program.to_string())
                .chain(args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(line);
            Ok((self.handler)(program, args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeRunner;
    use super::*;

    #[tokio::test]
    async fn test_run_maps_nonzero_exit_to_error() {
        let runner = FakeRunner::new(|_, args| {
            if args.first().map(String::as_str) == Some("ok") {
                CommandOutput::ok("fine\n")
            } else {
                CommandOutput::failed(2, "  boom \n")
            }
        });

        assert_eq!(runner.run("tool", &args(&["ok"])).await.unwrap(), "fine\n");
        let err = runner.run("tool", &args(&["bad"])).await.unwrap_err();
        assert_eq!(err.stderr(), "boom");
        assert!(matches!(err, ExecError::Failed { code: Some(2), .. }));
        assert_eq!(runner.calls(), vec!["tool ok", "tool bad"]);
    }

    #[tokio::test]
    async fn test_system_runner_spawn_error() {
        let err = SystemRunner
            .output("definitely-not-a-real-binary-wtdash", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
