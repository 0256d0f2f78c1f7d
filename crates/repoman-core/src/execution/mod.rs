pub mod tokio_process;

pub use tokio_process::TokioProcessExecutor;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind, InstallScope, TaskKind};

pub type ExecutionResult<T> = Result<T, CoreError>;

pub type ProcessFuture = Pin<Box<dyn Future<Output = ExecutionResult<ProcessOutput>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn validate(
        &self,
        scope: Option<InstallScope>,
        task: Option<TaskKind>,
    ) -> ExecutionResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_command(scope, task, "command program path must not be empty"));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(invalid_command(
                scope,
                task,
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(invalid_command(
                scope,
                task,
                "environment keys and values must be non-empty and must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessRunRequest {
    pub scope: Option<InstallScope>,
    pub task: Option<TaskKind>,
    pub command: CommandSpec,
    pub timeout: Option<Duration>,
}

impl ProcessRunRequest {
    pub fn new(scope: Option<InstallScope>, task: Option<TaskKind>, command: CommandSpec) -> Self {
        Self {
            scope,
            task,
            command,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    Exited(i32),
    Signalled,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOutput {
    pub status: ProcessExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == ProcessExitStatus::Exited(0)
    }
}

pub trait ProcessExecutor: Send + Sync {
    fn run(&self, request: ProcessRunRequest) -> ProcessFuture;
}

/// Runs a validated command and returns its stdout, treating a non-zero
/// exit as a transaction failure carrying the stderr tail.
pub async fn run_and_collect_stdout(
    executor: &dyn ProcessExecutor,
    request: ProcessRunRequest,
) -> ExecutionResult<String> {
    request.command.validate(request.scope, request.task)?;
    let scope = request.scope;
    let task = request.task;

    let output = executor.run(request).await?;
    if output.success() {
        return Ok(output.stdout);
    }

    let detail = if output.stderr.trim().is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    Err(CoreError {
        scope,
        task,
        kind: CoreErrorKind::TransactionFailure,
        message: format!(
            "command exited with {:?}: {}",
            output.status,
            last_lines(&detail, 4)
        ),
    })
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("; ")
}

fn invalid_command(
    scope: Option<InstallScope>,
    task: Option<TaskKind>,
    message: &str,
) -> CoreError {
    CoreError {
        scope,
        task,
        kind: CoreErrorKind::ValidationFailure,
        message: message.to_string(),
    }
}
