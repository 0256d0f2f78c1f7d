use tokio::time::timeout;

use crate::execution::{
    CommandSpec, ProcessExecutor, ProcessExitStatus, ProcessFuture, ProcessOutput,
    ProcessRunRequest,
};
use crate::models::{CoreError, CoreErrorKind, InstallScope, TaskKind};

pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn run(&self, request: ProcessRunRequest) -> ProcessFuture {
        Box::pin(async move {
            let mut cmd = build_command(&request.command);

            let scope = request.scope;
            let task = request.task;
            let waited = async {
                cmd.output().await.map_err(|error| {
                    process_failure(scope, task, format!("failed to spawn process: {error}"))
                })
            };

            let output = match request.timeout {
                Some(limit) => timeout(limit, waited).await.map_err(|_| {
                    process_failure(
                        scope,
                        task,
                        format!("process did not finish within {limit:?}"),
                    )
                })??,
                None => waited.await?,
            };

            let status = match output.status.code() {
                Some(code) => ProcessExitStatus::Exited(code),
                None => ProcessExitStatus::Signalled,
            };

            Ok(ProcessOutput {
                status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

fn build_command(spec: &CommandSpec) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

fn process_failure(
    scope: Option<InstallScope>,
    task: Option<TaskKind>,
    message: String,
) -> CoreError {
    CoreError {
        scope,
        task,
        kind: CoreErrorKind::ProcessFailure,
        message,
    }
}
