use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{EngineFuture, EngineResult, TransactionEngine};
use crate::execution::{CommandSpec, ProcessExecutor, ProcessRunRequest, run_and_collect_stdout};
use crate::models::{InstallScope, InstalledRef, RefKind, Remote, TaskKind};

const LIST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ProcessFlatpakEngine {
    executor: Arc<dyn ProcessExecutor>,
    program: PathBuf,
}

impl ProcessFlatpakEngine {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self::with_program(executor, "flatpak")
    }

    pub fn with_program(executor: Arc<dyn ProcessExecutor>, program: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }

    fn command(&self, scope: InstallScope) -> CommandSpec {
        CommandSpec::new(&self.program).arg(scope.cli_flag())
    }

    fn read_request(
        &self,
        scope: InstallScope,
        task: Option<TaskKind>,
        command: CommandSpec,
    ) -> ProcessRunRequest {
        ProcessRunRequest::new(Some(scope), task, command).timeout(LIST_TIMEOUT)
    }
}

impl TransactionEngine for ProcessFlatpakEngine {
    fn list_remotes(&self, scope: InstallScope) -> EngineFuture<Vec<Remote>> {
        let executor = self.executor.clone();
        let request = self.read_request(
            scope,
            None,
            self.command(scope)
                .arg("remotes")
                .arg("--columns=name,title,url"),
        );

        Box::pin(async move {
            let raw = run_and_collect_stdout(executor.as_ref(), request).await?;
            Ok(parse_remotes(&raw, scope))
        })
    }

    fn list_installed_refs(&self, scope: InstallScope) -> EngineFuture<Vec<InstalledRef>> {
        let executor = self.executor.clone();
        // App and runtime refs are enumerated separately; the listing tool
        // has no combined kind column.
        let app_request = self.read_request(
            scope,
            None,
            self.command(scope)
                .arg("list")
                .arg("--app")
                .arg("--columns=application,branch,origin"),
        );
        let runtime_request = self.read_request(
            scope,
            None,
            self.command(scope)
                .arg("list")
                .arg("--runtime")
                .arg("--columns=application,branch,origin"),
        );

        Box::pin(async move {
            let mut refs = Vec::new();
            let apps = run_and_collect_stdout(executor.as_ref(), app_request).await?;
            refs.extend(parse_installed_refs(&apps, RefKind::App));
            let runtimes = run_and_collect_stdout(executor.as_ref(), runtime_request).await?;
            refs.extend(parse_installed_refs(&runtimes, RefKind::Runtime));
            Ok(refs)
        })
    }

    fn add_remote(
        &self,
        scope: InstallScope,
        name: String,
        source_url: String,
    ) -> EngineFuture<()> {
        let executor = self.executor.clone();
        let command = self
            .command(scope)
            .arg("remote-add")
            .arg("--if-not-exists")
            .arg(name)
            .arg(source_url);
        let request = ProcessRunRequest::new(Some(scope), Some(TaskKind::AddRemote), command);

        Box::pin(async move { run_unit(executor, request).await })
    }

    fn remove_remote(&self, scope: InstallScope, name: String) -> EngineFuture<()> {
        let executor = self.executor.clone();
        let command = self.command(scope).arg("remote-delete").arg(name);
        let request = ProcessRunRequest::new(Some(scope), Some(TaskKind::RemoveRemote), command);

        Box::pin(async move { run_unit(executor, request).await })
    }

    fn uninstall_ref(&self, scope: InstallScope, installed: InstalledRef) -> EngineFuture<()> {
        let executor = self.executor.clone();
        let command = self
            .command(scope)
            .arg("uninstall")
            .arg("--noninteractive")
            .arg("-y")
            .arg(format!("{}//{}", installed.name, installed.branch));
        let request = ProcessRunRequest::new(Some(scope), Some(TaskKind::RemoveRemote), command);

        Box::pin(async move { run_unit(executor, request).await })
    }

    fn install_bundle(&self, scope: InstallScope, bundle_path: String) -> EngineFuture<()> {
        let executor = self.executor.clone();
        let command = self
            .command(scope)
            .arg("install")
            .arg("--noninteractive")
            .arg("-y")
            .arg("--from")
            .arg(bundle_path);
        let request = ProcessRunRequest::new(Some(scope), Some(TaskKind::InstallBundle), command);

        Box::pin(async move { run_unit(executor, request).await })
    }
}

async fn run_unit(
    executor: Arc<dyn ProcessExecutor>,
    request: ProcessRunRequest,
) -> EngineResult<()> {
    run_and_collect_stdout(executor.as_ref(), request).await?;
    Ok(())
}

fn parse_remotes(output: &str, scope: InstallScope) -> Vec<Remote> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut columns = line.split('\t').map(str::trim);
            let name = columns.next()?;
            if name.is_empty() {
                return None;
            }
            let title = columns.next().filter(|t| !t.is_empty() && *t != "-");
            let url = columns.next().unwrap_or_default();
            Some(Remote {
                name: name.to_string(),
                title: title.map(str::to_owned),
                url: url.to_string(),
                icon_url: None,
                scope,
            })
        })
        .collect()
}

fn parse_installed_refs(output: &str, kind: RefKind) -> Vec<InstalledRef> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut columns = line.split('\t').map(str::trim);
            let name = columns.next()?;
            if name.is_empty() {
                return None;
            }
            let branch = columns.next().unwrap_or_default();
            let origin = columns.next().unwrap_or_default();
            Some(InstalledRef {
                name: name.to_string(),
                kind,
                branch: branch.to_string(),
                origin: origin.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_installed_refs, parse_remotes};
    use crate::models::{InstallScope, RefKind};

    #[test]
    fn parses_remote_columns() {
        let output = "flathub\tFlathub\thttps://dl.flathub.org/repo/\n\
                      vendor\t-\thttps://apt.example.com/flatpak/\n";
        let remotes = parse_remotes(output, InstallScope::User);

        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[0].name, "flathub");
        assert_eq!(remotes[0].title.as_deref(), Some("Flathub"));
        assert_eq!(remotes[1].title, None);
        assert_eq!(remotes[1].scope, InstallScope::User);
    }

    #[test]
    fn parses_installed_ref_columns() {
        let output = "org.example.App\tstable\tflathub\n";
        let refs = parse_installed_refs(output, RefKind::App);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "org.example.App");
        assert_eq!(refs[0].kind, RefKind::App);
        assert_eq!(refs[0].branch, "stable");
        assert_eq!(refs[0].origin, "flathub");
    }

    #[test]
    fn skips_blank_listing_lines() {
        assert!(parse_remotes("\n   \n", InstallScope::System).is_empty());
    }
}
