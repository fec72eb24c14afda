//! Starts resolved plans as detached processes.
//!
//! The engine's responsibility ends once the OS has created the process:
//! no handle is kept, nothing is awaited, and the child's outcome is never
//! reported back to the host.

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use crate::error::LaunchError;
use crate::plugin::resolver::LaunchPlan;

/// Creates the OS process for a verified plan.
pub trait ProcessSpawner {
    fn spawn(&self, plan: &LaunchPlan) -> Result<(), LaunchError>;
}

/// Fails with [`LaunchError::ExecutableNotFound`] when nothing exists at `executable`.
pub fn verify(executable: &Path) -> Result<(), LaunchError> {
    if executable.exists() {
        Ok(())
    } else {
        Err(LaunchError::ExecutableNotFound(executable.to_path_buf()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher<S = DetachedSpawner> {
    spawner: S,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: ProcessSpawner> ProcessLauncher<S> {
    pub fn with_spawner(spawner: S) -> Self {
        Self { spawner }
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Verify, then spawn. No process is created if verification fails.
    pub fn launch(&self, plan: &LaunchPlan) -> Result<(), LaunchError> {
        verify(&plan.executable)?;
        self.spawner.spawn(plan)?;

        tracing::info!(
            plugin = %plan.plugin_id,
            executable = %plan.executable.display(),
            cwd = %plan.working_dir().display(),
            "plugin launched"
        );
        Ok(())
    }
}

/// Spawns into its own process group with all standard streams closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSpawner;

impl ProcessSpawner for DetachedSpawner {
    fn spawn(&self, plan: &LaunchPlan) -> Result<(), LaunchError> {
        let mut command = build_command(plan);
        command
            .current_dir(plan.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);

        let mut child = command.spawn().map_err(|source| LaunchError::SpawnFailure {
            path: plan.executable.clone(),
            source,
        })?;

        // Reaped off-thread so it never lingers as a zombie; the status is discarded.
        let reaper = thread::Builder::new()
            .name("devhub-reaper".to_string())
            .spawn(move || {
                let _ = child.wait();
            });
        if let Err(err) = reaper {
            tracing::debug!("could not start reaper thread: {err}");
        }

        Ok(())
    }
}

fn build_command(plan: &LaunchPlan) -> Command {
    if cfg!(windows) && is_batch_script(&plan.executable) {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(&plan.executable).args(&plan.args);
        return command;
    }

    let mut command = Command::new(&plan.executable);
    command.args(&plan.args);
    command
}

fn is_batch_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bat") || ext.eq_ignore_ascii_case("cmd"))
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct CountingSpawner {
        calls: Cell<usize>,
    }

    impl ProcessSpawner for CountingSpawner {
        fn spawn(&self, _plan: &LaunchPlan) -> Result<(), LaunchError> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    fn plan(executable: PathBuf) -> LaunchPlan {
        LaunchPlan {
            plugin_id: "test".to_string(),
            plugin_dir: executable.parent().map(Path::to_path_buf).unwrap_or_default(),
            executable,
            args: Vec::new(),
            cwd: None,
        }
    }

    #[test]
    fn missing_executable_never_reaches_spawner() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::with_spawner(CountingSpawner::default());

        let err = launcher.launch(&plan(tmp.path().join("nope.sh"))).unwrap_err();
        assert!(matches!(err, LaunchError::ExecutableNotFound(_)));
        assert_eq!(launcher.spawner().calls.get(), 0);
    }

    #[test]
    fn existing_executable_is_spawned_once() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = tmp.path().join("tool");
        std::fs::write(&tool, "").unwrap();

        let launcher = ProcessLauncher::with_spawner(CountingSpawner::default());
        launcher.launch(&plan(tool)).unwrap();
        assert_eq!(launcher.spawner().calls.get(), 1);
    }

    #[test]
    fn batch_scripts_detected_case_insensitively() {
        assert!(is_batch_script(Path::new(r"C:\tools\run.BAT")));
        assert!(is_batch_script(Path::new("run.cmd")));
        assert!(!is_batch_script(Path::new("run.exe")));
        assert!(!is_batch_script(Path::new("run")));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_a_spawn_failure() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let tool = tmp.path().join("tool.sh");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = DetachedSpawner.spawn(&plan(tool)).unwrap_err();
        assert_eq!(err.code(), "spawn_failure");
    }
}
