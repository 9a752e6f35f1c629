use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};

use crate::updater::error::UpdateError;

/// Seam between the orchestrator and process lifetime control.
pub trait Handoff: Send + Sync {
    /// Start a fresh, detached instance of the application.
    fn relaunch(&self) -> Result<(), UpdateError>;

    /// End the current process without running any further cleanup.
    fn terminate(&self);
}

#[derive(Clone)]
pub struct ProcessLauncher {
    entry_point: PathBuf,
}

impl ProcessLauncher {
    pub fn new(entry_point: impl Into<PathBuf>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }
}

impl Handoff for ProcessLauncher {
    fn relaunch(&self) -> Result<(), UpdateError> {
        let mut command = detached_command(&self.entry_point);
        if let Some(dir) = self.entry_point.parent() {
            command.current_dir(dir);
        }
        debug!("relaunch: spawning {}", self.entry_point.display());
        let child = command.spawn().map_err(|e| UpdateError::Relaunch {
            path: self.entry_point.clone(),
            message: e.to_string(),
        })?;
        info!("relaunch: new instance started (pid {})", child.id());
        Ok(())
    }

    fn terminate(&self) {
        info!("relaunch: exiting old instance");
        std::process::exit(0);
    }
}

/// Build a command whose child outlives this process and its console.
pub fn detached_command(program: &Path) -> Command {
    let mut command = Command::new(program);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        // CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS
        command.creation_flags(0x00000200 | 0x00000008);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // New session: no controlling terminal, not in our process group.
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_point_is_a_relaunch_error() {
        let launcher = ProcessLauncher::new("/definitely/not/here/wallpaper-cache-updater");
        let err = launcher.relaunch().unwrap_err();
        assert!(matches!(err, UpdateError::Relaunch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn detached_child_runs_in_its_own_session() {
        let mut child = detached_command(Path::new("sleep"))
            .arg("1")
            .spawn()
            .unwrap();
        let pid = child.id() as libc::pid_t;
        let session = unsafe { libc::getsid(pid) };
        let _ = child.kill();
        let _ = child.wait();
        assert_eq!(session, pid);
    }

    #[test]
    fn detached_command_targets_program() {
        let command = detached_command(Path::new("app.exe"));
        assert_eq!(command.get_program(), "app.exe");
        assert_eq!(command.get_args().count(), 0);
    }
}
