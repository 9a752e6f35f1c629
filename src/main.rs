use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;

use crate::config::ConfigStore;
use crate::engine::UpdateOrchestrator;
use crate::engine::models::UpdateStrategy;
use crate::engine::state::ConfirmPolicy;
use crate::process::ProcessLauncher;
use crate::ui::{DialogPrompt, RfdDialogs};
use crate::updater::UpdaterSettings;

mod config;
mod engine;
mod env;
mod networking;
mod process;
mod storage;
mod ui;
mod updater;
mod util;

#[derive(Parser, Debug)]
#[command(
    name = "Wallpaper Cache Updater",
    author,
    version,
    about = "Keeps your chosen wallpaper and keeps itself up to date"
)]
struct Cli {
    /// Print version and exit without checking for updates.
    #[arg(long)]
    version_only: bool,

    /// Report local and remote versions, then exit without updating.
    #[arg(long)]
    check_only: bool,

    /// Install updates without asking first.
    #[arg(long)]
    yes: bool,

    /// How new files are retrieved.
    #[arg(long, value_enum, default_value_t = UpdateStrategy::FileList)]
    strategy: UpdateStrategy,

    /// Raw-content base URL serving version.txt and the application files.
    #[arg(long)]
    remote_base: Option<String>,

    /// Releases API endpoint used by the archive strategy.
    #[arg(long)]
    release_api: Option<String>,

    /// Installation directory (defaults to the executable's directory).
    #[arg(long)]
    install_root: Option<PathBuf>,

    /// Top-level directory expected inside release archives.
    #[arg(long)]
    project_dir: Option<String>,

    /// Override the file manifest (repeatable).
    #[arg(long = "file", value_name = "NAME")]
    files: Vec<String>,

    /// Remember PATH as the wallpaper to reapply at startup, then exit.
    #[arg(long, value_name = "PATH")]
    remember_wallpaper: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> UpdaterSettings {
        let install_root = self
            .install_root
            .clone()
            .unwrap_or_else(env::default_install_root);
        let mut settings = UpdaterSettings::new(install_root);
        settings.strategy = self.strategy;
        if let Some(base) = &self.remote_base {
            settings.remote_base = base.clone();
        }
        if let Some(api) = &self.release_api {
            settings.release_api = api.clone();
        }
        if let Some(dir) = &self.project_dir {
            settings.project_dir = dir.clone();
        }
        if !self.files.is_empty() {
            settings.files = self.files.clone();
        }
        settings
    }

    fn policy(&self) -> ConfirmPolicy {
        if self.yes {
            ConfirmPolicy::Auto
        } else {
            ConfirmPolicy::Ask
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.version_only {
        println!("Wallpaper Cache Updater {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = ConfigStore::new();
    if let Some(wallpaper) = &cli.remember_wallpaper {
        match config.set_wallpaper_path(Some(wallpaper.display().to_string())) {
            Ok(()) => info!("config: wallpaper saved to {}", config.path().display()),
            Err(err) => error!("config: {err}"),
        }
        return;
    }
    let record = config.load_or_init();
    match &record.wallpaper_path {
        Some(path) => info!("startup: saved wallpaper {path}"),
        None => info!("startup: no saved wallpaper"),
    }

    let settings = cli.settings();
    info!(
        "startup: install root {}, strategy {:?}",
        settings.install_root.display(),
        settings.strategy
    );
    let entry_point = env::entry_point().unwrap_or_else(|err| {
        warn!("startup: cannot resolve executable path ({err}); relaunch may fail");
        PathBuf::from(std::env::args_os().next().unwrap_or_default())
    });

    let runtime = build_runtime();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let orchestrator = UpdateOrchestrator::new(
        settings,
        DialogPrompt::new(ui_tx),
        ProcessLauncher::new(entry_point),
        cli.policy(),
    );

    if cli.check_only {
        let report = runtime.block_on(orchestrator.check());
        println!("local:  {}", report.local);
        match &report.remote {
            Some(remote) => println!("remote: {remote}"),
            None => println!("remote: unavailable"),
        }
        println!("update available: {}", report.update_available);
        return;
    }

    let (state_tx, _state_rx) = mpsc::unbounded_channel();
    let worker = runtime.spawn(async move { orchestrator.run(&state_tx).await });

    // Dialogs must be shown from this thread; the worker posts requests here.
    ui::run_dialog_loop(ui_rx, &RfdDialogs);

    match runtime.block_on(worker) {
        Ok(state) => info!("update: finished in state {}", state.label()),
        Err(err) => error!("update: worker failed: {err}"),
    }
}

fn build_runtime() -> Arc<Runtime> {
    match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(err) => {
            warn!(
                "startup: failed to create multithreaded runtime ({}); trying single-threaded runtime",
                err
            );
            match Builder::new_current_thread().enable_all().build() {
                Ok(rt) => Arc::new(rt),
                Err(fallback_err) => {
                    error!(
                        "startup: failed to create any Tokio runtime ({}); exiting",
                        fallback_err
                    );
                    std::process::exit(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ask_and_use_file_list() {
        let cli = Cli::parse_from(["wallpaper-cache-updater", "--install-root", "/opt/wcu"]);
        assert_eq!(cli.policy(), ConfirmPolicy::Ask);
        let settings = cli.settings();
        assert_eq!(settings.strategy, UpdateStrategy::FileList);
        assert_eq!(settings.install_root, PathBuf::from("/opt/wcu"));
        assert_eq!(settings.files.len(), updater::DEFAULT_FILES.len());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "wallpaper-cache-updater",
            "--yes",
            "--strategy",
            "archive",
            "--remote-base",
            "http://localhost:9000/raw",
            "--file",
            "a.txt",
            "--file",
            "b.txt",
            "--project-dir",
            "App",
        ]);
        assert_eq!(cli.policy(), ConfirmPolicy::Auto);
        let settings = cli.settings();
        assert_eq!(settings.strategy, UpdateStrategy::Archive);
        assert_eq!(settings.file_url("a.txt"), "http://localhost:9000/raw/a.txt");
        assert_eq!(settings.files, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(settings.project_dir, "App");
    }
}
