use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::engine::models::{LocalVersion, Version};
use crate::engine::state::{ConfirmPolicy, UpdateState};
use crate::networking::NetworkClient;
use crate::process::Handoff;
use crate::storage::StorageManager;
use crate::ui::{NoticeLevel, UserPrompt};
use crate::updater::apply::UpdateApplier;
use crate::updater::error::UpdateError;
use crate::updater::fetch::UpdateFetcher;
use crate::updater::{UpdaterSettings, VersionOracle, is_update_available};

pub mod models;
pub mod state;

const UPDATE_TITLE: &str = "Update";
const AVAILABLE_TITLE: &str = "Update Available";

/// Result of a version check without acting on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckReport {
    pub local: LocalVersion,
    pub remote: Option<Version>,
    pub update_available: bool,
}

/// Drives one update attempt: check, optionally confirm, fetch, apply, hand off.
pub struct UpdateOrchestrator<P, H> {
    oracle: VersionOracle,
    fetcher: UpdateFetcher,
    applier: UpdateApplier,
    prompt: P,
    handoff: H,
    policy: ConfirmPolicy,
    in_flight: AtomicBool,
}

impl<P: UserPrompt, H: Handoff> UpdateOrchestrator<P, H> {
    pub fn new(settings: UpdaterSettings, prompt: P, handoff: H, policy: ConfirmPolicy) -> Self {
        let network = NetworkClient::new();
        let storage = StorageManager::new(settings.install_root.clone());
        Self {
            oracle: VersionOracle::new(network.clone(), storage.clone(), settings.clone()),
            fetcher: UpdateFetcher::new(network, settings),
            applier: UpdateApplier::new(storage),
            prompt,
            handoff,
            policy,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn check(&self) -> CheckReport {
        let local = self.oracle.local_version().await;
        let remote = self.oracle.remote_version().await;
        let update_available = is_update_available(&local, remote.as_ref());
        CheckReport {
            local,
            remote,
            update_available,
        }
    }

    /// Run one attempt and return the state it ended in.
    ///
    /// A second call while one is in progress returns `Idle` immediately;
    /// the applier must never race itself over the installation root.
    pub async fn run(&self, updates: &mpsc::UnboundedSender<UpdateState>) -> UpdateState {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            warn!("orchestrator: update already in progress, skipping");
            return UpdateState::Idle;
        };

        self.emit(updates, UpdateState::Checking);
        let local = self.oracle.local_version().await;
        let Some(manifest) = self.oracle.remote_manifest().await else {
            return self.emit(updates, UpdateState::Idle);
        };
        if !is_update_available(&local, Some(&manifest.version)) {
            info!("orchestrator: {local} is current");
            return self.emit(updates, UpdateState::UpToDate);
        }

        let version = manifest.version.clone();
        info!("orchestrator: new version detected, {local} -> {version}");
        self.emit(
            updates,
            UpdateState::UpdateAvailable {
                version: version.clone(),
            },
        );

        if self.policy == ConfirmPolicy::Ask {
            self.emit(
                updates,
                UpdateState::Confirming {
                    version: version.clone(),
                },
            );
            let question = format!("A new version ({version}) is available. Install now?");
            if !self.prompt.confirm(AVAILABLE_TITLE, &question).await {
                info!("orchestrator: user declined {version}");
                return self.emit(updates, UpdateState::Idle);
            }
        }

        self.emit(
            updates,
            UpdateState::Fetching {
                version: version.clone(),
            },
        );
        let payload = match self.fetcher.fetch(&manifest).await {
            Ok(payload) => payload,
            Err(err) => return self.fail(updates, err).await,
        };

        self.emit(
            updates,
            UpdateState::Applying {
                version: version.clone(),
            },
        );
        if let Err(err) = self.applier.apply(payload, &version).await {
            return self.fail(updates, err).await;
        }

        self.prompt
            .inform(NoticeLevel::Info, UPDATE_TITLE, "Update installed. Restarting...")
            .await;
        self.emit(
            updates,
            UpdateState::Restarting {
                version: version.clone(),
            },
        );
        if let Err(err) = self.handoff.relaunch() {
            return self.fail(updates, err).await;
        }
        self.handoff.terminate();
        self.emit(updates, UpdateState::Terminated)
    }

    async fn fail(
        &self,
        updates: &mpsc::UnboundedSender<UpdateState>,
        err: UpdateError,
    ) -> UpdateState {
        let message = err.to_string();
        error!("orchestrator: update abandoned: {message}");
        self.emit(updates, UpdateState::Error(message.clone()));
        self.prompt
            .inform(
                NoticeLevel::Error,
                UPDATE_TITLE,
                &format!("The update could not be installed:\n{message}"),
            )
            .await;
        self.emit(updates, UpdateState::Idle)
    }

    fn emit(
        &self,
        updates: &mpsc::UnboundedSender<UpdateState>,
        state: UpdateState,
    ) -> UpdateState {
        info!("orchestrator: -> {}", state.label());
        let _ = updates.send(state.clone());
        state
    }

    #[cfg(test)]
    fn parts(&self) -> (&P, &H) {
        (&self.prompt, &self.handoff)
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
