use crate::engine::models::Version;

// Lifecycle of one update attempt, reported to whoever listens on the updates channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable { version: Version },
    Confirming { version: Version },
    Fetching { version: Version },
    Applying { version: Version },
    Restarting { version: Version },
    Terminated,
    Error(String),
}

impl UpdateState {
    pub fn label(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up-to-date",
            UpdateState::UpdateAvailable { .. } => "update-available",
            UpdateState::Confirming { .. } => "confirming",
            UpdateState::Fetching { .. } => "fetching",
            UpdateState::Applying { .. } => "applying",
            UpdateState::Restarting { .. } => "restarting",
            UpdateState::Terminated => "terminated",
            UpdateState::Error(_) => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmPolicy {
    /// Ask the user with a yes/no dialog before fetching.
    Ask,
    /// Fetch and apply without asking.
    Auto,
}
