use std::future::Future;

use log::{debug, warn};
use rfd::{MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use tokio::sync::{mpsc, oneshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// How the update worker talks to the user.
pub trait UserPrompt: Send + Sync {
    /// Yes/no question; `false` when the user declines or no UI is available.
    fn confirm(&self, title: &str, message: &str) -> impl Future<Output = bool> + Send;

    /// Modal notice; resolves once it has been dismissed.
    fn inform(&self, level: NoticeLevel, title: &str, message: &str)
    -> impl Future<Output = ()> + Send;
}

// Work posted from the background worker to the thread that owns the dialogs.
#[derive(Debug)]
pub enum UiRequest {
    Confirm {
        title: String,
        message: String,
        reply: oneshot::Sender<bool>,
    },
    Notify {
        level: NoticeLevel,
        title: String,
        message: String,
        done: oneshot::Sender<()>,
    },
}

/// `UserPrompt` that forwards every dialog to the UI thread and awaits the answer.
#[derive(Clone)]
pub struct DialogPrompt {
    requests: mpsc::UnboundedSender<UiRequest>,
}

impl DialogPrompt {
    pub fn new(requests: mpsc::UnboundedSender<UiRequest>) -> Self {
        Self { requests }
    }
}

impl UserPrompt for DialogPrompt {
    async fn confirm(&self, title: &str, message: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = UiRequest::Confirm {
            title: title.to_owned(),
            message: message.to_owned(),
            reply,
        };
        if self.requests.send(request).is_err() {
            warn!("ui: dialog thread gone; treating '{title}' as declined");
            return false;
        }
        answer.await.unwrap_or(false)
    }

    async fn inform(&self, level: NoticeLevel, title: &str, message: &str) {
        let (done, dismissed) = oneshot::channel();
        let request = UiRequest::Notify {
            level,
            title: title.to_owned(),
            message: message.to_owned(),
            done,
        };
        if self.requests.send(request).is_err() {
            warn!("ui: dialog thread gone; dropping notice '{title}': {message}");
            return;
        }
        let _ = dismissed.await;
    }
}

/// Native dialog toolkit, called only from the UI thread.
pub trait Dialogs {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool;
    fn show_message(&self, level: NoticeLevel, title: &str, message: &str);
}

pub struct RfdDialogs;

impl Dialogs for RfdDialogs {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool {
        let result = MessageDialog::new()
            .set_level(MessageLevel::Info)
            .set_title(title)
            .set_description(message)
            .set_buttons(MessageButtons::YesNo)
            .show();
        matches!(result, MessageDialogResult::Yes)
    }

    fn show_message(&self, level: NoticeLevel, title: &str, message: &str) {
        let level = match level {
            NoticeLevel::Info => MessageLevel::Info,
            NoticeLevel::Error => MessageLevel::Error,
        };
        MessageDialog::new()
            .set_level(level)
            .set_title(title)
            .set_description(message)
            .set_buttons(MessageButtons::Ok)
            .show();
    }
}

/// Serve dialog requests on the calling thread until every sender is dropped.
pub fn run_dialog_loop(mut requests: mpsc::UnboundedReceiver<UiRequest>, dialogs: &impl Dialogs) {
    while let Some(request) = requests.blocking_recv() {
        match request {
            UiRequest::Confirm {
                title,
                message,
                reply,
            } => {
                let answer = dialogs.ask_yes_no(&title, &message);
                debug!("ui: '{title}' answered {answer}");
                let _ = reply.send(answer);
            }
            UiRequest::Notify {
                level,
                title,
                message,
                done,
            } => {
                dialogs.show_message(level, &title, &message);
                let _ = done.send(());
            }
        }
    }
    debug!("ui: dialog loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    struct ScriptedDialogs {
        answer: bool,
        owner: thread::ThreadId,
        shown: Mutex<Vec<String>>,
    }

    impl Dialogs for ScriptedDialogs {
        fn ask_yes_no(&self, title: &str, _message: &str) -> bool {
            assert_eq!(thread::current().id(), self.owner);
            self.shown.lock().unwrap().push(format!("ask:{title}"));
            self.answer
        }

        fn show_message(&self, level: NoticeLevel, title: &str, _message: &str) {
            assert_eq!(thread::current().id(), self.owner);
            self.shown.lock().unwrap().push(format!("{level:?}:{title}"));
        }
    }

    #[test]
    fn worker_requests_are_served_on_the_ui_thread() {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompt = DialogPrompt::new(tx);
        let worker = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let yes = prompt.confirm("Update Available", "Install now?").await;
                prompt.inform(NoticeLevel::Info, "Update", "done").await;
                yes
            })
        });

        let dialogs = ScriptedDialogs {
            answer: true,
            owner: thread::current().id(),
            shown: Mutex::new(Vec::new()),
        };
        run_dialog_loop(rx, &dialogs);

        assert!(worker.join().unwrap());
        assert_eq!(
            *dialogs.shown.lock().unwrap(),
            vec!["ask:Update Available".to_string(), "Info:Update".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_ui_thread_declines() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let prompt = DialogPrompt::new(tx);
        assert!(!prompt.confirm("Update Available", "Install now?").await);
        prompt.inform(NoticeLevel::Error, "Update", "failed").await;
    }
}
