//! Operator-facing dialogs. Always informational, never blocking core logic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    /// More than one file claims the mod-bundle role.
    DuplicateModBundle,
    /// One or more critical roles have no file.
    MissingAssets,
    /// Some assets failed to download or copy.
    SyncFailures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
    /// Offer a "don't show again" option.
    #[serde(default)]
    pub silenceable: bool,
}

/// What the operator did with a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogChoice {
    #[default]
    Acknowledged,
    DontShowAgain,
}

/// Presents dialogs to the operator.
pub trait Dialogs: Send + Sync {
    fn show(&self, dialog: Dialog) -> DialogChoice;
}

/// Dialogs that only go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDialogs;

impl Dialogs for LogDialogs {
    fn show(&self, dialog: Dialog) -> DialogChoice {
        tracing::warn!("{}: {}", dialog.title, dialog.message);
        DialogChoice::Acknowledged
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every dialog and answers with a fixed choice.
    #[derive(Default)]
    pub struct RecordingDialogs {
        pub shown: Mutex<Vec<Dialog>>,
        pub answer: DialogChoice,
    }

    impl RecordingDialogs {
        pub fn answering(answer: DialogChoice) -> Self {
            Self {
                shown: Mutex::new(Vec::new()),
                answer,
            }
        }

        pub fn kinds(&self) -> Vec<DialogKind> {
            self.shown.lock().unwrap().iter().map(|d| d.kind).collect()
        }
    }

    impl Dialogs for RecordingDialogs {
        fn show(&self, dialog: Dialog) -> DialogChoice {
            self.shown.lock().unwrap().push(dialog);
            self.answer
        }
    }
}
