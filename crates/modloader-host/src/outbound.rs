//! Server-initiated messages: operator dialogs and stylesheet pushes.

use tokio::sync::mpsc;

use modloader::{Dialog, DialogChoice, Dialogs, StyleUpdate};

use crate::types::{dialog_show, style_updated, JsonRpcNotification};

/// Queue of notifications waiting to be written by the transport.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<JsonRpcNotification>,
}

impl Outbound {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JsonRpcNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: JsonRpcNotification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification dropped, transport closed");
        }
    }

    /// Forward every style update as a `styles/updated` notification until the source closes.
    pub async fn forward_styles(self, mut updates: mpsc::UnboundedReceiver<StyleUpdate>) {
        while let Some(update) = updates.recv().await {
            tracing::debug!("Pushing stylesheet {}", update.file);
            self.send(style_updated(&update));
        }
    }
}

/// The host renders dialogs asynchronously, so the answer is always "acknowledged".
impl Dialogs for Outbound {
    fn show(&self, dialog: Dialog) -> DialogChoice {
        tracing::warn!("{}: {}", dialog.title, dialog.message);
        self.send(dialog_show(&dialog));
        DialogChoice::Acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DIALOG_SHOW, STYLES_UPDATED};
    use modloader::DialogKind;

    #[test]
    fn test_dialog_becomes_notification() {
        let (outbound, mut rx) = Outbound::channel();
        let choice = outbound.show(Dialog {
            kind: DialogKind::SyncFailures,
            title: "Asset update failed".into(),
            message: "x".into(),
            silenceable: false,
        });
        assert_eq!(choice, DialogChoice::Acknowledged);
        assert_eq!(rx.try_recv().unwrap().method, DIALOG_SHOW);
    }

    #[test]
    fn test_send_after_close_is_ignored() {
        let (outbound, rx) = Outbound::channel();
        drop(rx);
        outbound.send(JsonRpcNotification::new("x", None));
    }

    #[tokio::test]
    async fn test_forward_styles() {
        let (outbound, mut rx) = Outbound::channel();
        let (tx, updates) = mpsc::unbounded_channel();
        tx.send(StyleUpdate {
            file: "a.css".into(),
            content: "b{}".into(),
        })
        .unwrap();
        drop(tx);

        outbound.forward_styles(updates).await;
        let n = rx.recv().await.unwrap();
        assert_eq!(n.method, STYLES_UPDATED);
    }
}
