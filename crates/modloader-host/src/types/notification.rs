//! Server-to-host notifications.

use modloader::{Dialog, StyleUpdate};

use super::message::JsonRpcNotification;

/// A stylesheet changed on disk. Params: `{ file, content }`.
pub const STYLES_UPDATED: &str = "styles/updated";
/// Show an informational dialog. Params: `{ kind, title, message, silenceable }`.
pub const DIALOG_SHOW: &str = "dialog/show";

pub fn style_updated(update: &StyleUpdate) -> JsonRpcNotification {
    JsonRpcNotification::new(STYLES_UPDATED, serde_json::to_value(update).ok())
}

pub fn dialog_show(dialog: &Dialog) -> JsonRpcNotification {
    JsonRpcNotification::new(DIALOG_SHOW, serde_json::to_value(dialog).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modloader::DialogKind;
    use serde_json::json;

    #[test]
    fn test_style_updated_params() {
        let n = style_updated(&StyleUpdate {
            file: "a.css".into(),
            content: String::new(),
        });
        assert_eq!(n.method, STYLES_UPDATED);
        assert_eq!(n.params, Some(json!({"file": "a.css", "content": ""})));
    }

    #[test]
    fn test_dialog_show_params() {
        let n = dialog_show(&Dialog {
            kind: DialogKind::MissingAssets,
            title: "t".into(),
            message: "m".into(),
            silenceable: true,
        });
        assert_eq!(
            n.params,
            Some(json!({
                "kind": "missing_assets",
                "title": "t",
                "message": "m",
                "silenceable": true
            }))
        );
    }
}
