//! Request params and results for each bridge method.

use serde::{Deserialize, Serialize};

use modloader::{AssetTuple, ScriptContainer};

/// Methods served over the bridge.
pub const METHODS: &[&str] = &[
    "initialize",
    "ping",
    "shutdown",
    "assets/sync",
    "assets/load",
    "bundle/hijack",
    "patches/script",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "modloader-host".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub server_info: ServerInfo,
    pub methods: Vec<String>,
    pub notifications: Vec<String>,
}

impl InitializeResult {
    pub fn default_result() -> Self {
        Self {
            server_info: ServerInfo::default(),
            methods: METHODS.iter().map(|m| m.to_string()).collect(),
            notifications: vec![
                super::notification::STYLES_UPDATED.to_string(),
                super::notification::DIALOG_SHOW.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HijackParams {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HijackResult {
    pub text: String,
}

/// Everything the host needs to run the mods for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub scripts: ScriptContainer,
    pub styles: Vec<AssetTuple>,
    /// Run after `pre` and before the mod bundle.
    pub patch_script: String,
    /// Whether the mod bundle in `scripts` was rewritten to use the shared patch list.
    pub hook_installed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchScriptResult {
    pub script: String,
    pub patch_count: usize,
}
