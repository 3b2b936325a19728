//! Script classification by content sniffing.
//!
//! Filenames are user-supplied and untrusted, so roles come from markers found
//! near the top of each script rather than from names.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialog::{Dialog, DialogChoice, DialogKind, Dialogs};
use crate::store::{self, ConfigStore, KEY_DONT_WARN_MISSING, KEY_MARKERS};
use crate::types::{AssetTuple, LoadedAssets, LoaderResult, ScriptContainer, ScriptRole};

/// Number of leading characters inspected for a role marker.
pub const SCAN_WINDOW: usize = 500;

/// Role markers, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierMarkers {
    pub pre: String,
    pub post: String,
    pub mod_bundle: String,
}

impl Default for ClassifierMarkers {
    fn default() -> Self {
        Self {
            pre: "@modloader:pre".to_string(),
            post: "@modloader:post".to_string(),
            mod_bundle: "@modloader:bundle".to_string(),
        }
    }
}

impl ClassifierMarkers {
    /// Markers from config, falling back to the defaults.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        store::get_typed(store, KEY_MARKERS).unwrap_or_default()
    }

    /// Role claimed by a script's content. Checked in pre, post, mod-bundle order.
    pub fn role_of(&self, content: &str) -> ScriptRole {
        let head: String = content.chars().take(SCAN_WINDOW).collect();
        let head = head.to_lowercase();

        let claims = |marker: &str| !marker.is_empty() && head.contains(&marker.to_lowercase());

        if claims(&self.pre) {
            ScriptRole::Pre
        } else if claims(&self.post) {
            ScriptRole::Post
        } else if claims(&self.mod_bundle) {
            ScriptRole::ModBundle
        } else {
            ScriptRole::Other
        }
    }
}

/// Result of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub assets: LoadedAssets,
    /// Every file that claimed the mod-bundle role, in enumeration order.
    pub bundle_claimants: Vec<String>,
    pub missing: Vec<ScriptRole>,
}

impl Classification {
    pub fn has_duplicate_bundle(&self) -> bool {
        self.bundle_claimants.len() > 1
    }
}

/// Partition scripts into roles and attach styles. Pure; no I/O, no dialogs.
///
/// The first claimant of a role keeps it; later claimants are appended to
/// `others` so nothing is dropped.
pub fn partition(
    scripts: Vec<AssetTuple>,
    styles: Vec<AssetTuple>,
    markers: &ClassifierMarkers,
) -> Classification {
    let mut container = ScriptContainer::default();
    let mut bundle_claimants = Vec::new();

    for script in scripts {
        let role = markers.role_of(script.content());
        let slot = match role {
            ScriptRole::Pre => &mut container.pre,
            ScriptRole::Post => &mut container.post,
            ScriptRole::ModBundle => {
                bundle_claimants.push(script.filename().to_string());
                &mut container.mod_bundle
            }
            ScriptRole::Other => {
                container.others.push(script);
                continue;
            }
        };

        if let Some(existing) = slot.as_ref() {
            tracing::warn!(
                "{} also claims the {role} role held by {}; loading it as an ordinary script",
                script.filename(),
                existing.filename()
            );
            container.others.push(script);
        } else {
            *slot = Some(script);
        }
    }

    let missing = container.missing_roles();

    Classification {
        assets: LoadedAssets {
            scripts: container,
            styles,
        },
        bundle_claimants,
        missing,
    }
}

/// Reads the asset directory and classifies its contents.
pub struct Classifier {
    asset_dir: PathBuf,
    store: Arc<dyn ConfigStore>,
    dialogs: Arc<dyn Dialogs>,
}

impl Classifier {
    pub fn new(
        asset_dir: impl Into<PathBuf>,
        store: Arc<dyn ConfigStore>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            store,
            dialogs,
        }
    }

    /// Read every script and style, classify, and surface anomalies to the operator.
    pub async fn classify(&self) -> LoaderResult<Classification> {
        let (scripts, styles) = self.read_assets().await?;
        let markers = ClassifierMarkers::from_store(&*self.store);
        let classification = partition(scripts, styles, &markers);

        if classification.has_duplicate_bundle() {
            let names = classification.bundle_claimants.join(", ");
            tracing::warn!("Multiple files claim the mod-bundle role: {names}");
            self.dialogs.show(Dialog {
                kind: DialogKind::DuplicateModBundle,
                title: "Multiple mod bundles found".to_string(),
                message: format!(
                    "More than one file identifies itself as the mod bundle: {names}. \
                     All of them will be loaded, but running competing bundles is unsupported. \
                     Remove all but one."
                ),
                silenceable: false,
            });
        }

        if !classification.missing.is_empty() {
            self.report_missing(&classification.missing);
        }

        tracing::info!(
            "Classified {} scripts and {} styles",
            classification.assets.scripts.all().count(),
            classification.assets.styles.len()
        );

        Ok(classification)
    }

    fn report_missing(&self, missing: &[ScriptRole]) {
        let roles: Vec<&str> = missing.iter().map(|r| r.as_str()).collect();
        let roles = roles.join(", ");
        tracing::error!("Critical assets missing: {roles}");

        if store::dont_warn_missing(&*self.store) {
            return;
        }

        let choice = self.dialogs.show(Dialog {
            kind: DialogKind::MissingAssets,
            title: "Critical assets missing".to_string(),
            message: format!(
                "No script was found for: {roles}. \
                 Mods may not load correctly until these are added."
            ),
            silenceable: true,
        });

        if choice == DialogChoice::DontShowAgain {
            if let Err(e) = self.store.set(KEY_DONT_WARN_MISSING, serde_json::Value::Bool(true)) {
                tracing::error!("Failed to save missing-assets preference: {e}");
            }
        }
    }

    async fn read_assets(&self) -> LoaderResult<(Vec<AssetTuple>, Vec<AssetTuple>)> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.asset_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Asset directory {} does not exist", self.asset_dir.display());
                return Ok((Vec::new(), Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping asset with non UTF-8 name: {:?}", entry.file_name());
                continue;
            };
            entries.push((name, entry.path()));
        }
        entries.sort();

        let mut scripts = Vec::new();
        let mut styles = Vec::new();
        for (name, path) in entries {
            let lower = name.to_ascii_lowercase();
            let bucket = if lower.ends_with(".js") {
                &mut scripts
            } else if lower.ends_with(".css") {
                &mut styles
            } else {
                continue;
            };

            let bytes = tokio::fs::read(&path).await?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            bucket.push(AssetTuple(name, content));
        }

        Ok((scripts, styles))
    }
}
