//! Asset pipeline state for one host session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use modloader::sync::{AssetFetcher, DEFAULT_TIMEOUT};
use modloader::{
    hijack, load_declarations, Classification, Classifier, ConfigStore, Dialogs, HttpFetcher,
    JsonFileStore, LoadedAssets, PatchDeclaration, PatchRegistry, SyncEngine, SyncReport,
};

use crate::config::HostPaths;
use crate::types::{HostResult, LoadResult, PatchScriptResult};

/// Owns the sync engine, classifier and patch registry, plus the last classification.
pub struct HostSession {
    store: Arc<dyn ConfigStore>,
    engine: SyncEngine,
    classifier: Classifier,
    registry: PatchRegistry,
    classification: Classification,
}

impl HostSession {
    pub fn new(
        asset_dir: impl Into<PathBuf>,
        store: Arc<dyn ConfigStore>,
        fetcher: Arc<dyn AssetFetcher>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Self {
        let asset_dir = asset_dir.into();
        Self {
            engine: SyncEngine::new(&asset_dir, store.clone(), fetcher, dialogs.clone()),
            classifier: Classifier::new(&asset_dir, store.clone(), dialogs),
            store,
            registry: PatchRegistry::new(),
            classification: Classification::default(),
        }
    }

    /// Open the config file and patch directory named by `paths`.
    pub fn open(paths: &HostPaths, dialogs: Arc<dyn Dialogs>) -> HostResult<Self> {
        let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::open(&paths.config)?);
        let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpFetcher::new(DEFAULT_TIMEOUT)?);

        let mut session = Self::new(&paths.assets, store, fetcher, dialogs);
        session.load_patches(&paths.patches)?;

        tracing::info!(
            "Session opened. Config: {}, assets: {}",
            paths.config.display(),
            paths.assets.display()
        );
        Ok(session)
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn asset_dir(&self) -> &Path {
        self.engine.asset_dir()
    }

    pub fn register_patches(
        &mut self,
        declarations: impl IntoIterator<Item = PatchDeclaration>,
    ) -> usize {
        self.registry.register(declarations)
    }

    pub fn load_patches(&mut self, dir: &Path) -> HostResult<usize> {
        let declarations = load_declarations(dir)?;
        Ok(self.register_patches(declarations))
    }

    /// Startup sequence: garbage-collect, update when a file is missing or the
    /// declared specs changed since the last update, then classify.
    pub async fn start(&mut self) -> HostResult<()> {
        let missing = self.engine.reconcile().await?;
        let changed = self.engine.specs_changed();
        if missing || changed {
            tracing::info!("Updating assets (missing: {missing}, specs changed: {changed})");
            self.engine.update_all().await;
        }
        self.classify().await?;
        Ok(())
    }

    /// Full refresh: reconcile, update every asset, reclassify.
    pub async fn resync(&mut self) -> HostResult<SyncReport> {
        self.engine.reconcile().await?;
        let report = self.engine.update_all().await;
        self.classify().await?;
        Ok(report)
    }

    pub async fn classify(&mut self) -> HostResult<&Classification> {
        self.classification = self.classifier.classify().await?;
        Ok(&self.classification)
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn loaded_assets(&self) -> &LoadedAssets {
        &self.classification.assets
    }

    pub fn patch_script(&self) -> PatchScriptResult {
        PatchScriptResult {
            script: self.registry.to_script(),
            patch_count: self.registry.len(),
        }
    }

    /// Assets ready to execute. The mod bundle is hooked when possible and
    /// passed through untouched otherwise.
    pub fn load(&self) -> LoadResult {
        let assets = self.loaded_assets();
        let mut scripts = assets.scripts.clone();

        let hook_installed = match scripts.mod_bundle.as_mut() {
            Some(bundle) => match hijack(bundle.content()) {
                Ok(text) => {
                    bundle.1 = text;
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        "Running {} without the patch hook: {e}",
                        bundle.filename()
                    );
                    false
                }
            },
            None => false,
        };

        LoadResult {
            scripts,
            styles: assets.styles.clone(),
            patch_script: self.registry.to_script(),
            hook_installed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modloader::store::{self, KEY_ASSETS};
    use modloader::{LogDialogs, MemoryStore, FACTORY_MARKER};
    use tempfile::TempDir;

    fn session_over(dir: &Path, store: Arc<MemoryStore>) -> HostSession {
        HostSession::new(
            dir.join("assets"),
            store,
            Arc::new(HttpFetcher::new(DEFAULT_TIMEOUT).unwrap()),
            Arc::new(LogDialogs),
        )
    }

    fn session_with_sources(sources: &[(&str, &str)]) -> (TempDir, HostSession) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();

        let mut specs = Vec::new();
        for (name, body) in sources {
            let path = src.join(format!("{name}.js"));
            std::fs::write(&path, body).unwrap();
            specs.push((name.to_string(), path.display().to_string()));
        }
        let store = MemoryStore::with_assets(specs.iter().map(|(n, p)| (n.as_str(), p.as_str())));

        let session = session_over(dir.path(), Arc::new(store));
        (dir, session)
    }

    #[tokio::test]
    async fn test_start_copies_and_classifies() {
        let bundle = format!("// @modloader:bundle\np=[],m=Symbol(\"{FACTORY_MARKER}\")");
        let (_dir, mut session) = session_with_sources(&[
            ("pre", "// @modloader:pre"),
            ("bundle", bundle.as_str()),
            ("post", "// @modloader:post"),
        ]);

        session.start().await.unwrap();

        let assets = session.loaded_assets();
        assert_eq!(assets.scripts.pre.as_ref().unwrap().filename(), "pre.js");
        assert_eq!(assets.scripts.mod_bundle.as_ref().unwrap().filename(), "bundle.js");
        assert!(session.classification().missing.is_empty());

        let load = session.load();
        assert!(load.hook_installed);
        assert!(load
            .scripts
            .mod_bundle
            .unwrap()
            .content()
            .contains(modloader::patch::PATCH_LIST_PATH));
        // The stored classification keeps the original text.
        let stored = session.loaded_assets().scripts.mod_bundle.as_ref().unwrap();
        assert_eq!(stored.content(), bundle);
    }

    #[tokio::test]
    async fn test_start_fetches_again_after_locator_change() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.js");
        let b = dir.path().join("b.js");
        std::fs::write(&a, "// @modloader:bundle A").unwrap();
        std::fs::write(&b, "// @modloader:bundle B").unwrap();
        let a = a.display().to_string();
        let b = b.display().to_string();

        let config = Arc::new(MemoryStore::with_assets([("bundle", a.as_str())]));
        let mut first = session_over(dir.path(), config.clone());
        first.start().await.unwrap();
        let bundle = first.loaded_assets().scripts.mod_bundle.as_ref().unwrap();
        assert_eq!(bundle.content(), "// @modloader:bundle A");

        let moved: std::collections::BTreeMap<&str, &str> = [("bundle", b.as_str())].into();
        store::set_typed(&*config, KEY_ASSETS, &moved).unwrap();

        let mut second = session_over(dir.path(), config);
        second.start().await.unwrap();
        let bundle = second.loaded_assets().scripts.mod_bundle.as_ref().unwrap();
        assert_eq!(bundle.content(), "// @modloader:bundle B");
    }

    #[tokio::test]
    async fn test_load_without_anchor_passes_bundle_through() {
        let (_dir, mut session) =
            session_with_sources(&[("bundle", "// @modloader:bundle\nvar x;")]);
        session.start().await.unwrap();

        let load = session.load();
        assert!(!load.hook_installed);
        assert_eq!(
            load.scripts.mod_bundle.unwrap().content(),
            "// @modloader:bundle\nvar x;"
        );
    }

    #[tokio::test]
    async fn test_load_patches_from_dir() {
        let (dir, mut session) = session_with_sources(&[]);
        let patches = dir.path().join("patches");
        std::fs::create_dir_all(&patches).unwrap();
        std::fs::write(
            patches.join("dev.json"),
            r#"{"find": "isDev", "replacement": {"match": "isDev", "replace": "true"}}"#,
        )
        .unwrap();

        assert_eq!(session.load_patches(&patches).unwrap(), 1);
        let script = session.patch_script();
        assert_eq!(script.patch_count, 1);
        assert!(script.script.contains("patches.push"));
    }

    #[tokio::test]
    async fn test_missing_patch_dir_registers_nothing() {
        let (dir, mut session) = session_with_sources(&[]);
        assert_eq!(session.load_patches(&dir.path().join("nope")).unwrap(), 0);
        assert_eq!(session.patch_script().patch_count, 0);
    }
}
