//! Asset synchronization: keeps the asset directory consistent with the declared specs.
//!
//! ## Atomicity
//!
//! Every write goes to `<dest>.tmp` first and is renamed over the destination
//! only once complete. The staging file is removed on every exit path, so the
//! destination is always absent, fully the old version, or fully the new one.
//!
//! ## Concurrency
//!
//! `update_all` runs a fixed number of worker futures inside the calling task.
//! Each pops the next spec from a shared queue until the queue is empty, which
//! bounds in-flight sockets and file descriptors to the worker count.

pub mod fetch;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::dialog::{Dialog, DialogKind, Dialogs};
use crate::store::{self, tmp_sibling, ConfigStore, KEY_ETAGS, KEY_LAST_SYNCED, KEY_MANAGED};
use crate::types::{AssetSpec, LoaderResult, Locator};

pub use fetch::{AssetFetcher, FetchOutcome, HttpFetcher, DEFAULT_TIMEOUT};

/// Maximum number of assets processed at once.
pub const WORKER_COUNT: usize = 5;

/// Slack allowed when comparing modification times of local copies.
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

/// What happened to a single asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A new network copy replaced the destination.
    Downloaded,
    /// The server confirmed the cached copy.
    NotModified,
    /// A local source was copied over the destination.
    Copied,
    /// The local destination is already at least as new as its source.
    UpToDate,
}

/// One asset that failed to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub name: String,
    pub locator: String,
    pub message: String,
}

/// Aggregate result of `update_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub downloaded: usize,
    pub not_modified: usize,
    pub copied: usize,
    pub up_to_date: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Downloaded => self.downloaded += 1,
            SyncOutcome::NotModified => self.not_modified += 1,
            SyncOutcome::Copied => self.copied += 1,
            SyncOutcome::UpToDate => self.up_to_date += 1,
        }
    }

    /// Number of destinations rewritten.
    pub fn writes(&self) -> usize {
        self.downloaded + self.copied
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Locator -> entity tag, with a dirty bit so it is persisted at most once per batch.
#[derive(Debug, Default)]
struct EtagCache {
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl EtagCache {
    fn load(store: &dyn ConfigStore) -> Self {
        Self {
            entries: store::etag_cache(store),
            dirty: false,
        }
    }

    fn get(&self, locator: &str) -> Option<String> {
        self.entries.get(locator).cloned()
    }

    fn set(&mut self, locator: &str, etag: Option<String>) {
        match etag {
            Some(tag) => {
                if self.entries.get(locator) != Some(&tag) {
                    self.entries.insert(locator.to_string(), tag);
                    self.dirty = true;
                }
            }
            None => self.remove(locator),
        }
    }

    fn remove(&mut self, locator: &str) {
        if self.entries.remove(locator).is_some() {
            self.dirty = true;
        }
    }

    fn persist(&mut self, store: &dyn ConfigStore) -> LoaderResult<()> {
        if self.dirty {
            store::set_typed(store, KEY_ETAGS, &self.entries)?;
            self.dirty = false;
        }
        Ok(())
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Enabled specs split by filename ownership. The first spec in name order
/// owns a filename; later specs that sanitize to it are rejected.
#[derive(Debug, Default)]
struct Claims {
    owners: Vec<AssetSpec>,
    rejected: Vec<SyncFailure>,
}

impl Claims {
    fn resolve(specs: Vec<AssetSpec>) -> Self {
        let mut taken: BTreeMap<String, String> = BTreeMap::new();
        let mut claims = Self::default();
        for spec in specs.into_iter().filter(AssetSpec::is_enabled) {
            let filename = spec.filename();
            match taken.get(&filename) {
                Some(owner) => claims.rejected.push(SyncFailure {
                    message: format!(
                        "{}: filename {filename} is already used by asset {owner}",
                        spec.name
                    ),
                    name: spec.name,
                    locator: spec.locator,
                }),
                None => {
                    taken.insert(filename, spec.name.clone());
                    claims.owners.push(spec);
                }
            }
        }
        claims
    }

    fn filenames(&self) -> BTreeSet<String> {
        self.owners.iter().map(AssetSpec::filename).collect()
    }

    fn locators(&self) -> BTreeMap<String, String> {
        self.owners
            .iter()
            .map(|spec| (spec.name.clone(), spec.locator.clone()))
            .collect()
    }
}

/// A spec whose locator moved since the last update must be re-fetched even
/// if the destination looks fresh.
fn locator_moved(last_synced: &BTreeMap<String, String>, spec: &AssetSpec) -> bool {
    last_synced
        .get(&spec.name)
        .is_some_and(|previous| previous != &spec.locator)
}

/// Reconciles declared asset specs against the asset directory.
pub struct SyncEngine {
    asset_dir: PathBuf,
    store: Arc<dyn ConfigStore>,
    fetcher: Arc<dyn AssetFetcher>,
    dialogs: Arc<dyn Dialogs>,
    workers: usize,
}

impl SyncEngine {
    pub fn new(
        asset_dir: impl Into<PathBuf>,
        store: Arc<dyn ConfigStore>,
        fetcher: Arc<dyn AssetFetcher>,
        dialogs: Arc<dyn Dialogs>,
    ) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            store,
            fetcher,
            dialogs,
            workers: WORKER_COUNT,
        }
    }

    /// Override the worker count (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    fn claims(&self) -> Claims {
        Claims::resolve(store::asset_specs(&*self.store))
    }

    /// Whether the declared specs differ from those the last update fetched.
    pub fn specs_changed(&self) -> bool {
        self.claims().locators() != store::last_synced_assets(&*self.store)
    }

    /// Garbage-collect orphans and record newly declared assets.
    ///
    /// Returns `true` when an expected file is missing from disk, meaning the
    /// caller should run [`update_all`](Self::update_all).
    pub async fn reconcile(&self) -> LoaderResult<bool> {
        tokio::fs::create_dir_all(&self.asset_dir).await?;

        let expected = self.claims().filenames();

        let before = store::managed_filenames(&*self.store);
        let mut managed = before.clone();

        let orphans: Vec<String> = managed.difference(&expected).cloned().collect();
        for orphan in orphans {
            if !is_plain_filename(&orphan) {
                tracing::warn!("Dropping unsafe managed filename from record: {orphan:?}");
                managed.remove(&orphan);
                continue;
            }
            let path = self.asset_dir.join(&orphan);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("Removed orphaned asset {orphan}");
                    managed.remove(&orphan);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    managed.remove(&orphan);
                }
                Err(e) => {
                    tracing::warn!("Failed to remove orphaned asset {orphan}, will retry: {e}");
                }
            }
        }

        // Recorded before the download so a crash mid-fetch still leaves it deletable.
        managed.extend(expected.iter().cloned());

        if managed != before {
            store::set_typed(&*self.store, KEY_MANAGED, &managed)?;
        }

        let mut missing = false;
        for filename in &expected {
            let path = self.asset_dir.join(filename);
            remove_if_exists(&tmp_sibling(&path)).await;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!("Asset {filename} is missing on disk");
                missing = true;
            }
        }

        Ok(missing)
    }

    /// Sync every enabled spec through the worker pool.
    pub async fn update_all(&self) -> SyncReport {
        if let Err(e) = tokio::fs::create_dir_all(&self.asset_dir).await {
            tracing::error!(
                "Failed to create asset directory {}: {e}",
                self.asset_dir.display()
            );
        }

        let Claims { owners, rejected } = self.claims();
        for failure in &rejected {
            tracing::warn!("Skipping asset: {}", failure.message);
        }
        let specs: VecDeque<AssetSpec> = owners.into();

        tracing::info!(
            "Updating {} assets with {} workers",
            specs.len(),
            self.workers
        );

        let last_synced = store::last_synced_assets(&*self.store);
        let queue = Mutex::new(specs);
        let etags = Mutex::new(EtagCache::load(&*self.store));

        let workers = (0..self.workers).map(|_| self.worker(&queue, &etags, &last_synced));
        let finished = futures::future::join_all(workers).await;

        let mut report = SyncReport {
            failures: rejected,
            ..SyncReport::default()
        };
        let mut synced = BTreeMap::new();
        for (spec, result) in finished.into_iter().flatten() {
            match result {
                Ok(outcome) => {
                    tracing::debug!("{} -> {:?}", spec.name, outcome);
                    report.record(outcome);
                    synced.insert(spec.name, spec.locator);
                }
                Err(e) => {
                    tracing::error!("Failed to update asset {}: {e}", spec.name);
                    report.failures.push(SyncFailure {
                        message: format!("{}: {e}", spec.name),
                        name: spec.name,
                        locator: spec.locator,
                    });
                }
            }
        }

        if let Err(e) = locked(&etags).persist(&*self.store) {
            tracing::error!("Failed to persist ETag cache: {e}");
            report.failures.push(SyncFailure {
                name: KEY_ETAGS.to_string(),
                locator: String::new(),
                message: format!("Failed to save download cache: {e}"),
            });
        }

        if synced != last_synced {
            if let Err(e) = store::set_typed(&*self.store, KEY_LAST_SYNCED, &synced) {
                tracing::error!("Failed to record synced assets: {e}");
                report.failures.push(SyncFailure {
                    name: KEY_LAST_SYNCED.to_string(),
                    locator: String::new(),
                    message: format!("Failed to save the synced asset list: {e}"),
                });
            }
        }

        if !report.failures.is_empty() {
            self.notify_failures(&report.failures);
        }

        tracing::info!(
            "Asset update finished: {} downloaded, {} copied, {} unchanged, {} failed",
            report.downloaded,
            report.copied,
            report.not_modified + report.up_to_date,
            report.failures.len()
        );

        report
    }

    /// Sync a single spec, loading and persisting the ETag cache around it.
    pub async fn sync_one(&self, spec: &AssetSpec) -> LoaderResult<SyncOutcome> {
        tokio::fs::create_dir_all(&self.asset_dir).await?;
        let etags = Mutex::new(EtagCache::load(&*self.store));
        let moved = locator_moved(&store::last_synced_assets(&*self.store), spec);
        let result = self.sync_with_cache(spec, &etags, moved).await;
        locked(&etags).persist(&*self.store)?;
        result
    }

    async fn worker(
        &self,
        queue: &Mutex<VecDeque<AssetSpec>>,
        etags: &Mutex<EtagCache>,
        last_synced: &BTreeMap<String, String>,
    ) -> Vec<(AssetSpec, LoaderResult<SyncOutcome>)> {
        let mut done = Vec::new();
        loop {
            let next = locked(queue).pop_front();
            match next {
                Some(spec) => {
                    let moved = locator_moved(last_synced, &spec);
                    let result = self.sync_with_cache(&spec, etags, moved).await;
                    done.push((spec, result));
                }
                None => break,
            }
        }
        done
    }

    async fn sync_with_cache(
        &self,
        spec: &AssetSpec,
        etags: &Mutex<EtagCache>,
        moved: bool,
    ) -> LoaderResult<SyncOutcome> {
        let dest = self.asset_dir.join(spec.filename());
        let tmp = tmp_sibling(&dest);
        if moved {
            tracing::info!("Locator of {} changed, fetching again", spec.name);
        }

        let result = match Locator::parse(&spec.locator) {
            Ok(Locator::File(source)) => {
                locked(etags).remove(&spec.locator);
                copy_local(&source, &dest, &tmp, moved).await
            }
            Ok(Locator::Network(url)) => {
                self.download(&spec.locator, &url, &dest, &tmp, etags)
                    .await
            }
            Err(e) => Err(e),
        };

        remove_if_exists(&tmp).await;
        result
    }

    async fn download(
        &self,
        locator: &str,
        url: &Url,
        dest: &Path,
        tmp: &Path,
        etags: &Mutex<EtagCache>,
    ) -> LoaderResult<SyncOutcome> {
        // A cached tag is only meaningful while the copy it describes exists.
        let etag = if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            locked(etags).get(locator)
        } else {
            None
        };

        match self.fetcher.fetch_to(url, etag.as_deref(), tmp).await? {
            FetchOutcome::NotModified => Ok(SyncOutcome::NotModified),
            FetchOutcome::Fetched { etag } => {
                tokio::fs::rename(tmp, dest).await?;
                locked(etags).set(locator, etag);
                tracing::info!("Downloaded {url}");
                Ok(SyncOutcome::Downloaded)
            }
        }
    }

    fn notify_failures(&self, failures: &[SyncFailure]) {
        let message = match failures {
            [only] => only.message.clone(),
            many => {
                let lines: Vec<&str> = many.iter().map(|f| f.message.as_str()).collect();
                format!(
                    "{} assets failed to update:\n{}",
                    many.len(),
                    lines.join("\n")
                )
            }
        };

        self.dialogs.show(Dialog {
            kind: DialogKind::SyncFailures,
            title: "Failed to update assets".to_string(),
            message,
            silenceable: false,
        });
    }
}

async fn copy_local(
    source: &Path,
    dest: &Path,
    tmp: &Path,
    force: bool,
) -> LoaderResult<SyncOutcome> {
    let source_mtime = tokio::fs::metadata(source).await?.modified()?;

    if !force {
        if let Ok(dest_mtime) = tokio::fs::metadata(dest).await.and_then(|m| m.modified()) {
            if dest_mtime + MTIME_TOLERANCE >= source_mtime {
                return Ok(SyncOutcome::UpToDate);
            }
        }
    }

    tokio::fs::copy(source, tmp).await?;
    tokio::fs::OpenOptions::new()
        .write(true)
        .open(tmp)
        .await?
        .sync_all()
        .await?;
    tokio::fs::rename(tmp, dest).await?;

    tracing::info!("Copied {} -> {}", source.display(), dest.display());
    Ok(SyncOutcome::Copied)
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed staging file {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove staging file {}: {e}", path.display()),
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}
