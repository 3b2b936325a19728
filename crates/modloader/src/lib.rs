//! Modloader: asset sync, script classification, patch compilation and bundle hijacking.

pub mod classify;
pub mod dialog;
pub mod hijack;
pub mod patch;
pub mod registry;
pub mod store;
pub mod sync;
pub mod types;
pub mod watch;

pub use classify::{partition, Classification, Classifier, ClassifierMarkers, SCAN_WINDOW};
pub use dialog::{Dialog, DialogChoice, DialogKind, Dialogs, LogDialogs};
pub use hijack::{hijack, HijackError, FACTORY_MARKER};
pub use patch::{compile, define, load_declarations, CompiledPatch, PatchDeclaration, Pattern};
pub use registry::PatchRegistry;
pub use store::{ConfigStore, JsonFileStore, MemoryStore};
pub use sync::{HttpFetcher, SyncEngine, SyncOutcome, SyncReport};
pub use types::*;
pub use watch::{StyleUpdate, StyleWatcher};
