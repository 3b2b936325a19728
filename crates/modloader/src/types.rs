//! Core data types shared by the sync engine, classifier and host bridge.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// A declared asset: one entry per desired mod, style or script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub name: String,
    pub locator: String,
}

impl AssetSpec {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }

    /// The on-disk filename this asset is synchronized to.
    pub fn filename(&self) -> String {
        format!(
            "{}{}",
            sanitize_name(&self.name),
            infer_extension(&self.locator)
        )
    }

    /// Whether the spec has a locator at all. Empty locators are disabled entries.
    pub fn is_enabled(&self) -> bool {
        !self.locator.trim().is_empty()
    }
}

/// Reduce an asset name to a filesystem-safe token.
///
/// ASCII alphanumerics, `-` and `_` survive; everything else becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// `.css` when the locator's path ends in `.css`, `.js` otherwise.
pub fn infer_extension(locator: &str) -> &'static str {
    let path = locator
        .trim()
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    if path.to_ascii_lowercase().ends_with(".css") {
        ".css"
    } else {
        ".js"
    }
}

/// Where an asset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Network(Url),
    File(PathBuf),
}

impl Locator {
    /// Parse a raw locator string.
    ///
    /// `http(s)://` is a network locator; `file://` URLs and bare paths are local files.
    pub fn parse(raw: &str) -> LoaderResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LoaderError::InvalidLocator("empty locator".to_string()));
        }

        match Url::parse(trimmed) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Locator::Network(url)),
                "file" => url
                    .to_file_path()
                    .map(Locator::File)
                    .map_err(|_| LoaderError::InvalidLocator(trimmed.to_string())),
                // Windows drive letters parse as a one-letter scheme.
                scheme if scheme.len() == 1 => Ok(Locator::File(PathBuf::from(trimmed))),
                scheme => Err(LoaderError::InvalidLocator(format!(
                    "unsupported scheme '{scheme}' in {trimmed}"
                ))),
            },
            Err(_) => Ok(Locator::File(PathBuf::from(trimmed))),
        }
    }
}

/// A `(filename, content)` pair handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTuple(pub String, pub String);

impl AssetTuple {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self(filename.into(), content.into())
    }

    pub fn filename(&self) -> &str {
        &self.0
    }

    pub fn content(&self) -> &str {
        &self.1
    }
}

/// Execution role assigned to a script by content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptRole {
    Pre,
    ModBundle,
    Post,
    Other,
}

impl ScriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptRole::Pre => "pre",
            ScriptRole::ModBundle => "modBundle",
            ScriptRole::Post => "post",
            ScriptRole::Other => "other",
        }
    }
}

impl std::fmt::Display for ScriptRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scripts partitioned into ordered execution roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptContainer {
    pub pre: Option<AssetTuple>,
    pub mod_bundle: Option<AssetTuple>,
    pub post: Option<AssetTuple>,
    pub others: Vec<AssetTuple>,
}

impl ScriptContainer {
    /// Critical roles that have no file assigned, in load order.
    pub fn missing_roles(&self) -> Vec<ScriptRole> {
        let mut missing = Vec::new();
        if self.pre.is_none() {
            missing.push(ScriptRole::Pre);
        }
        if self.mod_bundle.is_none() {
            missing.push(ScriptRole::ModBundle);
        }
        if self.post.is_none() {
            missing.push(ScriptRole::Post);
        }
        missing
    }

    /// Every script in the container regardless of role.
    pub fn all(&self) -> impl Iterator<Item = &AssetTuple> {
        self.pre
            .iter()
            .chain(self.mod_bundle.iter())
            .chain(self.post.iter())
            .chain(self.others.iter())
    }
}

/// Everything the host loads for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedAssets {
    pub scripts: ScriptContainer,
    pub styles: Vec<AssetTuple>,
}

/// Errors that can occur in the loader library.
#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Convenience result type.
pub type LoaderResult<T> = Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My Theme!"), "My_Theme_");
        assert_eq!(sanitize_name("ok-name_1"), "ok-name_1");
        assert_eq!(sanitize_name("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_name(""), "_");
    }

    #[test]
    fn test_infer_extension() {
        assert_eq!(infer_extension("https://cdn.example.com/theme.css"), ".css");
        assert_eq!(infer_extension("https://cdn.example.com/theme.CSS?v=3"), ".css");
        assert_eq!(infer_extension("https://cdn.example.com/bundle.js"), ".js");
        assert_eq!(infer_extension("https://cdn.example.com/style"), ".js");
        assert_eq!(infer_extension("/home/me/quickcss.css"), ".css");
    }

    #[test]
    fn test_filename_combines_name_and_extension() {
        let spec = AssetSpec::new("dark theme", "https://x.test/a/dark.css#top");
        assert_eq!(spec.filename(), "dark_theme.css");
    }

    #[test]
    fn test_locator_parse() {
        assert!(matches!(
            Locator::parse("https://x.test/b.js").unwrap(),
            Locator::Network(_)
        ));
        assert_eq!(
            Locator::parse("/tmp/b.js").unwrap(),
            Locator::File(PathBuf::from("/tmp/b.js"))
        );
        assert!(matches!(
            Locator::parse("file:///tmp/b.js").unwrap(),
            Locator::File(_)
        ));
        assert!(Locator::parse("  ").is_err());
        assert!(Locator::parse("ftp://x.test/b.js").is_err());
    }

    #[test]
    fn test_missing_roles() {
        let mut container = ScriptContainer::default();
        assert_eq!(
            container.missing_roles(),
            vec![ScriptRole::Pre, ScriptRole::ModBundle, ScriptRole::Post]
        );
        container.mod_bundle = Some(AssetTuple::new("b.js", ""));
        assert_eq!(
            container.missing_roles(),
            vec![ScriptRole::Pre, ScriptRole::Post]
        );
    }

    #[test]
    fn test_container_serializes_in_host_shape() {
        let container = ScriptContainer {
            mod_bundle: Some(AssetTuple::new("bundle.js", "x")),
            ..Default::default()
        };
        let value = serde_json::to_value(&container).unwrap();
        assert_eq!(value["modBundle"], serde_json::json!(["bundle.js", "x"]));
        assert!(value["pre"].is_null());
        assert_eq!(value["others"], serde_json::json!([]));
    }
}
