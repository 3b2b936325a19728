//! Patch declarations and their compilation into the shape the bundle's patch loader expects.
//!
//! Declarations describe "find this in the target bundle, then within it replace
//! text matching this pattern". Minified identifiers change between builds, so
//! patterns may use the `\i` macro, which expands to a generic identifier class.
//! Replacement strings may reference `$self`, which is rewritten to the helper
//! namespace the generated script installs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::LoaderResult;

/// Identifier every compiled patch is tagged with.
pub const PLUGIN_ID: &str = "ModLoader";

/// Global object holding per-plugin helper namespaces.
pub const GLOBAL_NAMESPACE: &str = "globalThis.__MODLOADER__";

/// Path `$self` is rewritten to.
pub const HELPERS_PATH: &str = "globalThis.__MODLOADER__.plugins.ModLoader";

/// Shared list the bundle's own patch loader reads.
pub const PATCH_LIST_PATH: &str = "globalThis.__MODLOADER_PATCHES__";

/// Macro token for "any identifier".
pub const IDENT_MACRO: &str = r"\i";

/// What `\i` expands to.
pub const IDENT_PATTERN: &str = r"(?:[A-Za-z_$][\w$]*)";

const SELF_TOKEN: &str = "$self";

/// A find/match pattern. Regexes travel as source and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    Literal(String),
    Regex {
        #[serde(rename = "regex")]
        source: String,
        #[serde(default)]
        flags: String,
    },
}

impl Pattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Pattern::Literal(text.into())
    }

    pub fn regex(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Pattern::Regex {
            source: source.into(),
            flags: flags.into(),
        }
    }

    /// Expand every `\i` macro.
    pub fn expand(&self) -> Self {
        match self {
            Pattern::Literal(text) => Pattern::Literal(expand_macros(text)),
            Pattern::Regex { source, flags } => Pattern::Regex {
                source: expand_macros(source),
                flags: flags.clone(),
            },
        }
    }
}

/// Replacement value: literal text or the source of a JS function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplaceValue {
    Text(String),
    Function {
        #[serde(rename = "function")]
        source: String,
    },
}

impl ReplaceValue {
    pub fn function(source: impl Into<String>) -> Self {
        ReplaceValue::Function {
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    #[serde(rename = "match")]
    pub pattern: Pattern,
    pub replace: ReplaceValue,
}

impl Replacement {
    pub fn new(pattern: Pattern, replace: ReplaceValue) -> Self {
        Self { pattern, replace }
    }
}

/// One replacement or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Replacements {
    One(Replacement),
    Many(Vec<Replacement>),
}

impl Replacements {
    pub fn to_vec(&self) -> Vec<Replacement> {
        match self {
            Replacements::One(r) => vec![r.clone()],
            Replacements::Many(rs) => rs.clone(),
        }
    }
}

impl From<Replacement> for Replacements {
    fn from(r: Replacement) -> Self {
        Replacements::One(r)
    }
}

impl From<Vec<Replacement>> for Replacements {
    fn from(rs: Vec<Replacement>) -> Self {
        Replacements::Many(rs)
    }
}

/// A statically authored patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDeclaration {
    pub find: Pattern,
    pub replacement: Replacements,
    /// Helper name -> JS source, installed under `$self`.
    #[serde(default)]
    pub helpers: BTreeMap<String, String>,
    /// Registered only when absent or returning true.
    #[serde(skip)]
    pub condition: Option<fn() -> bool>,
}

impl PatchDeclaration {
    pub fn new(find: Pattern, replacement: impl Into<Replacements>) -> Self {
        Self {
            find,
            replacement: replacement.into(),
            helpers: BTreeMap::new(),
            condition: None,
        }
    }

    pub fn with_helper(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.helpers.insert(name.into(), source.into());
        self
    }

    pub fn with_condition(mut self, condition: fn() -> bool) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.condition.map_or(true, |f| f())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledReplacement {
    #[serde(rename = "match")]
    pub pattern: Pattern,
    pub replace: ReplaceValue,
}

/// A declaration after macro expansion and helper linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPatch {
    pub plugin: String,
    pub find: Pattern,
    pub replacement: Vec<CompiledReplacement>,
}

/// Identity; exists so declarations read uniformly at the definition site.
pub fn define(declaration: PatchDeclaration) -> PatchDeclaration {
    declaration
}

/// Replace every `\i` with the identifier pattern.
pub fn expand_macros(text: &str) -> String {
    text.replace(IDENT_MACRO, IDENT_PATTERN)
}

/// Expand macros, link `$self`, and tag with the plugin id.
pub fn compile(declaration: &PatchDeclaration) -> CompiledPatch {
    let replacement = declaration
        .replacement
        .to_vec()
        .into_iter()
        .map(|r| CompiledReplacement {
            pattern: r.pattern.expand(),
            replace: match r.replace {
                ReplaceValue::Text(text) => {
                    ReplaceValue::Text(text.replace(SELF_TOKEN, HELPERS_PATH))
                }
                function @ ReplaceValue::Function { .. } => function,
            },
        })
        .collect();

    CompiledPatch {
        plugin: PLUGIN_ID.to_string(),
        find: declaration.find.expand(),
        replacement,
    }
}

/// Load declarations from every `*.json` file in `dir`, in filename order.
///
/// A file may hold one declaration or an array. Unreadable or malformed files
/// are logged and skipped.
pub fn load_declarations(dir: &Path) -> LoaderResult<Vec<PatchDeclaration>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(PatchDeclaration),
        Many(Vec<PatchDeclaration>),
    }

    if !dir.exists() {
        tracing::debug!("No patch directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut declarations = Vec::new();
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<OneOrMany>(&raw).map_err(|e| e.to_string()));

        match parsed {
            Ok(OneOrMany::One(decl)) => declarations.push(decl),
            Ok(OneOrMany::Many(decls)) => declarations.extend(decls),
            Err(e) => tracing::error!("Skipping patch file {}: {e}", path.display()),
        }
    }

    tracing::info!("Loaded {} patch declarations from {}", declarations.len(), dir.display());
    Ok(declarations)
}
