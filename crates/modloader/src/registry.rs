//! The shared patch list and helper namespace, and the script that publishes them.
//!
//! The bundle's patch loader lives in another script with no import mechanism,
//! so everything crosses over through one generated fragment that runs before
//! the bundle: it installs the helpers and pushes every compiled patch onto the
//! global list, rebuilding regexes from their source and flags.

use std::collections::BTreeMap;

use crate::patch::{
    compile, CompiledPatch, Pattern, PatchDeclaration, ReplaceValue, GLOBAL_NAMESPACE,
    PATCH_LIST_PATH, PLUGIN_ID,
};

/// Append-only registry of compiled patches in registration order.
#[derive(Debug, Clone, Default)]
pub struct PatchRegistry {
    helpers: BTreeMap<String, String>,
    patches: Vec<CompiledPatch>,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append every enabled declaration. Returns how many were registered.
    pub fn register(&mut self, declarations: impl IntoIterator<Item = PatchDeclaration>) -> usize {
        let mut registered = 0;
        for declaration in declarations {
            if !declaration.is_enabled() {
                tracing::debug!("Skipping disabled patch for {:?}", declaration.find);
                continue;
            }

            for (name, source) in &declaration.helpers {
                if self.helpers.insert(name.clone(), source.clone()).is_some() {
                    tracing::warn!("Helper '{name}' redefined by a later patch");
                }
            }

            self.patches.push(compile(&declaration));
            registered += 1;
        }

        tracing::info!(
            "Registered {registered} patches ({} total, {} helpers)",
            self.patches.len(),
            self.helpers.len()
        );
        registered
    }

    pub fn patches(&self) -> &[CompiledPatch] {
        &self.patches
    }

    pub fn helpers(&self) -> &BTreeMap<String, String> {
        &self.helpers
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Generate the fragment the host runs before the mod bundle.
    pub fn to_script(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "// modloader patch registry: {} patches, {} helpers\n",
            self.patches.len(),
            self.helpers.len()
        ));
        out.push_str("(function () {\n");
        out.push_str(&format!(
            "  var ns = {GLOBAL_NAMESPACE} = {GLOBAL_NAMESPACE} || {{}};\n"
        ));
        out.push_str("  ns.plugins = ns.plugins || {};\n");
        out.push_str(&format!(
            "  var self = ns.plugins.{PLUGIN_ID} = ns.plugins.{PLUGIN_ID} || {{}};\n"
        ));

        for (name, source) in &self.helpers {
            out.push_str(&format!("  self[{}] = ({source});\n", js_string(name)));
        }

        out.push_str(&format!(
            "  var patches = {PATCH_LIST_PATH} = {PATCH_LIST_PATH} || [];\n"
        ));

        for patch in &self.patches {
            out.push_str("  patches.push({\n");
            out.push_str(&format!("    plugin: {},\n", js_string(&patch.plugin)));
            out.push_str(&format!("    find: {},\n", js_pattern(&patch.find)));
            out.push_str("    replacement: [\n");
            for replacement in &patch.replacement {
                out.push_str(&format!(
                    "      {{ match: {}, replace: {} }},\n",
                    js_pattern(&replacement.pattern),
                    js_replace(&replacement.replace)
                ));
            }
            out.push_str("    ]\n");
            out.push_str("  });\n");
        }

        out.push_str("})();\n");
        out
    }
}

/// A JSON string literal is a valid JS string literal.
fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn js_pattern(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Literal(text) => js_string(text),
        Pattern::Regex { source, flags } => {
            format!("new RegExp({}, {})", js_string(source), js_string(flags))
        }
    }
}

fn js_replace(replace: &ReplaceValue) -> String {
    match replace {
        ReplaceValue::Text(text) => js_string(text),
        ReplaceValue::Function { source } => format!("({source})"),
    }
}
