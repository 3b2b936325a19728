//! Redirects the mod bundle's internal patch list to the shared global list.
//!
//! The bundle declares its patch list as an empty array right before the
//! symbol it uses to mark factories as already patched:
//!
//! ```text
//! p=[],m=Symbol("WebpackPatcher.originalFactory")
//! ```
//!
//! The marker string survives minification, so it serves as the anchor. Only a
//! small window around it is searched, and only the `[]` initializer is
//! rewritten. Any mismatch fails closed: the caller runs the bundle unmodified.

use std::sync::OnceLock;

use regex::Regex;

use crate::patch::PATCH_LIST_PATH;

/// Marker string inside the bundle's "factory already patched" symbol.
pub const FACTORY_MARKER: &str = "WebpackPatcher.originalFactory";

/// Bytes searched before the anchor.
const WINDOW_BEFORE: usize = 256;
/// Bytes searched after the anchor.
const WINDOW_AFTER: usize = 64;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HijackError {
    #[error("factory marker \"WebpackPatcher.originalFactory\" not found in bundle")]
    AnchorNotFound,

    #[error("patch list declaration not found near factory marker at byte {offset}")]
    PatternNotFound { offset: usize },
}

fn declaration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let source = format!(
            concat!(
                r"[A-Za-z_$][\w$]*\s*=\s*(?P<init>\[\])\s*[,;]\s*",
                r"(?:(?:var|let|const)\s+)?[A-Za-z_$][\w$]*\s*=\s*",
                r#"Symbol\(\s*["'`]{}["'`]\s*\)"#,
            ),
            regex::escape(FACTORY_MARKER)
        );
        Regex::new(&source).expect("valid regex")
    })
}

/// The text the `[]` initializer is replaced with.
pub fn list_alias() -> String {
    format!("{PATCH_LIST_PATH}={PATCH_LIST_PATH}||[]")
}

/// Rewrite the bundle so its patch list aliases the shared global list.
///
/// Everything outside the rewritten initializer is returned byte-identical.
pub fn hijack(bundle: &str) -> Result<String, HijackError> {
    let Some(anchor) = bundle.find(FACTORY_MARKER) else {
        tracing::error!("Cannot install patch hook: {}", HijackError::AnchorNotFound);
        return Err(HijackError::AnchorNotFound);
    };

    let start = floor_boundary(bundle, anchor.saturating_sub(WINDOW_BEFORE));
    let end = ceil_boundary(bundle, anchor + FACTORY_MARKER.len() + WINDOW_AFTER);
    let window = &bundle[start..end];

    let Some(init) = declaration_pattern()
        .captures(window)
        .and_then(|caps| caps.name("init"))
    else {
        let err = HijackError::PatternNotFound { offset: anchor };
        tracing::error!(
            "Cannot install patch hook, bundle layout changed: {err}. Near: {:?}",
            window
        );
        return Err(err);
    };

    let alias = list_alias();
    let splice_start = start + init.start();
    let splice_end = start + init.end();

    let mut out = String::with_capacity(bundle.len() + alias.len());
    out.push_str(&bundle[..splice_start]);
    out.push_str(&alias);
    out.push_str(&bundle[splice_end..]);

    tracing::info!("Installed patch hook at byte {splice_start}");
    Ok(out)
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet() -> String {
        format!("p=[],m=Symbol(\"{FACTORY_MARKER}\")")
    }

    #[test]
    fn test_rewrites_minimal_snippet() {
        let out = hijack(&snippet()).unwrap();
        assert_eq!(
            out,
            format!(
                "p={PATCH_LIST_PATH}={PATCH_LIST_PATH}||[],m=Symbol(\"{FACTORY_MARKER}\")"
            )
        );
    }

    #[test]
    fn test_surrounding_text_is_byte_identical() {
        let prefix = format!("!function(){{{}var q=1;", "a".repeat(5000));
        let suffix = format!(";function w(){{return m}}{}}}();", "b".repeat(5000));
        let bundle = format!("{prefix}{}{suffix}", snippet());

        let out = hijack(&bundle).unwrap();

        assert!(out.starts_with(&format!("{prefix}p=")));
        assert!(out.ends_with(&format!(",m=Symbol(\"{FACTORY_MARKER}\"){suffix}")));
        assert_eq!(out.len(), bundle.len() - 2 + list_alias().len());
    }

    #[test]
    fn test_declarator_keywords_and_whitespace() {
        for bundle in [
            format!("const p = [];\nlet m = Symbol('{FACTORY_MARKER}');"),
            format!("var p=[];var m=Symbol(\"{FACTORY_MARKER}\")"),
            format!("$p=[], _m=Symbol(`{FACTORY_MARKER}`)"),
        ] {
            let out = hijack(&bundle).unwrap();
            assert!(out.contains(&list_alias()), "not rewritten: {bundle}");
            assert!(out.contains(FACTORY_MARKER));
        }

        let out = hijack(&format!("const p = [];\nlet m = Symbol('{FACTORY_MARKER}');")).unwrap();
        assert_eq!(
            out,
            format!("const p = {};\nlet m = Symbol('{FACTORY_MARKER}');", list_alias())
        );
    }

    #[test]
    fn test_missing_anchor_fails_closed() {
        assert_eq!(
            hijack("p=[],m=Symbol(\"something.else\")"),
            Err(HijackError::AnchorNotFound)
        );
    }

    #[test]
    fn test_anchor_without_pattern_fails_closed() {
        let cases = [
            format!("p=[1],m=Symbol(\"{FACTORY_MARKER}\")"),
            format!("p=[];foo();m=Symbol(\"{FACTORY_MARKER}\")"),
            format!("log(\"{FACTORY_MARKER}\")"),
        ];
        for bundle in cases {
            assert!(
                matches!(hijack(&bundle), Err(HijackError::PatternNotFound { .. })),
                "expected failure for {bundle}"
            );
        }
    }

    #[test]
    fn test_declaration_outside_window_is_not_matched() {
        // The real declaration sits next to a second marker occurrence past the window.
        let bundle = format!(
            "x(\"{FACTORY_MARKER}\");{}p=[],m=Symbol(\"{FACTORY_MARKER}\")",
            " ".repeat(WINDOW_AFTER + 10)
        );
        assert!(matches!(
            hijack(&bundle),
            Err(HijackError::PatternNotFound { offset: 3 })
        ));
    }

    #[test]
    fn test_multibyte_text_around_window_edges() {
        let bundle = format!(
            "{}{}{}",
            "é".repeat(WINDOW_BEFORE),
            snippet(),
            "ü".repeat(WINDOW_AFTER)
        );
        let out = hijack(&bundle).unwrap();
        assert!(out.contains(&list_alias()));
        assert!(out.starts_with(&"é".repeat(WINDOW_BEFORE)));
    }
}
