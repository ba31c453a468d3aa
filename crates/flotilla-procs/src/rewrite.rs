//! Source-import rewriting for the rename engine.
//!
//! The actual structural refactoring of application sources is an external
//! concern; [`SourceRewriter`] is the seam it plugs into. The shipped
//! backend, [`QuotedSpecifierRewriter`], scans quoted module specifiers on
//! import/require lines — enough for the specifier-only edits the rename
//! engine performs (it never touches bindings or identifiers).

use serde::{Deserialize, Serialize};

/// What kind of import site was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportChangeKind {
    /// `import ... from "x"` / `export ... from "x"` / `import "x"`.
    Import,
    /// `import("x")` / `require("x")`.
    DynamicImport,
}

/// One rewritten specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportChange {
    pub kind: ImportChangeKind,
    /// 1-indexed source line.
    pub line: usize,
    pub old: String,
    pub new: String,
}

/// Result of rewriting a single source file's content.
#[derive(Debug, Clone)]
pub struct RewrittenSource {
    pub content: String,
    pub changes: Vec<ImportChange>,
}

/// Rewrites module specifiers that name a package.
pub trait SourceRewriter: Send + Sync {
    /// Replace specifiers equal to `old_name`, or beginning with
    /// `old_name + "/"`, with `new_name` (preserving any subpath suffix).
    fn rewrite_imports(&self, content: &str, old_name: &str, new_name: &str) -> RewrittenSource;
}

/// Text-scanning rewriter over quoted specifiers.
#[derive(Debug, Default, Clone)]
pub struct QuotedSpecifierRewriter;

impl QuotedSpecifierRewriter {
    pub fn new() -> Self {
        Self
    }
}

/// Whether a line is an import site, and of which kind.
fn classify_line(line: &str) -> Option<ImportChangeKind> {
    let trimmed = line.trim_start();
    if line.contains("import(") || line.contains("require(") {
        return Some(ImportChangeKind::DynamicImport);
    }
    if trimmed.starts_with("import ")
        || trimmed.starts_with("import\"")
        || trimmed.starts_with("import'")
        || (trimmed.starts_with("export ") && line.contains(" from "))
    {
        return Some(ImportChangeKind::Import);
    }
    None
}

/// Rewrite every quoted specifier on `line` that matches the package name.
fn rewrite_line(
    line: &str,
    line_no: usize,
    kind: ImportChangeKind,
    old_name: &str,
    new_name: &str,
    changes: &mut Vec<ImportChange>,
) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find(['"', '\'']) {
        let quote = rest.as_bytes()[open] as char;
        out.push_str(&rest[..=open]);
        rest = &rest[open + 1..];

        let Some(close) = rest.find(quote) else {
            break;
        };
        let specifier = &rest[..close];

        let replacement = if specifier == old_name {
            Some(new_name.to_string())
        } else {
            specifier
                .strip_prefix(old_name)
                .filter(|suffix| suffix.starts_with('/'))
                .map(|suffix| format!("{new_name}{suffix}"))
        };

        match replacement {
            Some(new_spec) => {
                changes.push(ImportChange {
                    kind,
                    line: line_no,
                    old: specifier.to_string(),
                    new: new_spec.clone(),
                });
                out.push_str(&new_spec);
            }
            None => out.push_str(specifier),
        }
        out.push(quote);
        rest = &rest[close + 1..];
    }

    out.push_str(rest);
    out
}

impl SourceRewriter for QuotedSpecifierRewriter {
    fn rewrite_imports(&self, content: &str, old_name: &str, new_name: &str) -> RewrittenSource {
        let mut changes = Vec::new();
        let mut lines = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            match classify_line(line) {
                Some(kind) => lines.push(rewrite_line(
                    line,
                    idx + 1,
                    kind,
                    old_name,
                    new_name,
                    &mut changes,
                )),
                None => lines.push(line.to_string()),
            }
        }

        let mut content_out = lines.join("\n");
        if content.ends_with('\n') {
            content_out.push('\n');
        }

        RewrittenSource {
            content: content_out,
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_exact_and_subpath_imports() {
        let src = concat!(
            "import { a } from \"@eco/old\";\n",
            "import b from '@eco/old/util';\n",
            "import other from \"@eco/older\";\n",
        );
        let out = QuotedSpecifierRewriter::new().rewrite_imports(src, "@eco/old", "@eco/new");

        assert!(out.content.contains("\"@eco/new\""));
        assert!(out.content.contains("'@eco/new/util'"));
        assert!(out.content.contains("\"@eco/older\""), "no prefix bleed");
        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.changes[0].line, 1);
        assert_eq!(out.changes[1].old, "@eco/old/util");
    }

    #[test]
    fn test_rewrites_dynamic_import() {
        let src = "const m = await import(\"@eco/old\");\n";
        let out = QuotedSpecifierRewriter::new().rewrite_imports(src, "@eco/old", "@eco/new");
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].kind, ImportChangeKind::DynamicImport);
        assert!(out.content.contains("import(\"@eco/new\")"));
    }

    #[test]
    fn test_leaves_plain_strings_alone() {
        let src = "const label = \"@eco/old\";\n";
        let out = QuotedSpecifierRewriter::new().rewrite_imports(src, "@eco/old", "@eco/new");
        assert!(out.changes.is_empty());
        assert_eq!(out.content, src);
    }

    #[test]
    fn test_roundtrip_restores_original() {
        let src = "import { a } from \"@eco/old/deep/mod\";\n";
        let rewriter = QuotedSpecifierRewriter::new();
        let forward = rewriter.rewrite_imports(src, "@eco/old", "@eco/new");
        let back = rewriter.rewrite_imports(&forward.content, "@eco/new", "@eco/old");
        assert_eq!(back.content, src);
    }
}
