//! AST Core (AC) — §4.8.
//!
//! A single tree-sitter driver over `{ javascript, typescript, tsx, python,
//! go, java, rust }`. Grammars are linked in statically (native, not WASM —
//! see the open-question note in the design doc) and a fresh [`Parser`] is
//! created per call; parsing a single file is cheap next to the I/O around
//! it, so there is no pooling. Grounded on the tree-sitter query/capture
//! idiom (`Query` + `QueryCursor` + `StreamingIterator`) used throughout the
//! pack's AST-based validators.

pub mod callgraph;
pub mod complexity;
pub mod outline;

use crate::models::FileFacts;
use std::collections::BTreeMap;
use std::path::Path;
use tree_sitter::{Language as TsLanguage, Parser, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
    Python,
    Go,
    Java,
    Rust,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Some(match ext {
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "py" | "pyi" => Language::Python,
            "go" => Language::Go,
            "java" => Language::Java,
            "rs" => Language::Rust,
            _ => return None,
        })
    }

    pub fn ts_language(self) -> TsLanguage {
        match self {
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }
}

/// Parse `content` with the grammar for `language`. Returns `None` only if
/// the grammar itself fails to load; a syntactically broken file still
/// yields a tree with ERROR nodes, which callers are free to walk.
pub fn parse(language: Language, content: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&language.ts_language()).ok()?;
    parser.parse(content, None)
}

/// Run every extractor for one file and bundle the results into the shape
/// written to `analysis/FACTS.json`. Returns `None` for files whose
/// extension isn't one of the seven supported languages.
pub fn analyze_file(path: &Path, content: &str) -> Option<FileFacts> {
    let language = Language::from_path(path)?;
    let outline = outline::extract_outline(language, content);
    let imports = outline::extract_imports(language, content);
    let exports = outline::extract_exports(language, content);
    let extension_points = outline::extract_extension_points(language, content);
    let complexity: BTreeMap<String, crate::models::ComplexityFacts> =
        complexity::compute(language, content).into_iter().collect();

    Some(FileFacts {
        path: path.to_string_lossy().to_string(),
        language: format!("{language:?}").to_lowercase(),
        outline,
        imports,
        exports,
        extension_points,
        complexity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_language_from_extension() {
        assert_eq!(Language::from_path(&PathBuf::from("a/b.rs")), Some(Language::Rust));
        assert_eq!(Language::from_path(&PathBuf::from("a/b.tsx")), Some(Language::Tsx));
        assert_eq!(Language::from_path(&PathBuf::from("a/b.unknown")), None);
    }

    #[test]
    fn parses_trivial_rust_source() {
        let tree = parse(Language::Rust, "fn main() {}").unwrap();
        assert_eq!(tree.root_node().kind(), "source_file");
        assert!(!tree.root_node().has_error());
    }
}
