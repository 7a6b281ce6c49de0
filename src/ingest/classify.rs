//! Extension-based file classification (§4.3).

use crate::models::FileKind;
use std::path::Path;

const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "rst", "txt", "html", "pdf", "docx", "xlsx", "pptx"];

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "c", "h", "cc", "cpp",
    "hpp", "cs", "rb", "php", "swift", "scala", "sh", "bash", "yaml", "yml", "json", "toml",
];

pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    ".venv",
    "__pycache__",
    "dist",
    "build",
    "vendor",
    "target",
];

pub fn classify(path: &Path) -> FileKind {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if DOC_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Doc
    } else if CODE_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Code
    } else {
        FileKind::Asset
    }
}

pub fn is_ignored(rel: &Path) -> bool {
    rel.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        DEFAULT_IGNORE_DIRS.contains(&s.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(classify(Path::new("README.md")), FileKind::Doc);
        assert_eq!(classify(Path::new("main.rs")), FileKind::Code);
        assert_eq!(classify(Path::new("logo.png")), FileKind::Asset);
    }

    #[test]
    fn ignores_default_dirs() {
        assert!(is_ignored(Path::new("node_modules/pkg/index.js")));
        assert!(!is_ignored(Path::new("src/main.rs")));
    }
}
