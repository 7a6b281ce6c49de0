//! Evidence-grounded dependency graph (§6 `preflight_evidence_dependency_graph`).
//!
//! Not a full module-resolution pass — no per-language resolver is wired up
//! here. Edges are derived from [`crate::ast::outline::extract_imports`]'s
//! parsed import statements, matched against sibling files in the same repo
//! by stem/path heuristics — the same "exact where possible, heuristic
//! otherwise" posture [`crate::ast::callgraph`] takes for call edges.

use crate::ast::{outline, Language};
use crate::models::EdgeMethod;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub method: EdgeMethod,
    pub via: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DependencyGraph {
    pub target: String,
    pub depends_on: Vec<DependencyEdge>,
    pub depended_on_by: Vec<DependencyEdge>,
}

/// Build the dependency graph for `target_rel_path` (a bundle-relative path
/// under `repos/<id>/norm/...`) by scanning every source file in the same
/// repo's `norm/` tree.
pub fn build(bundle_root: &Path, target_rel_path: &str) -> anyhow::Result<DependencyGraph> {
    let repo_norm_root = match repo_norm_root(target_rel_path) {
        Some(r) => r,
        None => return Ok(DependencyGraph { target: target_rel_path.to_string(), ..Default::default() }),
    };

    let mut files: Vec<(String, String)> = Vec::new();
    for entry in walkdir::WalkDir::new(bundle_root.join(&repo_norm_root)).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let abs = entry.path();
        if Language::from_path(abs).is_none() {
            continue;
        }
        let Ok(rel) = abs.strip_prefix(bundle_root) else { continue };
        let Ok(content) = std::fs::read_to_string(abs) else { continue };
        files.push((rel.to_string_lossy().replace('\\', "/"), content));
    }

    let mut graph = DependencyGraph { target: target_rel_path.to_string(), ..Default::default() };

    if let Some((_, content)) = files.iter().find(|(p, _)| p == target_rel_path) {
        if let Some(language) = Language::from_path(Path::new(target_rel_path)) {
            for import in outline::extract_imports(language, content) {
                if let Some(resolved) = resolve_import(&files, &import.source) {
                    if resolved != target_rel_path {
                        graph.depends_on.push(DependencyEdge {
                            from: target_rel_path.to_string(),
                            to: resolved,
                            method: EdgeMethod::Heuristic,
                            via: import.source,
                        });
                    }
                }
            }
        }
    }

    for (path, content) in &files {
        if path == target_rel_path {
            continue;
        }
        let Some(language) = Language::from_path(Path::new(path)) else { continue };
        for import in outline::extract_imports(language, content) {
            if resolve_import(&files, &import.source).as_deref() == Some(target_rel_path) {
                graph.depended_on_by.push(DependencyEdge {
                    from: path.clone(),
                    to: target_rel_path.to_string(),
                    method: EdgeMethod::Heuristic,
                    via: import.source,
                });
            }
        }
    }

    Ok(graph)
}

/// `repos/<id>/norm` prefix of a bundle-relative path, or `None` if the
/// path doesn't look like a normalized repo file.
fn repo_norm_root(rel_path: &str) -> Option<String> {
    let parts: Vec<&str> = rel_path.split('/').collect();
    let norm_idx = parts.iter().position(|p| *p == "norm")?;
    if parts.first() != Some(&"repos") || norm_idx < 2 {
        return None;
    }
    Some(parts[..=norm_idx].join("/"))
}

/// Reduce an import source (`"./foo"`, `"../bar/baz"`, `"crate::foo::bar"`,
/// `"package.module"`) to a list of candidate module segments, trailing
/// segment first (the common case for `./foo/bar` style imports) then
/// working backwards (for `crate::module::item` style imports, where the
/// last segment names an item rather than a file). The first segment that
/// matches exactly one indexed file's stem wins; an ambiguous or wholly
/// unmatched import resolves to `None` rather than guessing.
fn resolve_import(files: &[(String, String)], import_source: &str) -> Option<String> {
    let segments: Vec<&str> = import_source
        .split(['/', '.', ':'])
        .filter(|s| !s.is_empty() && *s != "crate" && *s != "self" && *s != "super")
        .collect();

    for stem in segments.iter().rev() {
        let mut matches: Vec<&str> = files
            .iter()
            .filter(|(path, _)| {
                Path::new(path).file_stem().and_then(|s| s.to_str()).map(|s| s.eq_ignore_ascii_case(stem)).unwrap_or(false)
            })
            .map(|(path, _)| path.as_str())
            .collect();
        if matches.len() == 1 {
            return Some(matches.remove(0).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolves_direct_import_between_two_files_in_the_same_repo() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("repos/x__y/norm/src/a.rs");
        let b = root.join("repos/x__y/norm/src/b.rs");
        std::fs::create_dir_all(a.parent().unwrap()).unwrap();
        std::fs::write(&a, "use crate::b::helper;\nfn main() { helper(); }\n").unwrap();
        std::fs::write(&b, "pub fn helper() {}\n").unwrap();

        let graph = build(root, "repos/x__y/norm/src/a.rs").unwrap();
        assert_eq!(graph.depends_on.len(), 1);
        assert_eq!(graph.depends_on[0].to, "repos/x__y/norm/src/b.rs");

        let reverse = build(root, "repos/x__y/norm/src/b.rs").unwrap();
        assert_eq!(reverse.depended_on_by.len(), 1);
        assert_eq!(reverse.depended_on_by[0].from, "repos/x__y/norm/src/a.rs");
    }

    #[test]
    fn unmatched_import_produces_no_edge() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("repos/x__y/norm/src/a.rs");
        std::fs::create_dir_all(a.parent().unwrap()).unwrap();
        std::fs::write(&a, "use std::collections::HashMap;\nfn main() {}\n").unwrap();

        let graph = build(root, "repos/x__y/norm/src/a.rs").unwrap();
        assert!(graph.depends_on.is_empty());
    }
}
