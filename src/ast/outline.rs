//! `extractOutline` / `extractImports` / `extractExports` /
//! `extractExtensionPoints` — §4.8.
//!
//! Each extraction walks the tree once with a language-specific tree-sitter
//! query, then post-processes captures into the shared [`crate::models`]
//! shapes. Outline nesting (methods under their class, for example) is
//! recovered generically from byte-range containment rather than per
//! language, since every grammar nests child definitions inside the parent
//! node's span.

use super::Language;
use crate::models::{ExtensionPoint, ImportKind, ImportRef, OutlineSymbol, SymbolKind};
use tree_sitter::{Query, QueryCursor, StreamingIterator};

struct FlatSymbol {
    kind: SymbolKind,
    name: String,
    signature: String,
    start_byte: usize,
    end_byte: usize,
    start_line: i64,
    end_line: i64,
    exported: bool,
}

fn outline_query(language: Language) -> &'static str {
    match language {
        Language::Rust => {
            r#"
            (function_item name: (identifier) @name) @def.function
            (struct_item name: (type_identifier) @name) @def.class
            (enum_item name: (type_identifier) @name) @def.enum
            (trait_item name: (type_identifier) @name) @def.interface
            (impl_item type: (type_identifier) @name) @def.class
            "#
        }
        Language::JavaScript | Language::Tsx => {
            r#"
            (function_declaration name: (identifier) @name) @def.function
            (class_declaration name: (identifier) @name) @def.class
            (method_definition name: (property_identifier) @name) @def.method
            "#
        }
        Language::TypeScript => {
            r#"
            (function_declaration name: (identifier) @name) @def.function
            (class_declaration name: (identifier) @name) @def.class
            (method_definition name: (property_identifier) @name) @def.method
            (interface_declaration name: (type_identifier) @name) @def.interface
            (type_alias_declaration name: (type_identifier) @name) @def.type
            "#
        }
        Language::Python => {
            r#"
            (function_definition name: (identifier) @name) @def.function
            (class_definition name: (identifier) @name) @def.class
            "#
        }
        Language::Go => {
            r#"
            (function_declaration name: (identifier) @name) @def.function
            (method_declaration name: (field_identifier) @name) @def.method
            (type_spec name: (type_identifier) @name type: (interface_type)) @def.interface
            (type_spec name: (type_identifier) @name type: (struct_type)) @def.class
            "#
        }
        Language::Java => {
            r#"
            (class_declaration name: (identifier) @name) @def.class
            (interface_declaration name: (identifier) @name) @def.interface
            (method_declaration name: (identifier) @name) @def.method
            (enum_declaration name: (identifier) @name) @def.enum
            "#
        }
    }
}

fn kind_from_capture(name: &str) -> Option<SymbolKind> {
    match name {
        "def.function" => Some(SymbolKind::Function),
        "def.class" => Some(SymbolKind::Class),
        "def.method" => Some(SymbolKind::Method),
        "def.interface" => Some(SymbolKind::Interface),
        "def.type" => Some(SymbolKind::Type),
        "def.enum" => Some(SymbolKind::Enum),
        _ => None,
    }
}

/// Heuristic visibility check: scan the raw bytes immediately preceding the
/// definition for a language's export/visibility keyword, and for Go, fall
/// back to the identifier-capitalization convention.
fn is_exported(language: Language, name: &str, source: &[u8], start_byte: usize) -> bool {
    match language {
        Language::Go => name.chars().next().is_some_and(|c| c.is_uppercase()),
        _ => {
            let window_start = start_byte.saturating_sub(64);
            let window = std::str::from_utf8(&source[window_start..start_byte]).unwrap_or("");
            match language {
                Language::Rust => window.trim_end().ends_with("pub") || window.contains("pub "),
                Language::Java => window.contains("public"),
                Language::JavaScript | Language::TypeScript | Language::Tsx => window.contains("export"),
                Language::Python => true,
                Language::Go => unreachable!(),
            }
        }
    }
}

pub fn extract_outline(language: Language, content: &str) -> Vec<OutlineSymbol> {
    let Some(tree) = super::parse(language, content) else {
        return Vec::new();
    };
    let source = content.as_bytes();
    let Ok(query) = Query::new(&language.ts_language(), outline_query(language)) else {
        return Vec::new();
    };
    let Some(name_idx) = query.capture_index_for_name("name") else {
        return Vec::new();
    };

    let mut flats = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        let mut name_node = None;
        let mut def_node = None;
        let mut def_kind = None;
        for capture in m.captures {
            if capture.index == name_idx {
                name_node = Some(capture.node);
            } else if let Some(k) = query
                .capture_names()
                .get(capture.index as usize)
                .and_then(|n| kind_from_capture(n))
            {
                def_node = Some(capture.node);
                def_kind = Some(k);
            }
        }
        let (Some(name_node), Some(def_node), Some(kind)) = (name_node, def_node, def_kind) else {
            continue;
        };
        let name = name_node.utf8_text(source).unwrap_or("").to_string();
        let signature = def_node
            .utf8_text(source)
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        let start = def_node.start_position();
        let end = def_node.end_position();
        let exported = is_exported(language, &name, source, def_node.start_byte());
        flats.push(FlatSymbol {
            kind,
            name,
            signature,
            start_byte: def_node.start_byte(),
            end_byte: def_node.end_byte(),
            start_line: (start.row + 1) as i64,
            end_line: (end.row + 1) as i64,
            exported,
        });
    }

    nest(flats)
}

/// Recover parent/child nesting from byte-range containment: sort by start
/// byte, then use a stack of open ranges to find each symbol's nearest
/// enclosing one.
fn nest(mut flats: Vec<FlatSymbol>) -> Vec<OutlineSymbol> {
    flats.sort_by_key(|f| (f.start_byte, std::cmp::Reverse(f.end_byte)));

    let mut roots: Vec<OutlineSymbol> = Vec::new();
    // Stack of mutable paths into `roots`, represented as index chains.
    let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();

    for flat in flats {
        while let Some((end_byte, _)) = stack.last() {
            if *end_byte <= flat.start_byte {
                stack.pop();
            } else {
                break;
            }
        }
        let symbol = OutlineSymbol {
            kind: flat.kind,
            name: flat.name,
            signature: Some(flat.signature),
            start_line: flat.start_line,
            end_line: flat.end_line,
            exported: flat.exported,
            children: Vec::new(),
        };

        if let Some((_, path)) = stack.last() {
            let mut node = &mut roots;
            let mut target_path = path.clone();
            let last = target_path.pop();
            for idx in &target_path {
                node = &mut node[*idx].children;
            }
            let insert_at = match last {
                Some(idx) => {
                    node[idx].children.push(symbol);
                    node[idx].children.len() - 1
                }
                None => {
                    node.push(symbol);
                    node.len() - 1
                }
            };
            let mut new_path = path.clone();
            new_path.push(insert_at);
            stack.push((flat.end_byte, new_path));
        } else {
            roots.push(symbol);
            stack.push((flat.end_byte, vec![roots.len() - 1]));
        }
    }

    roots
}

fn import_query(language: Language) -> Option<&'static str> {
    match language {
        Language::Rust => Some(
            r#"
            (use_declaration argument: (_) @path) @use
            (extern_crate_declaration name: (identifier) @path) @extern_crate
            "#,
        ),
        Language::JavaScript | Language::Tsx | Language::TypeScript => Some(
            r#"
            (import_statement source: (string) @path) @import
            (export_statement source: (string) @path) @export_from
            (call_expression function: (identifier) @fn arguments: (arguments (string) @path)) @call
            "#,
        ),
        Language::Python => Some(
            r#"
            (import_statement name: (dotted_name) @path) @import
            (import_from_statement module_name: (dotted_name) @path) @from
            "#,
        ),
        Language::Go => Some(r#"(import_spec path: (interpreted_string_literal) @path) @import"#),
        Language::Java => Some(r#"(import_declaration (scoped_identifier) @path) @import"#),
    }
}

pub fn extract_imports(language: Language, content: &str) -> Vec<ImportRef> {
    let Some(tree) = super::parse(language, content) else {
        return Vec::new();
    };
    let Some(query_src) = import_query(language) else {
        return Vec::new();
    };
    let source = content.as_bytes();
    let Ok(query) = Query::new(&language.ts_language(), query_src) else {
        return Vec::new();
    };
    let Some(path_idx) = query.capture_index_for_name("path") else {
        return Vec::new();
    };
    let fn_idx = query.capture_index_for_name("fn");

    let mut imports = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        let mut path_node = None;
        let mut tag = None;
        let mut fn_name = None;
        for capture in m.captures {
            if capture.index == path_idx {
                path_node = Some(capture.node);
            } else if Some(capture.index) == fn_idx {
                fn_name = capture.node.utf8_text(source).ok();
            } else if let Some(n) = query.capture_names().get(capture.index as usize) {
                tag = Some(*n);
            }
        }
        let Some(path_node) = path_node else { continue };
        let raw = path_node.utf8_text(source).unwrap_or("");
        let trimmed = raw.trim_matches(|c| c == '"' || c == '\'' || c == '`');
        let line = (path_node.start_position().row + 1) as i64;

        let kind = match (language, tag, fn_name) {
            (_, Some("call"), Some("require")) => ImportKind::Require,
            (_, Some("call"), Some("import")) => ImportKind::DynamicImport,
            (_, Some("call"), _) => continue,
            (Language::Rust, Some("use"), _) => ImportKind::RustUse,
            (Language::Rust, Some("extern_crate"), _) => ImportKind::RustExternCrate,
            (Language::Python, Some("import"), _) => ImportKind::PythonImport,
            (Language::Python, Some("from"), _) => ImportKind::PythonFrom,
            (Language::Go, Some("import"), _) => ImportKind::GoImport,
            (Language::Java, Some("import"), _) => ImportKind::JavaImport,
            (_, Some("export_from"), _) => ImportKind::ExportFrom,
            (_, Some("import"), _) => ImportKind::Import,
            _ => ImportKind::Import,
        };

        imports.push(ImportRef {
            kind,
            source: trimmed.to_string(),
            line,
            names: Vec::new(),
        });
    }
    imports
}

/// `export_statement` names for JS/TS, `__all__` string literals for Python,
/// capitalized top-level identifiers for Go, `pub` items for Rust, `public`
/// members for Java.
pub fn extract_exports(language: Language, content: &str) -> Vec<String> {
    match language {
        Language::Python => extract_python_dunder_all(content),
        _ => extract_outline(language, content)
            .into_iter()
            .filter(|s| s.exported)
            .map(|s| s.name)
            .collect(),
    }
}

fn extract_python_dunder_all(content: &str) -> Vec<String> {
    let Some(tree) = super::parse(Language::Python, content) else {
        return Vec::new();
    };
    let source = content.as_bytes();
    let Ok(query) = Query::new(
        &Language::Python.ts_language(),
        r#"
        (assignment
          left: (identifier) @target
          right: (list (string (string_content) @name)))
        "#,
    ) else {
        return Vec::new();
    };
    let Some(target_idx) = query.capture_index_for_name("target") else {
        return Vec::new();
    };
    let Some(name_idx) = query.capture_index_for_name("name") else {
        return Vec::new();
    };

    let mut names = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        let is_all = m
            .captures
            .iter()
            .any(|c| c.index == target_idx && c.node.utf8_text(source) == Ok("__all__"));
        if !is_all {
            continue;
        }
        for capture in m.captures {
            if capture.index == name_idx {
                if let Ok(text) = capture.node.utf8_text(source) {
                    names.push(text.to_string());
                }
            }
        }
    }
    names
}

fn extension_point_query(language: Language) -> Option<&'static str> {
    match language {
        Language::Go => Some(r#"(type_spec name: (type_identifier) @name type: (interface_type) @body) @def"#),
        Language::Rust => Some(r#"(trait_item name: (type_identifier) @name body: (declaration_list) @body) @def"#),
        Language::TypeScript => Some(r#"(interface_declaration name: (type_identifier) @name body: (interface_body) @body) @def"#),
        _ => None,
    }
}

pub fn extract_extension_points(language: Language, content: &str) -> Vec<ExtensionPoint> {
    let Some(query_src) = extension_point_query(language) else {
        return Vec::new();
    };
    let Some(tree) = super::parse(language, content) else {
        return Vec::new();
    };
    let source = content.as_bytes();
    let Ok(query) = Query::new(&language.ts_language(), query_src) else {
        return Vec::new();
    };
    let Some(name_idx) = query.capture_index_for_name("name") else {
        return Vec::new();
    };
    let Some(def_idx) = query.capture_index_for_name("def") else {
        return Vec::new();
    };

    let mut points = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        let mut name = None;
        let mut def_node = None;
        for capture in m.captures {
            if capture.index == name_idx {
                name = capture.node.utf8_text(source).ok();
            } else if capture.index == def_idx {
                def_node = Some(capture.node);
            }
        }
        let (Some(name), Some(def_node)) = (name, def_node) else { continue };
        let start = def_node.start_position();
        let end = def_node.end_position();
        let methods = method_names_within(def_node, source);
        points.push(ExtensionPoint {
            name: name.to_string(),
            kind: match language {
                Language::Go => "interface".to_string(),
                Language::Rust => "trait".to_string(),
                Language::TypeScript => "interface".to_string(),
                _ => "interface".to_string(),
            },
            start_line: (start.row + 1) as i64,
            end_line: (end.row + 1) as i64,
            methods,
        });
    }
    points
}

fn method_names_within<'a>(node: tree_sitter::Node<'a>, source: &'a [u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();
        if matches!(
            kind,
            "method_spec" | "function_signature_item" | "method_signature" | "property_signature"
        ) {
            if let Some(name_field) = child.child_by_field_name("name") {
                if let Ok(text) = name_field.utf8_text(source) {
                    out.push(text.to_string());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_outline_marks_pub_function_exported() {
        let src = "pub fn run() {}\nfn hidden() {}\n";
        let symbols = extract_outline(Language::Rust, src);
        assert_eq!(symbols.len(), 2);
        let run = symbols.iter().find(|s| s.name == "run").unwrap();
        assert!(run.exported);
        let hidden = symbols.iter().find(|s| s.name == "hidden").unwrap();
        assert!(!hidden.exported);
    }

    #[test]
    fn rust_imports_capture_use_paths() {
        let src = "use std::collections::HashMap;\nextern crate serde;\n";
        let imports = extract_imports(Language::Rust, src);
        assert_eq!(imports.len(), 2);
        assert!(imports.iter().any(|i| i.kind == ImportKind::RustExternCrate && i.source == "serde"));
    }

    #[test]
    fn go_identifiers_capitalized_are_exported() {
        let src = "package x\nfunc Public() {}\nfunc private() {}\n";
        let symbols = extract_outline(Language::Go, src);
        let public = symbols.iter().find(|s| s.name == "Public").unwrap();
        assert!(public.exported);
        let private = symbols.iter().find(|s| s.name == "private").unwrap();
        assert!(!private.exported);
    }

    #[test]
    fn python_dunder_all_drives_exports() {
        let src = "__all__ = [\"a\", \"b\"]\ndef a():\n    pass\ndef b():\n    pass\ndef c():\n    pass\n";
        let exports = extract_exports(Language::Python, src);
        assert_eq!(exports, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn typescript_interface_is_an_extension_point() {
        let src = "interface Shape {\n  area(): number;\n}\n";
        let points = extract_extension_points(Language::TypeScript, src);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "Shape");
    }
}
