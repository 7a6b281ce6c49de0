//! Call-graph adapter (§4.8): `findReferences`, `getDefinition`,
//! `prepareCallHierarchy`, `getIncomingCalls`, `getOutgoingCalls`,
//! `getFileSymbols`.
//!
//! Built on tree-sitter outlines plus a name-resolution heuristic (match a
//! call's callee identifier text against a known symbol in the same file,
//! falling back to any same-named symbol in the graph) rather than a true
//! language-service host — the spec calls that out as the TS/JS-specific
//! path, which would need a `tsserver`-grade host this crate doesn't carry.
//! Cycle detection runs Tarjan's SCC algorithm over the resolved edges.

use super::Language;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tree_sitter::Node;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolId(pub String);

impl SymbolId {
    fn new(file: &str, name: &str) -> Self {
        SymbolId(format!("{file}::{name}"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallSymbol {
    pub id: SymbolId,
    pub name: String,
    pub file: String,
    pub start_line: i64,
    pub end_line: i64,
}

#[derive(Debug, Clone)]
pub struct CallHierarchyItem {
    pub symbol: CallSymbol,
    pub incoming: Vec<SymbolId>,
    pub outgoing: Vec<SymbolId>,
}

#[derive(Default)]
pub struct CallGraph {
    symbols: HashMap<SymbolId, CallSymbol>,
    by_name: HashMap<String, Vec<SymbolId>>,
    by_file: HashMap<String, Vec<SymbolId>>,
    /// caller -> callees
    edges: HashMap<SymbolId, Vec<SymbolId>>,
}

struct Rules {
    function_kinds: &'static [&'static str],
    name_field: &'static str,
    call_kinds: &'static [&'static str],
}

fn rules(language: Language) -> Rules {
    match language {
        Language::Rust => Rules {
            function_kinds: &["function_item"],
            name_field: "name",
            call_kinds: &["call_expression"],
        },
        Language::Python => Rules {
            function_kinds: &["function_definition"],
            name_field: "name",
            call_kinds: &["call"],
        },
        Language::Go => Rules {
            function_kinds: &["function_declaration", "method_declaration"],
            name_field: "name",
            call_kinds: &["call_expression"],
        },
        Language::Java => Rules {
            function_kinds: &["method_declaration", "constructor_declaration"],
            name_field: "name",
            call_kinds: &["method_invocation"],
        },
        Language::JavaScript | Language::Tsx | Language::TypeScript => Rules {
            function_kinds: &["function_declaration", "function_expression", "method_definition"],
            name_field: "name",
            call_kinds: &["call_expression"],
        },
    }
}

fn callee_name<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
    let target = node.child_by_field_name("function").or_else(|| node.child_by_field_name("name"))?;
    let text = target.utf8_text(source).ok()?;
    // `obj.method(...)` style callees: keep only the trailing identifier.
    text.rsplit(['.', ':']).next()
}

impl CallGraph {
    /// Index every function in `(file, language, content)` triples, then
    /// resolve call edges by matching callee identifiers against the
    /// symbol table built from all files passed in.
    pub fn build(files: &[(String, Language, String)]) -> Self {
        let mut graph = CallGraph::default();
        let mut bodies: Vec<(SymbolId, String, Language, usize, usize)> = Vec::new();

        for (file, language, content) in files {
            let rules = rules(*language);
            let Some(tree) = super::parse(*language, content) else { continue };
            collect_symbols(tree.root_node(), &rules, content.as_bytes(), file, *language, &mut graph, &mut bodies);
        }

        for (caller_id, file, language, start_byte, end_byte) in bodies {
            let Some(content) = files.iter().find(|(f, _, _)| f == &file).map(|(_, _, c)| c) else { continue };
            let Some(tree) = super::parse(language, content) else { continue };
            let rules = rules(language);
            let source = content.as_bytes();
            let root = tree.root_node();
            let Some(fn_node) = root.descendant_for_byte_range(start_byte, end_byte) else { continue };
            let mut callees = Vec::new();
            collect_calls(fn_node, &rules, source, &mut callees);

            let mut resolved = Vec::new();
            for name in callees {
                if let Some(id) = graph
                    .by_file
                    .get(&file)
                    .into_iter()
                    .flatten()
                    .find(|id| id.0.ends_with(&format!("::{name}")))
                    .cloned()
                    .or_else(|| graph.by_name.get(&name).and_then(|v| v.first()).cloned())
                {
                    resolved.push(id);
                }
            }
            graph.edges.entry(caller_id).or_default().extend(resolved);
        }

        graph
    }

    pub fn get_definition(&self, id: &SymbolId) -> Option<&CallSymbol> {
        self.symbols.get(id)
    }

    pub fn get_file_symbols(&self, file: &str) -> Vec<&CallSymbol> {
        self.by_file
            .get(file)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbols.get(id))
            .collect()
    }

    pub fn get_outgoing_calls(&self, id: &SymbolId) -> Vec<SymbolId> {
        self.edges.get(id).cloned().unwrap_or_default()
    }

    pub fn get_incoming_calls(&self, id: &SymbolId) -> Vec<SymbolId> {
        self.edges
            .iter()
            .filter(|(_, callees)| callees.contains(id))
            .map(|(caller, _)| caller.clone())
            .collect()
    }

    pub fn find_references(&self, id: &SymbolId) -> Vec<SymbolId> {
        self.get_incoming_calls(id)
    }

    pub fn prepare_call_hierarchy(&self, id: &SymbolId) -> Option<CallHierarchyItem> {
        let symbol = self.symbols.get(id)?.clone();
        Some(CallHierarchyItem {
            symbol,
            incoming: self.get_incoming_calls(id),
            outgoing: self.get_outgoing_calls(id),
        })
    }

    /// Tarjan's strongly-connected-components algorithm, returning every
    /// SCC of size > 1 (a true cycle) plus any single-node self-loop.
    pub fn detect_cycles(&self) -> Vec<Vec<SymbolId>> {
        let mut index_counter = 0usize;
        let mut stack = Vec::new();
        let mut on_stack = HashSet::new();
        let mut indices: HashMap<SymbolId, usize> = HashMap::new();
        let mut lowlink: HashMap<SymbolId, usize> = HashMap::new();
        let mut sccs = Vec::new();

        fn strong_connect(
            v: &SymbolId,
            graph: &CallGraph,
            index_counter: &mut usize,
            stack: &mut Vec<SymbolId>,
            on_stack: &mut HashSet<SymbolId>,
            indices: &mut HashMap<SymbolId, usize>,
            lowlink: &mut HashMap<SymbolId, usize>,
            sccs: &mut Vec<Vec<SymbolId>>,
        ) {
            indices.insert(v.clone(), *index_counter);
            lowlink.insert(v.clone(), *index_counter);
            *index_counter += 1;
            stack.push(v.clone());
            on_stack.insert(v.clone());

            for w in graph.edges.get(v).into_iter().flatten() {
                if !indices.contains_key(w) {
                    strong_connect(w, graph, index_counter, stack, on_stack, indices, lowlink, sccs);
                    let wl = lowlink[w];
                    let vl = lowlink[v];
                    lowlink.insert(v.clone(), vl.min(wl));
                } else if on_stack.contains(w) {
                    let wi = indices[w];
                    let vl = lowlink[v];
                    lowlink.insert(v.clone(), vl.min(wi));
                }
            }

            if lowlink[v] == indices[v] {
                let mut component = Vec::new();
                loop {
                    let w = stack.pop().unwrap();
                    on_stack.remove(&w);
                    let is_v = w == *v;
                    component.push(w);
                    if is_v {
                        break;
                    }
                }
                if component.len() > 1
                    || component
                        .first()
                        .is_some_and(|n| graph.edges.get(n).is_some_and(|e| e.contains(n)))
                {
                    sccs.push(component);
                }
            }
        }

        let ids: Vec<SymbolId> = self.symbols.keys().cloned().collect();
        for v in &ids {
            if !indices.contains_key(v) {
                strong_connect(v, self, &mut index_counter, &mut stack, &mut on_stack, &mut indices, &mut lowlink, &mut sccs);
            }
        }
        sccs
    }

    /// Serializable snapshot written to `analysis/CALL_GRAPH.json` (full
    /// analysis mode only). Edges are keyed by the caller's `SymbolId`
    /// string so the file round-trips through plain JSON without a custom
    /// deserializer.
    pub fn snapshot(&self) -> CallGraphSnapshot {
        let symbols: Vec<CallSymbol> = self.symbols.values().cloned().collect();
        let edges: BTreeMap<String, Vec<String>> = self
            .edges
            .iter()
            .map(|(caller, callees)| (caller.0.clone(), callees.iter().map(|c| c.0.clone()).collect()))
            .collect();
        let cycles: Vec<Vec<String>> = self
            .detect_cycles()
            .into_iter()
            .map(|scc| scc.into_iter().map(|id| id.0).collect())
            .collect();
        CallGraphSnapshot { symbols, edges, cycles }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphSnapshot {
    pub symbols: Vec<CallSymbol>,
    pub edges: BTreeMap<String, Vec<String>>,
    pub cycles: Vec<Vec<String>>,
}

fn collect_symbols(
    node: Node,
    rules: &Rules,
    source: &[u8],
    file: &str,
    language: Language,
    graph: &mut CallGraph,
    bodies: &mut Vec<(SymbolId, String, Language, usize, usize)>,
) {
    if rules.function_kinds.contains(&node.kind()) {
        if let Some(name_node) = node.child_by_field_name(rules.name_field) {
            if let Ok(name) = name_node.utf8_text(source) {
                let id = SymbolId::new(file, name);
                let start = node.start_position();
                let end = node.end_position();
                graph.symbols.insert(
                    id.clone(),
                    CallSymbol {
                        id: id.clone(),
                        name: name.to_string(),
                        file: file.to_string(),
                        start_line: (start.row + 1) as i64,
                        end_line: (end.row + 1) as i64,
                    },
                );
                graph.by_name.entry(name.to_string()).or_default().push(id.clone());
                graph.by_file.entry(file.to_string()).or_default().push(id.clone());
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_symbols(child, rules, source, file, language, graph, bodies);
    }

    if rules.function_kinds.contains(&node.kind()) {
        if let Some(name_node) = node.child_by_field_name(rules.name_field) {
            if let Ok(name) = name_node.utf8_text(source) {
                bodies.push((SymbolId::new(file, name), file.to_string(), language, node.start_byte(), node.end_byte()));
            }
        }
    }
}

fn collect_calls(node: Node, rules: &Rules, source: &[u8], out: &mut Vec<String>) {
    if rules.call_kinds.contains(&node.kind()) {
        if let Some(name) = callee_name(node, source) {
            out.push(name.to_string());
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, rules, source, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_direct_call_edge_within_one_file() {
        let src = "fn a() { b(); }\nfn b() {}\n".to_string();
        let graph = CallGraph::build(&[("f.rs".to_string(), Language::Rust, src)]);
        let a_id = SymbolId::new("f.rs", "a");
        let b_id = SymbolId::new("f.rs", "b");
        assert!(graph.get_outgoing_calls(&a_id).contains(&b_id));
        assert!(graph.get_incoming_calls(&b_id).contains(&a_id));
    }

    #[test]
    fn detects_mutual_recursion_cycle() {
        let src = "fn a() { b(); }\nfn b() { a(); }\n".to_string();
        let graph = CallGraph::build(&[("f.rs".to_string(), Language::Rust, src)]);
        let cycles = graph.detect_cycles();
        assert!(cycles.iter().any(|c| c.len() == 2));
    }

    #[test]
    fn self_recursive_function_is_its_own_cycle() {
        let src = "fn fact(n: i32) -> i32 { fact(n - 1) }\n".to_string();
        let graph = CallGraph::build(&[("f.rs".to_string(), Language::Rust, src)]);
        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 1);
    }
}
