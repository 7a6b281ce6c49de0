//! Cyclomatic + cognitive complexity (§4.8, S4).
//!
//! Implements SonarSource's cognitive-complexity rules: `+1` flat for every
//! `if/for/while/catch/case/ternary`, plus a nesting penalty equal to the
//! current depth; `else`/`else-if` add `+1` flat with no nesting penalty;
//! `&&`/`||` chains score on operator *switches*, not per-operator; a
//! function's own name appearing as a call target inside itself adds `+1`
//! once. Per-language node-kind tables stand in for what a single AST
//! library would otherwise normalize away.

use super::Language;
use crate::models::ComplexityFacts;
use tree_sitter::Node;

struct Rules {
    function_kinds: &'static [&'static str],
    if_kind: &'static str,
    loop_kinds: &'static [&'static str],
    catch_kinds: &'static [&'static str],
    case_kinds: &'static [&'static str],
    ternary_kinds: &'static [&'static str],
    logical_kind: &'static str,
    and_op: &'static str,
    or_op: &'static str,
    params_kind: &'static [&'static str],
    name_field: &'static str,
}

fn rules(language: Language) -> Rules {
    match language {
        Language::Rust => Rules {
            function_kinds: &["function_item", "closure_expression"],
            if_kind: "if_expression",
            loop_kinds: &["for_expression", "while_expression", "loop_expression"],
            catch_kinds: &[],
            case_kinds: &["match_arm"],
            ternary_kinds: &[],
            logical_kind: "binary_expression",
            and_op: "&&",
            or_op: "||",
            params_kind: &["parameters"],
            name_field: "name",
        },
        Language::Python => Rules {
            function_kinds: &["function_definition"],
            if_kind: "if_statement",
            loop_kinds: &["for_statement", "while_statement"],
            catch_kinds: &["except_clause"],
            case_kinds: &["case_clause"],
            ternary_kinds: &["conditional_expression"],
            logical_kind: "boolean_operator",
            and_op: "and",
            or_op: "or",
            params_kind: &["parameters"],
            name_field: "name",
        },
        Language::Go => Rules {
            function_kinds: &["function_declaration", "method_declaration", "func_literal"],
            if_kind: "if_statement",
            loop_kinds: &["for_statement"],
            catch_kinds: &[],
            case_kinds: &["expression_case", "default_case", "communication_case"],
            ternary_kinds: &[],
            logical_kind: "binary_expression",
            and_op: "&&",
            or_op: "||",
            params_kind: &["parameter_list"],
            name_field: "name",
        },
        Language::Java => Rules {
            function_kinds: &["method_declaration", "constructor_declaration"],
            if_kind: "if_statement",
            loop_kinds: &["for_statement", "enhanced_for_statement", "while_statement", "do_statement"],
            catch_kinds: &["catch_clause"],
            case_kinds: &["switch_label"],
            ternary_kinds: &["ternary_expression"],
            logical_kind: "binary_expression",
            and_op: "&&",
            or_op: "||",
            params_kind: &["formal_parameters"],
            name_field: "name",
        },
        Language::JavaScript | Language::Tsx | Language::TypeScript => Rules {
            function_kinds: &[
                "function_declaration",
                "function_expression",
                "arrow_function",
                "method_definition",
                "generator_function_declaration",
            ],
            if_kind: "if_statement",
            loop_kinds: &["for_statement", "for_in_statement", "while_statement", "do_statement"],
            catch_kinds: &["catch_clause"],
            case_kinds: &["switch_case"],
            ternary_kinds: &["ternary_expression"],
            logical_kind: "binary_expression",
            and_op: "&&",
            or_op: "||",
            params_kind: &["formal_parameters"],
            name_field: "name",
        },
    }
}

struct Accumulator {
    cyclomatic: u32,
    cognitive: u32,
    max_nesting_depth: u32,
}

fn is_logical_switch(node: &Node, rules: &Rules, source: &[u8], chain_op: &mut Option<String>) -> bool {
    if node.kind() != rules.logical_kind {
        return false;
    }
    let op = node
        .child_by_field_name("operator")
        .and_then(|n| n.utf8_text(source).ok())
        .unwrap_or("");
    if op != rules.and_op && op != rules.or_op {
        return false;
    }
    let switched = chain_op.as_deref().is_some_and(|prev| prev != op);
    *chain_op = Some(op.to_string());
    switched || chain_op.is_none()
}

/// Recurse the body of one function, accumulating complexity. `depth` is the
/// current structural nesting depth; `from_else_if` marks a node reached as
/// the `else`-arm continuation of a parent `if`, which must not be double
/// counted against the flat `+1` already charged for the `else`.
#[allow(clippy::too_many_arguments)]
fn visit(
    node: Node,
    rules: &Rules,
    source: &[u8],
    depth: u32,
    from_else_if: bool,
    acc: &mut Accumulator,
    fn_name: &str,
    chain_op: &mut Option<String>,
) {
    let kind = node.kind();

    if kind == rules.if_kind {
        if from_else_if {
            acc.cyclomatic += 1;
            acc.cognitive += 1;
        } else {
            acc.cyclomatic += 1;
            acc.cognitive += 1 + depth;
            acc.max_nesting_depth = acc.max_nesting_depth.max(depth + 1);
        }
        let body_depth = depth + 1;
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let field = cursor.field_name();
                let child = cursor.node();
                if field == Some("alternative") {
                    let (next, is_chain) = unwrap_else(child);
                    let mut local_chain = chain_op.clone();
                    visit(next, rules, source, body_depth, is_chain, acc, fn_name, &mut local_chain);
                } else {
                    let mut local_chain = None;
                    visit(child, rules, source, body_depth, false, acc, fn_name, &mut local_chain);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
        return;
    }

    if rules.loop_kinds.contains(&kind) || rules.catch_kinds.contains(&kind) {
        acc.cyclomatic += 1;
        acc.cognitive += 1 + depth;
        acc.max_nesting_depth = acc.max_nesting_depth.max(depth + 1);
        recurse_children(node, rules, source, depth + 1, acc, fn_name);
        return;
    }

    if rules.case_kinds.contains(&kind) {
        acc.cyclomatic += 1;
        acc.cognitive += 1 + depth;
        acc.max_nesting_depth = acc.max_nesting_depth.max(depth + 1);
        recurse_children(node, rules, source, depth + 1, acc, fn_name);
        return;
    }

    if rules.ternary_kinds.contains(&kind) {
        acc.cyclomatic += 1;
        acc.cognitive += 1 + depth;
        recurse_children(node, rules, source, depth, acc, fn_name);
        return;
    }

    if is_logical_switch(&node, rules, source, chain_op) {
        acc.cognitive += 1;
    }

    if node.kind() == "call_expression" || node.kind() == "call" {
        if let Some(func) = node.child_by_field_name("function") {
            if func.utf8_text(source).ok() == Some(fn_name) {
                acc.cognitive += 1;
            }
        }
    }

    recurse_children(node, rules, source, depth, acc, fn_name);
}

fn recurse_children(node: Node, rules: &Rules, source: &[u8], depth: u32, acc: &mut Accumulator, fn_name: &str) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let mut chain_op = None;
        visit(child, rules, source, depth, false, acc, fn_name, &mut chain_op);
    }
}

/// `else_clause` wrappers (Java/Go/JS-via-field) vs. a bare nested
/// `if_statement` (Rust's `else if`): unwrap one layer and report whether
/// the immediate child is itself an `if` (an `else if` chain).
fn unwrap_else(node: Node) -> (Node, bool) {
    if node.kind().contains("else") {
        if let Some(inner) = node.named_child(0) {
            let is_if = inner.kind().contains("if");
            return (inner, is_if);
        }
    }
    let is_if = node.kind().contains("if");
    (node, is_if)
}

fn param_count(node: Node, rules: &Rules) -> u32 {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if rules.params_kind.contains(&child.kind()) {
            return child
                .named_children(&mut child.walk())
                .filter(|c| c.kind() != "comment")
                .count() as u32;
        }
    }
    0
}

/// Compute complexity facts for every function-like definition in `content`,
/// keyed by the function's declared name (anonymous functions are skipped).
pub fn compute(language: Language, content: &str) -> Vec<(String, ComplexityFacts)> {
    let Some(tree) = super::parse(language, content) else {
        return Vec::new();
    };
    let source = content.as_bytes();
    let rules = rules(language);
    let mut out = Vec::new();
    collect_functions(tree.root_node(), &rules, source, &mut out);
    out
}

fn collect_functions(node: Node, rules: &Rules, source: &[u8], out: &mut Vec<(String, ComplexityFacts)>) {
    if rules.function_kinds.contains(&node.kind()) {
        let name = node
            .child_by_field_name(rules.name_field)
            .and_then(|n| n.utf8_text(source).ok())
            .unwrap_or("<anonymous>")
            .to_string();

        let mut acc = Accumulator {
            cyclomatic: 1,
            cognitive: 0,
            max_nesting_depth: 0,
        };
        recurse_children(node, rules, source, 0, &mut acc, &name);

        let start = node.start_position().row as u32;
        let end = node.end_position().row as u32;
        out.push((
            name,
            ComplexityFacts {
                cyclomatic: acc.cyclomatic,
                cognitive: acc.cognitive,
                max_nesting_depth: acc.max_nesting_depth,
                line_count: end - start + 1,
                param_count: param_count(node, rules),
            },
        ));
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_functions(child, rules, source, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_if_for_if_matches_worked_example() {
        let src = r#"
            function f(a, b) {
                if (a) {
                    for (let i = 0; i < 10; i++) {
                        if (b) {
                            doThing();
                        }
                    }
                }
            }
        "#;
        let facts = compute(Language::JavaScript, src);
        let (_, f) = facts.into_iter().find(|(n, _)| n == "f").unwrap();
        assert_eq!(f.cyclomatic, 4);
        assert_eq!(f.cognitive, 6);
        assert_eq!(f.max_nesting_depth, 3);
    }

    #[test]
    fn flat_sequential_ifs_have_no_nesting_penalty() {
        let src = r#"
            function g(a, b) {
                if (a) { doA(); }
                if (b) { doB(); }
            }
        "#;
        let facts = compute(Language::JavaScript, src);
        let (_, g) = facts.into_iter().find(|(n, _)| n == "g").unwrap();
        assert_eq!(g.cognitive, 2);
        assert_eq!(g.max_nesting_depth, 1);
    }

    #[test]
    fn recursive_self_call_adds_one() {
        let src = "fn fact(n: i32) -> i32 { if n == 0 { 1 } else { n * fact(n - 1) } }";
        let facts = compute(Language::Rust, src);
        let (_, fact) = facts.into_iter().find(|(n, _)| n == "fact").unwrap();
        assert!(fact.cognitive >= 2);
    }
}
