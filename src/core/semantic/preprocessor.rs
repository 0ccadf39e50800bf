//! Conditional compilation: which `#if` branches are compiled and which
//! names are macros.
//!
//! Directives are applied in the order the analyzer reaches them, includes
//! expanded where they appear. Macro bodies are never expanded into the
//! source; a call through a macro name has no known callee.

use std::collections::{HashMap, HashSet};
use tracing::trace;
use tree_sitter::Node;

use super::declarator::{named_children, node_text};
use super::entity::FileId;
use super::unit::NodeKey;

/// `#if` expressions nested deeper than this are not evaluated.
const MAX_EXPRESSION_DEPTH: usize = 64;

/// Whether the body of one `#if`, `#elif` or `#else` branch is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Active,
    Inactive,
    /// The branch may or may not be compiled
    Undecided,
}

#[derive(Debug, Default)]
pub struct Preprocessor {
    /// Replacement text of object-like macros, `None` for function-like ones
    macros: HashMap<String, Option<String>>,
    /// Every name that was defined at some point
    macro_names: HashSet<String>,
    branches: HashMap<NodeKey, Branch>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `preproc_def` or `preproc_function_def`.
    pub fn define(&mut self, directive: Node<'_>, source: &str) {
        let Some(name) = directive.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name, source).to_string();
        let value = match directive.kind() {
            "preproc_function_def" => None,
            _ => Some(
                directive
                    .child_by_field_name("value")
                    .map(|value| node_text(value, source).trim().to_string())
                    .unwrap_or_default(),
            ),
        };
        trace!("#define {}", name);
        self.macro_names.insert(name.clone());
        self.macros.insert(name, value);
    }

    /// Apply a directive without a node kind of its own. Only `#undef`
    /// changes anything.
    pub fn directive(&mut self, call: Node<'_>, source: &str) {
        let Some(directive) = call.child_by_field_name("directive") else {
            return;
        };
        let directive: String = node_text(directive, source).split_whitespace().collect();
        if directive != "#undef" {
            return;
        }
        if let Some(argument) = call.child_by_field_name("argument") {
            let name = node_text(argument, source).trim();
            trace!("#undef {}", name);
            self.macros.remove(name);
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// The name was a macro somewhere in the unit.
    pub fn is_macro(&self, name: &str) -> bool {
        self.macro_names.contains(name)
    }

    /// Decide every branch of the conditional headed by `conditional` with
    /// the macros defined so far, and remember the decisions.
    pub fn decide<'t>(&mut self, file: FileId, conditional: Node<'t>, source: &str) -> Vec<(Node<'t>, Branch)> {
        let mut decided = Vec::new();
        // Whether an earlier branch of the chain is compiled; `None` when
        // that depends on an undecided condition.
        let mut taken = Some(false);
        for node in branches(conditional) {
            let branch = match (taken, self.condition(node, source)) {
                (Some(true), _) | (_, Some(false)) => Branch::Inactive,
                (Some(false), Some(true)) => {
                    taken = Some(true);
                    Branch::Active
                }
                (None, Some(true)) => {
                    taken = Some(true);
                    Branch::Undecided
                }
                (_, None) => {
                    taken = None;
                    Branch::Undecided
                }
            };
            self.branches.insert((file, node.id()), branch);
            decided.push((node, branch));
        }
        decided
    }

    /// Decision for one branch node. Branches never decided count as
    /// undecided.
    pub fn branch(&self, file: FileId, node: Node<'_>) -> Branch {
        self.branches
            .get(&(file, node.id()))
            .copied()
            .unwrap_or(Branch::Undecided)
    }

    /// Contents of the compiled branches of a conditional, in source order.
    pub fn compiled<'t>(&self, file: FileId, conditional: Node<'t>) -> Vec<Node<'t>> {
        branches(conditional)
            .into_iter()
            .filter(|branch| self.branch(file, *branch) == Branch::Active)
            .flat_map(branch_body)
            .collect()
    }

    fn condition(&self, branch: Node<'_>, source: &str) -> Option<bool> {
        match branch.kind() {
            "preproc_else" => Some(true),
            "preproc_ifdef" | "preproc_elifdef" => {
                let name = branch.child_by_field_name("name")?;
                let defined = self.is_defined(node_text(name, source));
                let negated = branch
                    .child(0)
                    .map(|token| token.kind().ends_with("ndef"))
                    .unwrap_or(false);
                Some(defined != negated)
            }
            _ => {
                let condition = branch.child_by_field_name("condition")?;
                self.evaluate(condition, source, 0).map(|value| value != 0)
            }
        }
    }

    /// Integer value of a `#if` expression, `None` when it depends on
    /// something unknown.
    fn evaluate(&self, expr: Node<'_>, source: &str, depth: usize) -> Option<i64> {
        if depth > MAX_EXPRESSION_DEPTH {
            return None;
        }
        match expr.kind() {
            "number_literal" => integer_literal(node_text(expr, source)),
            "char_literal" => char_literal(node_text(expr, source)),
            "true" => Some(1),
            "false" => Some(0),
            "identifier" => self.macro_value(node_text(expr, source), depth),
            "preproc_defined" => {
                let name = named_children(expr)
                    .into_iter()
                    .find(|child| child.kind() == "identifier")?;
                Some(i64::from(self.is_defined(node_text(name, source))))
            }
            "parenthesized_expression" => {
                let inner = named_children(expr).into_iter().next()?;
                self.evaluate(inner, source, depth + 1)
            }
            "unary_expression" => {
                let operator = expr.child_by_field_name("operator").map(|op| node_text(op, source))?;
                let value = self.evaluate(expr.child_by_field_name("argument")?, source, depth + 1)?;
                match operator {
                    "!" => Some(i64::from(value == 0)),
                    "-" => Some(value.wrapping_neg()),
                    "+" => Some(value),
                    "~" => Some(!value),
                    _ => None,
                }
            }
            "binary_expression" => self.evaluate_binary(expr, source, depth),
            _ => None,
        }
    }

    fn evaluate_binary(&self, expr: Node<'_>, source: &str, depth: usize) -> Option<i64> {
        let operator = expr.child_by_field_name("operator").map(|op| node_text(op, source))?;
        let left = self.evaluate(expr.child_by_field_name("left")?, source, depth + 1);
        let right = || {
            expr.child_by_field_name("right")
                .and_then(|right| self.evaluate(right, source, depth + 1))
        };
        match operator {
            "&&" => match left {
                Some(0) => Some(0),
                left => match (left, right()) {
                    (_, Some(0)) => Some(0),
                    (Some(_), Some(_)) => Some(1),
                    _ => None,
                },
            },
            "||" => match left {
                Some(value) if value != 0 => Some(1),
                left => match (left, right()) {
                    (_, Some(value)) if value != 0 => Some(1),
                    (Some(_), Some(_)) => Some(0),
                    _ => None,
                },
            },
            _ => {
                let (left, right) = (left?, right()?);
                match operator {
                    "+" => left.checked_add(right),
                    "-" => left.checked_sub(right),
                    "*" => left.checked_mul(right),
                    "/" => left.checked_div(right),
                    "%" => left.checked_rem(right),
                    "<<" => left.checked_shl(u32::try_from(right).ok()?),
                    ">>" => left.checked_shr(u32::try_from(right).ok()?),
                    "&" => Some(left & right),
                    "|" => Some(left | right),
                    "^" => Some(left ^ right),
                    "==" => Some(i64::from(left == right)),
                    "!=" => Some(i64::from(left != right)),
                    "<" => Some(i64::from(left < right)),
                    ">" => Some(i64::from(left > right)),
                    "<=" => Some(i64::from(left <= right)),
                    ">=" => Some(i64::from(left >= right)),
                    _ => None,
                }
            }
        }
    }

    /// Value of an identifier in a `#if` expression. Names that are not
    /// macros evaluate to 0.
    fn macro_value(&self, name: &str, depth: usize) -> Option<i64> {
        match name {
            "true" => return Some(1),
            "false" => return Some(0),
            _ => {}
        }
        let body = match self.macros.get(name) {
            None => return Some(0),
            Some(None) => return None,
            Some(Some(body)) => body.trim().trim_start_matches('(').trim_end_matches(')').trim(),
        };
        if let Some(value) = integer_literal(body) {
            return Some(value);
        }
        if depth < MAX_EXPRESSION_DEPTH && is_identifier(body) {
            return self.macro_value(body, depth + 1);
        }
        None
    }
}

/// The `#if`/`#elif`/`#else` chain starting at `conditional`.
pub fn branches(conditional: Node<'_>) -> Vec<Node<'_>> {
    let mut chain = vec![conditional];
    let mut current = conditional;
    while let Some(next) = current.child_by_field_name("alternative") {
        chain.push(next);
        current = next;
    }
    chain
}

/// Items inside one branch, without its condition and its alternative.
pub fn branch_body(branch: Node<'_>) -> Vec<Node<'_>> {
    let excluded: Vec<usize> = ["condition", "name", "alternative"]
        .iter()
        .filter_map(|field| branch.child_by_field_name(field))
        .map(|node| node.id())
        .collect();
    named_children(branch)
        .into_iter()
        .filter(|child| !excluded.contains(&child.id()))
        .collect()
}

pub fn is_conditional(kind: &str) -> bool {
    matches!(
        kind,
        "preproc_if" | "preproc_ifdef" | "preproc_elif" | "preproc_elifdef" | "preproc_else"
    )
}

fn integer_literal(text: &str) -> Option<i64> {
    let digits = text.trim().trim_end_matches(['u', 'U', 'l', 'L']).replace('\'', "");
    let (radix, body) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(binary) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, binary)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits.as_str())
    };
    i64::from_str_radix(body, radix).ok()
}

fn char_literal(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '\\' => Some(c as i64),
        _ => None,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::languages::{CppFrontend, LanguageFrontend, SourceLanguage};

    /// Apply every top-level directive of `source` and return the decision
    /// for each branch of the last conditional.
    fn decisions(source: &str) -> Vec<Branch> {
        let mut frontend = CppFrontend::new(SourceLanguage::Cpp).unwrap();
        let tree = frontend.parse(source).unwrap();
        let mut preprocessor = Preprocessor::new();
        let mut last = Vec::new();
        for node in named_children(tree.root_node()) {
            match node.kind() {
                "preproc_def" | "preproc_function_def" => preprocessor.define(node, source),
                "preproc_call" => preprocessor.directive(node, source),
                kind if is_conditional(kind) => {
                    last = preprocessor
                        .decide(0, node, source)
                        .into_iter()
                        .map(|(_, branch)| branch)
                        .collect();
                }
                _ => {}
            }
        }
        last
    }

    #[test]
    fn test_literal_conditions() {
        assert_eq!(decisions("#if 0\nint a;\n#endif\n"), vec![Branch::Inactive]);
        assert_eq!(decisions("#if 1\nint a;\n#else\nint b;\n#endif\n"), vec![Branch::Active, Branch::Inactive]);
        assert_eq!(
            decisions("#if 0\nint a;\n#elif 2 > 1\nint b;\n#else\nint c;\n#endif\n"),
            vec![Branch::Inactive, Branch::Active, Branch::Inactive]
        );
    }

    #[test]
    fn test_defined_names() {
        assert_eq!(decisions("#ifdef DEBUG\nint a;\n#else\nint b;\n#endif\n"), vec![Branch::Inactive, Branch::Active]);
        assert_eq!(
            decisions("#define DEBUG\n#ifdef DEBUG\nint a;\n#else\nint b;\n#endif\n"),
            vec![Branch::Active, Branch::Inactive]
        );
        assert_eq!(decisions("#define DEBUG\n#undef DEBUG\n#ifndef DEBUG\nint a;\n#endif\n"), vec![Branch::Active]);
        assert_eq!(
            decisions("#define A 1\n#if defined(A) && !defined B\nint a;\n#endif\n"),
            vec![Branch::Active]
        );
    }

    #[test]
    fn test_macro_values() {
        assert_eq!(decisions("#define LEVEL 3\n#if LEVEL >= 2\nint a;\n#endif\n"), vec![Branch::Active]);
        assert_eq!(decisions("#define LEVEL (0x10)\n#if LEVEL == 16\nint a;\n#endif\n"), vec![Branch::Active]);
        assert_eq!(decisions("#if UNDEFINED_NAME\nint a;\n#endif\n"), vec![Branch::Inactive]);
    }

    #[test]
    fn test_unknown_conditions_are_undecided() {
        assert_eq!(
            decisions("#define CHECK(x) x\n#if CHECK(1)\nint a;\n#elif 1\nint b;\n#else\nint c;\n#endif\n"),
            vec![Branch::Undecided, Branch::Undecided, Branch::Inactive]
        );
        assert_eq!(
            decisions("#if 0 && CHECK(1)\nint a;\n#else\nint b;\n#endif\n"),
            vec![Branch::Inactive, Branch::Active]
        );
    }

    #[test]
    fn test_macro_names_are_remembered() {
        let source = "#define helper real\n#undef helper\n";
        let mut frontend = CppFrontend::new(SourceLanguage::Cpp).unwrap();
        let tree = frontend.parse(source).unwrap();
        let mut preprocessor = Preprocessor::new();
        for node in named_children(tree.root_node()) {
            match node.kind() {
                "preproc_def" => preprocessor.define(node, source),
                "preproc_call" => preprocessor.directive(node, source),
                _ => {}
            }
        }
        assert!(!preprocessor.is_defined("helper"));
        assert!(preprocessor.is_macro("helper"));
        assert!(!preprocessor.is_macro("real"));
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(integer_literal("42"), Some(42));
        assert_eq!(integer_literal("0x1F"), Some(31));
        assert_eq!(integer_literal("010"), Some(8));
        assert_eq!(integer_literal("1UL"), Some(1));
        assert_eq!(integer_literal("0"), Some(0));
        assert_eq!(integer_literal("abc"), None);
        assert_eq!(char_literal("'A'"), Some(65));
    }
}
