//! Parser setup and syntax diagnostics.
//!
//! A fresh tree-sitter [`Parser`] is created per call: parsers are cheap and
//! not `Sync`, and analysis runs on arbitrary threads.

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::ParseError;

/// Longest source excerpt quoted in a diagnostic message.
const EXCERPT_LIMIT: usize = 24;

/// One syntax problem found in a fragment. Positions are 1-based; the column
/// counts bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxDiagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<SyntaxDiagnostic> for ParseError {
    fn from(diag: SyntaxDiagnostic) -> Self {
        ParseError::Syntax {
            line: diag.line,
            column: diag.column,
            message: diag.message,
        }
    }
}

/// Parses JavaScript source into a tree. Syntax errors are not reported here;
/// they appear as error nodes inside the tree.
pub fn parse(source: &str) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| ParseError::Grammar {
            message: e.to_string(),
        })?;
    parser.parse(source, None).ok_or(ParseError::NoTree)
}

/// Returns every syntax error in `source`, outermost error nodes only.
///
/// Suitable for filling a fragment's `lintErrors`. An unparseable grammar
/// setup is reported as a single diagnostic at 1:1.
pub fn syntax_diagnostics(source: &str) -> Vec<SyntaxDiagnostic> {
    match parse(source) {
        Ok(tree) => {
            let mut out = Vec::new();
            collect_errors(tree.root_node(), source, &mut out);
            out
        }
        Err(err) => vec![SyntaxDiagnostic {
            line: 1,
            column: 1,
            message: err.to_string(),
        }],
    }
}

/// First syntax error in an already parsed tree, if any.
pub(crate) fn first_error(tree: &Tree, source: &str) -> Option<SyntaxDiagnostic> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut out = Vec::new();
    collect_errors(root, source, &mut out);
    // has_error() with no error node found should not happen; still report it.
    Some(out.into_iter().next().unwrap_or_else(|| SyntaxDiagnostic {
        line: 1,
        column: 1,
        message: "invalid syntax".to_string(),
    }))
}

fn collect_errors(node: Node<'_>, source: &str, out: &mut Vec<SyntaxDiagnostic>) {
    if node.is_error() || node.is_missing() {
        out.push(diagnostic_for(node, source));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    for child in children {
        collect_errors(child, source, out);
    }
}

fn diagnostic_for(node: Node<'_>, source: &str) -> SyntaxDiagnostic {
    let position = node.start_position();
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = source.get(node.byte_range()).unwrap_or_default();
        let excerpt: String = text
            .chars()
            .take_while(|c| *c != '\n')
            .take(EXCERPT_LIMIT)
            .collect();
        if excerpt.trim().is_empty() {
            "unexpected input".to_string()
        } else {
            format!("unexpected `{}`", excerpt.trim())
        }
    };
    SyntaxDiagnostic {
        line: position.row + 1,
        column: position.column + 1,
        message,
    }
}
