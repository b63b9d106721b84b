//! Property tests for the Symbol Extractor.
//!
//! Arbitrary input must never panic and never leak partial results: either the
//! source parses and every declared export is found, or both lists are empty.

use fraglink_check::{extract_symbols, try_extract_symbols};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,8}".prop_filter("reserved word", |name| {
        !matches!(
            name.as_str(),
            "do" | "if" | "in" | "for" | "let" | "new" | "try" | "var" | "case" | "else"
                | "enum" | "this" | "void" | "with" | "break" | "catch" | "class" | "const"
                | "super" | "throw" | "while" | "yield" | "async" | "await" | "delete"
                | "export" | "import" | "return" | "static" | "switch" | "typeof"
                | "default" | "extends" | "finally" | "package" | "private" | "continue"
                | "debugger" | "function" | "arguments" | "interface" | "protected"
                | "implements" | "instanceof" | "public" | "of" | "get" | "set" | "from"
                | "as" | "null" | "true" | "false" | "undefined"
        )
    })
}

proptest! {
    #[test]
    fn arbitrary_input_never_panics(source in ".{0,200}") {
        let symbols = extract_symbols(&source);
        if try_extract_symbols(&source).is_err() {
            prop_assert!(symbols.imports.is_empty());
            prop_assert!(symbols.exported_functions.is_empty());
        }
    }

    #[test]
    fn declared_exports_are_found_in_order(
        names in proptest::collection::btree_set(identifier(), 1..6)
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let source: String = names
            .iter()
            .map(|name| format!("export function {name}() {{ return 1; }}\n"))
            .collect();
        let symbols = extract_symbols(&source);
        prop_assert_eq!(symbols.exported_functions, names);
    }

    #[test]
    fn aliased_clauses_export_the_alias(local in identifier(), alias in identifier()) {
        prop_assume!(local != alias);
        let source = format!("function {local}() {{}}\nexport {{ {local} as {alias} }};");
        let symbols = extract_symbols(&source);
        prop_assert_eq!(symbols.exported_functions, vec![alias]);
    }
}
