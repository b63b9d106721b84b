//! Static analysis of fragment source code.
//!
//! Parses JavaScript with tree-sitter and answers the questions the compiler
//! needs before emitting anything:
//!
//! - [`symbols`] -- the Symbol Extractor: imports and exported names
//! - [`analysis`] -- structured import/export declarations with byte spans
//! - [`syntax`] -- parser setup and syntax diagnostics (lint errors)
//! - [`resolve`] -- mapping import specifiers to fragments, and deriving
//!   dependency edges from imports
//! - [`error`] -- [`ParseError`]

pub mod analysis;
pub mod error;
pub mod resolve;
pub mod symbols;
pub mod syntax;

pub use analysis::{analyze_source, ExportBinding, ExportDecl, ImportBinding, ImportDecl, SourceAnalysis};
pub use error::ParseError;
pub use resolve::{classify_import_entry, derive_dependency_edges, ImportEntry, ModuleResolver};
pub use symbols::{extract_symbols, try_extract_symbols, ExtractedSymbols};
pub use syntax::{syntax_diagnostics, SyntaxDiagnostic};
