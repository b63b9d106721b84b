//! The Symbol Extractor.
//!
//! Turns fragment source into the two lists the graph model stores: module
//! specifiers it imports and names it exports. Extraction never fails from the
//! caller's point of view: unparseable source yields empty lists and a
//! warning in the log.

use serde::{Deserialize, Serialize};

use crate::analysis::{analyze_source, SourceAnalysis};
use crate::error::ParseError;

/// Imports and exported names of one piece of source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSymbols {
    /// Module specifiers of `import` declarations, in source order.
    pub imports: Vec<String>,
    /// Exported names in order of first appearance, without duplicates.
    pub exported_functions: Vec<String>,
}

impl ExtractedSymbols {
    /// Whether both lists are empty.
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.exported_functions.is_empty()
    }
}

impl From<&SourceAnalysis> for ExtractedSymbols {
    fn from(analysis: &SourceAnalysis) -> Self {
        let imports = analysis.imports.iter().map(|i| i.source.clone()).collect();

        let mut exported_functions: Vec<String> = Vec::new();
        for name in analysis.exports.iter().flat_map(|e| e.exported_names()) {
            if !exported_functions.iter().any(|existing| existing == name) {
                exported_functions.push(name.to_string());
            }
        }

        ExtractedSymbols {
            imports,
            exported_functions,
        }
    }
}

/// Extracts imports and exported names, reporting parse failures.
pub fn try_extract_symbols(source: &str) -> Result<ExtractedSymbols, ParseError> {
    analyze_source(source).map(|analysis| ExtractedSymbols::from(&analysis))
}

/// Extracts imports and exported names.
///
/// On a parse failure both lists are empty and the error is logged.
pub fn extract_symbols(source: &str) -> ExtractedSymbols {
    match try_extract_symbols(source) {
        Ok(symbols) => symbols,
        Err(err) => {
            tracing::warn!(error = %err, "symbol extraction failed, returning empty symbol lists");
            ExtractedSymbols::default()
        }
    }
}
