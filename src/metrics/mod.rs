//! Per-function complexity metrics.
//!
//! Each engine consumes one [`FunctionUnit`] and returns a [`MetricRecord`]; the
//! analyzer folds the records of all configured engines into a [`FunctionMetrics`].

use serde::{Deserialize, Serialize};

use crate::parser::{FunctionUnit, SyntaxTree};

pub mod cognitive;
pub mod cyclomatic;
pub mod halstead;

pub use cognitive::CognitiveCalculator;
pub use cyclomatic::CyclomaticCalculator;
pub use halstead::{HalsteadCalculator, HalsteadMetrics};

/// Output of one engine for one function.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRecord {
    Cyclomatic(u32),
    Cognitive(u32),
    Halstead(HalsteadMetrics),
}

/// A metric computed from a function's subtree.
pub trait MetricEngine: Send + Sync {
    /// Short name used in logs (e.g., "cyclomatic").
    fn name(&self) -> &'static str;

    fn measure(&self, unit: &FunctionUnit<'_>, tree: &SyntaxTree) -> MetricRecord;
}

/// Metrics of one function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub line_count: usize,
    pub parameter_count: usize,
    pub return_type: String,
    pub cyclomatic: u32,
    pub cognitive: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halstead: Option<HalsteadMetrics>,
    /// Embedded SQL statements starting inside the function.
    pub sql_block_count: usize,
    /// The function's subtree contains parser error nodes; metrics are best-effort.
    pub has_parse_errors: bool,
}

impl FunctionMetrics {
    /// Metrics shell for a unit, before any engine has run.
    pub fn for_unit(unit: &FunctionUnit<'_>) -> Self {
        Self {
            name: unit.name.clone(),
            start_line: unit.start_line(),
            end_line: unit.end_line(),
            line_count: unit.line_count(),
            parameter_count: unit.parameters.len(),
            return_type: unit.return_type.clone(),
            cyclomatic: 1,
            cognitive: 0,
            halstead: None,
            sql_block_count: 0,
            has_parse_errors: unit.has_errors,
        }
    }

    pub fn apply(&mut self, record: MetricRecord) {
        match record {
            MetricRecord::Cyclomatic(value) => self.cyclomatic = value,
            MetricRecord::Cognitive(value) => self.cognitive = value,
            MetricRecord::Halstead(metrics) => self.halstead = Some(metrics),
        }
    }
}

/// Engines in evaluation order.
pub fn default_engines(enable_halstead: bool) -> Vec<Box<dyn MetricEngine>> {
    let mut engines: Vec<Box<dyn MetricEngine>> =
        vec![Box::new(CyclomaticCalculator), Box::new(CognitiveCalculator)];
    if enable_halstead {
        engines.push(Box::new(HalsteadCalculator));
    }
    engines
}

/// Parse `source` and hand its first function to `f`.
#[cfg(test)]
pub(crate) fn with_first_function<R>(
    source: &str,
    f: impl FnOnce(&FunctionUnit<'_>, &SyntaxTree) -> R,
) -> R {
    use crate::parser::{SyntaxTreeProvider, TreeSitterC};

    let provider = TreeSitterC::new();
    let tree = provider.parse(source).unwrap();
    let units = provider.function_units(&tree);
    let unit = units.first().expect("source has no function");
    f(unit, &tree)
}
