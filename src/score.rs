//! Threshold grading for complexity values.
//!
//! Thresholds never change computed metrics; they only bucket them for reports
//! and pick out hotspots.

use serde::{Deserialize, Serialize};

use crate::metrics::FunctionMetrics;

/// Alert thresholds for the two complexity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cyclomatic: u32,
    pub cognitive: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cyclomatic: 10,
            cognitive: 15,
        }
    }
}

/// Bucket of a complexity value relative to its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    /// At most half the threshold.
    Low,
    /// Up to the threshold.
    Moderate,
    /// Up to twice the threshold.
    High,
    VeryHigh,
}

impl ComplexityLevel {
    pub fn grade(value: u32, threshold: u32) -> Self {
        let value = u64::from(value) * 2;
        let threshold = u64::from(threshold.max(1));
        match value {
            v if v <= threshold => ComplexityLevel::Low,
            v if v <= threshold * 2 => ComplexityLevel::Moderate,
            v if v <= threshold * 4 => ComplexityLevel::High,
            _ => ComplexityLevel::VeryHigh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Moderate => "moderate",
            ComplexityLevel::High => "high",
            ComplexityLevel::VeryHigh => "very high",
        }
    }

    pub fn exceeds_threshold(&self) -> bool {
        *self >= ComplexityLevel::High
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A function over at least one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub file: String,
    pub function: String,
    pub line: usize,
    pub cyclomatic: u32,
    pub cognitive: u32,
    /// Worse of the two metric levels.
    pub level: ComplexityLevel,
}

impl Hotspot {
    pub fn from_function(file: &str, function: &FunctionMetrics, thresholds: &Thresholds) -> Option<Self> {
        let cyclomatic = ComplexityLevel::grade(function.cyclomatic, thresholds.cyclomatic);
        let cognitive = ComplexityLevel::grade(function.cognitive, thresholds.cognitive);
        if !cyclomatic.exceeds_threshold() && !cognitive.exceeds_threshold() {
            return None;
        }
        Some(Self {
            file: file.to_string(),
            function: function.name.clone(),
            line: function.start_line,
            cyclomatic: function.cyclomatic,
            cognitive: function.cognitive,
            level: cyclomatic.max(cognitive),
        })
    }
}
