// ⚠️ Error taxonomy
// Only explicit contract violations become errors. Everything else degrades
// into a tallied warning, an omitted alert, or a failed enrichment section.

use thiserror::Error;

/// Hard contract violation on an explicit caller-supplied parameter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("opening balance was supplied as null")]
    NullOpeningBalance,

    #[error("opening balance must be a finite number, got {0}")]
    NonFiniteOpeningBalance(f64),

    #[error("opening balance is not numeric: {0}")]
    NonNumericOpeningBalance(String),

    #[error("income stability ratio must be finite, got {0}")]
    NonFiniteIncomeStability(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The input could not be read as statement text at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("statement text is empty")]
    EmptyInput,

    #[error("statement text is not readable text ({control_ratio:.0}% control characters)")]
    NotText { control_ratio: f64 },
}

/// Anything that aborts the analysis of one statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ValidationError::NonFiniteOpeningBalance(f64::INFINITY).to_string(),
            "opening balance must be a finite number, got inf"
        );
        assert_eq!(ExtractionError::EmptyInput.to_string(), "statement text is empty");
    }

    #[test]
    fn test_analysis_error_from_validation() {
        let err: AnalysisError = ValidationError::NullOpeningBalance.into();
        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(err.to_string(), "opening balance was supplied as null");
    }
}
