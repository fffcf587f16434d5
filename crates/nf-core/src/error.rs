//! Error types for NuFit

use thiserror::Error;

/// Which side of a parameter range a value fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    /// Value is below the lower bound.
    Below,
    /// Value is above the upper bound.
    Above,
}

impl std::fmt::Display for BoundSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundSide::Below => f.write_str("below lower"),
            BoundSide::Above => f.write_str("above upper"),
        }
    }
}

fn convergence_suffix(msg: &str) -> String {
    if msg.is_empty() { String::new() } else { format!(" {msg}") }
}

fn shown_value(value: &f64) -> String {
    if value.is_nan() { "<blinded>".to_string() } else { format!("{value:.17e}") }
}

/// NuFit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed settings or a meaningless analysis definition. Not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A parameter value outside its declared range.
    #[error("Parameter '{param}' value {} is {side} bound {bound:.17e}", shown_value(.value))]
    OutOfBounds {
        /// Parameter name
        param: String,
        /// Which bound was violated
        side: BoundSide,
        /// Offending value; NaN once blinded
        value: f64,
        /// The violated bound
        bound: f64,
    },

    /// Failure while generating a distribution or scoring it inside a fit.
    #[error("Model evaluation failed ({context}): {source}")]
    ModelEvaluation {
        /// Which step failed (e.g. "get_outputs", "metric")
        context: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Minimizer did not converge. The message is empty in blind mode.
    #[error("Optimization failed.{}", convergence_suffix(.0))]
    Convergence(String),

    /// Invalid input values (negative counts, shape mismatch, ...)
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Wrap an error raised while evaluating the model inside a fit.
    pub fn model_evaluation(context: impl Into<String>, source: Error) -> Self {
        Error::ModelEvaluation { context: context.into(), source: Box::new(source) }
    }

    /// Same error with parameter values and minimizer messages removed.
    pub fn blinded(self) -> Self {
        match self {
            Error::OutOfBounds { param, side, bound, .. } => {
                Error::OutOfBounds { param, side, value: f64::NAN, bound }
            }
            Error::ModelEvaluation { context, source } => {
                Error::ModelEvaluation { context, source: Box::new(source.blinded()) }
            }
            Error::Convergence(_) => Error::Convergence(String::new()),
            other => other,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_message_redaction() {
        assert_eq!(Error::Convergence(String::new()).to_string(), "Optimization failed.");
        assert_eq!(
            Error::Convergence("MaxItersReached".into()).to_string(),
            "Optimization failed. MaxItersReached"
        );
    }

    #[test]
    fn test_out_of_bounds_names_side() {
        let e = Error::OutOfBounds {
            param: "theta23".into(),
            side: BoundSide::Above,
            value: 61.0,
            bound: 60.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("theta23"));
        assert!(msg.contains("above upper"));
    }

    #[test]
    fn test_blinded_hides_values_at_any_depth() {
        let inner = Error::OutOfBounds {
            param: "theta23".into(),
            side: BoundSide::Above,
            value: 61.25,
            bound: 60.0,
        };
        let e = Error::model_evaluation("set_from_rescaled", inner).blinded();
        let msg = e.to_string();
        assert!(!msg.contains("6.125"), "{msg}");
        assert!(msg.contains("<blinded>") && msg.contains("theta23"), "{msg}");
        match e {
            Error::ModelEvaluation { source, .. } => {
                assert!(matches!(*source, Error::OutOfBounds { value, .. } if value.is_nan()));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(Error::Convergence("MaxItersReached".into()).blinded().to_string(), "Optimization failed.");
        assert!(matches!(Error::Validation("x".into()).blinded(), Error::Validation(_)));
    }
}
