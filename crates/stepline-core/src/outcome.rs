//! The two-variant outcome every pipeline operation resolves to.
//!
//! Expected control flow travels as a value: `Ok` is a success, `Err` is a
//! failure carrying a [`PipelineError`]. Nothing in the engine reports an
//! outcome any other way.

use crate::error::PipelineError;

/// Outcome of a step, a pipeline, or a fan-out.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Builds a successful outcome.
pub fn success<T>(value: T) -> PipelineResult<T> {
    Ok(value)
}

/// Builds a failed outcome.
pub fn failure<T>(error: PipelineError) -> PipelineResult<T> {
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn test_constructors_are_exclusive() {
        let ok = success::<i32>(7);
        assert!(ok.is_ok());
        assert_eq!(ok, Ok(7));

        let err = failure::<i32>(PipelineError::new("BAD_INPUT", "nope"));
        assert!(err.is_err());
        assert_eq!(
            err.map_err(|e| e.code),
            Err(ErrorCode::Custom("BAD_INPUT".to_string()))
        );
    }
}
