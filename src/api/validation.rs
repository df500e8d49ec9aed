use validator::Validate;

use crate::api::errors::ApiError;
use crate::schemas::score::ComponentMarks;
use crate::services::grading::normalize_to_percent;

pub(crate) fn validate_payload(payload: &impl Validate) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Turns raw marks into the percentage stored on the score row.
pub(crate) fn normalize_component_marks(marks: &ComponentMarks) -> Result<f64, ApiError> {
    validate_payload(marks)?;
    normalize_to_percent(marks.marks, marks.max_marks)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}
