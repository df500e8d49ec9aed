mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/modules/:module_id/intakes/:intake_id/weights",
            put(handlers::set_weights).get(handlers::get_weights),
        )
        .route(
            "/modules/:module_id/intakes/:intake_id/students/:student_nic/components/:component",
            put(handlers::record_component),
        )
        .route("/modules/:module_id/intakes/:intake_id/recompute", post(handlers::recompute))
        .route("/modules/:module_id/intakes/:intake_id/publish", post(handlers::publish))
        .route("/modules/:module_id/intakes/:intake_id/unpublish", post(handlers::unpublish))
        .route("/overall-scores", get(handlers::list_overall_scores))
        .route("/overall-scores/:student_nic/:module_id", put(handlers::set_overall_marks))
        .route(
            "/overall-scores/:student_nic/:module_id/override",
            delete(handlers::clear_override),
        )
}
