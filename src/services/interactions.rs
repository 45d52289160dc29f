use std::sync::Arc;

use crate::db::queries;
use crate::state::AppState;

pub const MASKED_SECRET: &str = "********";

/// Appends one turn to the interaction log. Failures are logged, never propagated.
pub fn record_interaction(
    state: &Arc<AppState>,
    user_id: Option<i64>,
    user_message: &str,
    bot_reply: &str,
    success: bool,
) {
    let result = {
        let db = state.db();
        queries::insert_interaction(&db, user_id, user_message, bot_reply, success)
    };

    match result {
        Ok(id) => tracing::debug!(interaction_id = id, success, "recorded interaction"),
        Err(e) => tracing::error!(error = %e, "failed to record interaction"),
    }
}
