use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Interaction {
    pub id: i64,
    pub user_id: Option<i64>,
    pub user_message: String,
    pub bot_reply: String,
    pub success: bool,
    pub created_at: String,
}
