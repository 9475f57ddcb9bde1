use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub lawyer_id: String,
    pub author_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
}
