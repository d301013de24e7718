use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::users;

/// Public profile fields shown in the participant picker.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = users)]
pub struct UserSummary {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
