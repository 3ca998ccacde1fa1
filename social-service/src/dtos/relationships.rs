use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::RelationshipView;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RelationshipResponse {
    #[schema(example = "bob")]
    pub other: String,
    /// One of `none`, `pending_out`, `pending_in`, `friend`, `blocked`, `access_blocked`
    #[schema(value_type = String, example = "friend")]
    pub view: RelationshipView,
}
