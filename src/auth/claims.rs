use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,  // user ID
    pub email: String,  // identity key at issuance
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
}
