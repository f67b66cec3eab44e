//! The `dude` resource served by the CRUD handlers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dude {
    /// Assigned by the database on insert; ignored in create requests.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub phrase: String,
}
