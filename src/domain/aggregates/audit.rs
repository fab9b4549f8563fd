//! Product audit trail, written in the same transaction as the change it records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    RestoreProduct,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProduct => "create_product",
            Self::UpdateProduct => "update_product",
            Self::DeleteProduct => "delete_product",
            Self::RestoreProduct => "restore_product",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_product" => Ok(Self::CreateProduct),
            "update_product" => Ok(Self::UpdateProduct),
            "delete_product" => Ok(Self::DeleteProduct),
            "restore_product" => Ok(Self::RestoreProduct),
            other => Err(format!("unknown audit action '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    pub actor_id: String,
    pub product_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor_id: &str, product_id: &str, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            action,
            actor_id: actor_id.to_string(),
            product_id: product_id.to_string(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}
