//! User record as seen by the marketplace core

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_seller: bool,
}

/// Which side of an order the viewer is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>, is_seller: bool) -> Self {
        Self { id: id.into(), email: email.into(), is_seller }
    }

    pub fn role(&self) -> Role {
        if self.is_seller { Role::Seller } else { Role::Buyer }
    }
}
