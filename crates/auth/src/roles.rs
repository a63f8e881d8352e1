use core::str::FromStr;

use serde::{Deserialize, Serialize};

use brewforce_core::DomainError;

/// Role of an authenticated principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Places and cancels their own orders.
    Customer,
    /// Works the counter: sees every order and advances its status.
    Cashier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Cashier => "CASHIER",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "CASHIER" => Ok(Role::Cashier),
            other => Err(DomainError::validation(format!("unknown role: {other}"))),
        }
    }
}
