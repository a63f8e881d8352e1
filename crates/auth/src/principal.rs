use serde::{Deserialize, Serialize};

use crate::Role;

/// An authenticated caller: username plus role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    username: String,
    role: Role,
}

impl Principal {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    pub fn customer(username: impl Into<String>) -> Self {
        Self::new(username, Role::Customer)
    }

    pub fn cashier(username: impl Into<String>) -> Self {
        Self::new(username, Role::Cashier)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Cashiers see every order; customers only their own.
    pub fn can_view_order_of(&self, owner: &str) -> bool {
        match self.role {
            Role::Cashier => true,
            Role::Customer => self.username == owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customers_only_see_their_own_orders() {
        let alice = Principal::customer("alice");
        assert!(alice.can_view_order_of("alice"));
        assert!(!alice.can_view_order_of("bob"));

        let counter = Principal::cashier("dina");
        assert!(counter.can_view_order_of("alice"));
        assert!(counter.can_view_order_of("bob"));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("cashier".parse::<Role>().unwrap(), Role::Cashier);
        assert_eq!(" CUSTOMER ".parse::<Role>().unwrap(), Role::Customer);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&Principal::cashier("dina")).unwrap();
        assert_eq!(json, r#"{"username":"dina","role":"CASHIER"}"#);
    }
}
