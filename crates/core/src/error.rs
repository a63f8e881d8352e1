//! Domain error model.

use thiserror::Error;

use crate::id::AggregateId;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// Every variant carries enough context (offending id, quantities, statuses)
/// for a caller to build a precise user-facing message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A business conflict (e.g. the owner already has an active order).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stock decrement would drive an item's stock negative.
    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: AggregateId,
        available: i64,
        requested: i64,
    },

    /// The item is soft-deleted and can no longer be sold or edited.
    #[error("item {item_id} is deleted")]
    ItemDeleted { item_id: AggregateId },

    /// A status change outside the allowed transition table.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Authorization failure at the domain boundary.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}
