use chrono::{DateTime, Utc};

/// A fact recorded on one aggregate stream.
///
/// `event_type` is stored next to the JSON payload so consumers (projections,
/// kitchen displays) can route an envelope without decoding it. Once events of
/// a type are stored, its name never changes.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted `<context>.<aggregate>.<fact>` name, e.g. `catalog.item.stock_reserved`.
    fn event_type(&self) -> &'static str;

    /// Payload schema revision. Bump it when a stored shape changes.
    fn version(&self) -> u32 {
        1
    }

    /// Business time of the fact, not the time it was appended.
    fn occurred_at(&self) -> DateTime<Utc>;
}
