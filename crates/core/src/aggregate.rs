//! Aggregates: the consistency boundaries of the engine.
//!
//! A catalog item guards its stock, an order guards its status, an owner's
//! slot guards "one active order". Each is rebuilt from its own event stream
//! and every change is appended against the version it was decided on.

/// Identity and stream revision of an aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far; 0 for a stream that does not exist.
    fn version(&self) -> u64;
}

/// Version a stream must be at for an append to go through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append unconditionally.
    Any,
    /// The stream must be exactly at this version (0 = not created yet).
    Exact(u64),
}

/// An append lost the race: the stream moved since it was loaded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub expected: ExpectedVersion,
    pub actual: u64,
}

impl core::fmt::Display for VersionMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "stream is at version {}, expected {}", self.actual, self.expected)
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ExpectedVersion::Any => f.write_str("any version"),
            ExpectedVersion::Exact(v) => write!(f, "version {v}"),
        }
    }
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn verify(self, actual: u64) -> Result<(), VersionMismatch> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(VersionMismatch { expected: self, actual })
        }
    }
}

/// Pure decide/evolve pair.
///
/// `handle` looks at the current state and returns the events a command
/// produces (empty means nothing to do) without touching `self`; `apply`
/// folds one event into the state and bumps `version` by one. Neither may do
/// IO: stores, buses and retries live in infra.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
