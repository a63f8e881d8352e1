/// Execute an aggregate command in place (no IO, no persistence).
///
/// Decides with `handle`, then evolves the aggregate with `apply` for each
/// emitted event. Useful for unit tests and for replaying a freshly decided
/// batch onto a rehydrated aggregate; the persisted pipeline lives in the
/// infra command dispatcher.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: brewforce_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
