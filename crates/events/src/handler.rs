/// Decide and evolve in one step, without a store or bus.
///
/// Handy for unit tests and property tests that walk an aggregate through a
/// sequence of commands. Production paths go through the command dispatcher,
/// which adds persistence and optimistic concurrency.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: tradelane_core::Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
