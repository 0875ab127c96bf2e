use crate::error::RtResult;

/// One step of a flattened recursion.
#[derive(Debug, Clone, PartialEq)]
pub enum Bounce<A, T> {
    Done(T),
    /// Deferred call: run the step again with these arguments.
    Recur(A),
}

/// Builds the deferred-call marker for the next step.
pub fn trampoline<A, T>(args: A) -> Bounce<A, T> {
    Bounce::Recur(args)
}

/// Drives `step` in a loop until it produces `Done`. Stack depth stays
/// constant no matter how many times the step recurs. Errors from `step`
/// propagate unchanged.
pub fn resolve_trampoline<A, T>(
    mut step: impl FnMut(A) -> RtResult<Bounce<A, T>>,
    args: A,
) -> RtResult<T> {
    let mut next = step(args)?;
    loop {
        next = match next {
            Bounce::Done(result) => return Ok(result),
            Bounce::Recur(args) => step(args)?,
        };
    }
}
