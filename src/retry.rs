//! A loop that gives up after too many consecutive rejected attempts.

/// The result of a single attempt within [bounded_retry].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The attempt succeeded but the loop should continue.
    Progress,
    /// The attempt was rejected and counts towards the limit.
    Reject,
    /// The loop is finished.
    Done(T),
}

/// Repeatedly calls `step` until it returns [Attempt::Done], or until it has returned
/// [Attempt::Reject] `limit` times in a row, in which case `Ok(None)` is returned.
/// A [Attempt::Progress] resets the rejection count. Errors are propagated immediately.
///
/// A limit of zero is treated as a limit of one.
pub fn bounded_retry<T, E>(
    limit: usize,
    mut step: impl FnMut() -> Result<Attempt<T>, E>,
) -> Result<Option<T>, E> {
    let mut rejections = 0;
    loop {
        match step()? {
            Attempt::Done(value) => return Ok(Some(value)),
            Attempt::Progress => rejections = 0,
            Attempt::Reject => {
                rejections += 1;
                if rejections >= limit {
                    return Ok(None);
                }
            }
        }
    }
}
