//! Ordered fan-in for concurrent collaborator calls.

use tokio::task::JoinSet;
use tokio::time::Instant;

/// Drain `set` into a vector indexed by request position.
///
/// Tasks report `(index, value)`; a task that panicked leaves its slot as
/// `None`. Returns `None` when `deadline` passes first. The caller owns the
/// set, so dropping it afterwards aborts whatever is still running.
pub(crate) async fn join_in_order<T: Send + 'static>(
    set: &mut JoinSet<(usize, T)>,
    size: usize,
    deadline: Option<Instant>,
) -> Option<Vec<Option<T>>> {
    let mut slots: Vec<Option<T>> = (0..size).map(|_| None).collect();
    loop {
        let next = match deadline {
            Some(d) => tokio::time::timeout_at(d, set.join_next()).await.ok()?,
            None => set.join_next().await,
        };
        match next {
            Some(Ok((i, value))) if i < size => slots[i] = Some(value),
            Some(Ok(_)) | Some(Err(_)) => {}
            None => return Some(slots),
        }
    }
}
