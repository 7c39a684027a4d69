/// Receives run events and decides how the run should proceed.
///
/// Observers let callers monitor or steer a simulation without changing its
/// API, for progress reporting, early stopping, or custom policies.
///
/// `observe` returns `Some(action)` to request a driver-specific action and
/// `None` to let the run continue unchanged.
///
/// Closures implement `Observer`, and `()` is a no-op observer.
pub trait Observer<E, A> {
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}
