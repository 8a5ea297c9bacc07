/*! Clock used by the onion announce service.
*/

use std::time::Instant;

/// Source of monotonic time.
///
/// The service never reads time from a global so that tests can control it.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Instant;
}

/// `Clock` backed by tokio time. It can be paused and advanced in tests with
/// `tokio::time::pause` and `tokio::time::advance`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
