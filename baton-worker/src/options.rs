//! Worker options
//!
//! Per-worker polling configuration and the composable options that
//! modify it. Options are applied in order and the last one to touch a
//! field wins. Batch size and poll interval ignore non-positive values;
//! poll timeout and domain are taken verbatim.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of tasks leased per poll
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Default pause between two polls of the same worker
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the server may hold a poll request open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollTimeout {
    /// Let the server pick its default long-poll duration
    #[default]
    ServerDefault,
    /// Hold the request at most this long; zero returns immediately
    Bounded(Duration),
}

impl PollTimeout {
    /// Maps a millisecond count the way the server API does: negative means
    /// server default, anything else is a bound.
    pub fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(millis) => Self::Bounded(Duration::from_millis(millis)),
            Err(_) => Self::ServerDefault,
        }
    }

    /// The bound to send to the server, if any
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::ServerDefault => None,
            Self::Bounded(timeout) => Some(*timeout),
        }
    }
}

impl From<Duration> for PollTimeout {
    fn from(timeout: Duration) -> Self {
        Self::Bounded(timeout)
    }
}

/// Snapshot of a worker's polling configuration
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Tasks leased per poll; also the ceiling on in-flight invocations
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub poll_timeout: PollTimeout,
    /// Queue partition to poll; `None` polls the default queue
    pub domain: Option<String>,
    /// Long-lived token whose cancellation stops this worker and is
    /// inherited by every task context it creates
    pub base_context: Option<Arc<CancellationToken>>,
}

impl WorkerOptions {
    /// Applies `options` in order on top of `self` and returns the result
    pub fn apply(mut self, options: impl IntoIterator<Item = WorkerOption>) -> Self {
        for option in options {
            (option.0)(&mut self);
        }
        self
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: PollTimeout::ServerDefault,
            domain: None,
            base_context: None,
        }
    }
}

impl PartialEq for WorkerOptions {
    fn eq(&self, other: &Self) -> bool {
        let same_context = match (&self.base_context, &other.base_context) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };

        same_context
            && self.batch_size == other.batch_size
            && self.poll_interval == other.poll_interval
            && self.poll_timeout == other.poll_timeout
            && self.domain == other.domain
    }
}

/// A single configuration change applied to [`WorkerOptions`]
///
/// ```
/// use baton_worker::options::{WorkerOption, WorkerOptions};
/// use std::time::Duration;
///
/// let options = WorkerOptions::default().apply([
///     WorkerOption::batch_size(5),
///     WorkerOption::poll_interval(Duration::from_millis(250)),
///     WorkerOption::batch_size(0), // ignored
/// ]);
/// assert_eq!(options.batch_size, 5);
/// ```
#[derive(Clone)]
pub struct WorkerOption(Arc<dyn Fn(&mut WorkerOptions) + Send + Sync>);

impl WorkerOption {
    fn new(f: impl Fn(&mut WorkerOptions) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Sets the batch size; zero is ignored
    pub fn batch_size(size: usize) -> Self {
        Self::new(move |options| {
            if size > 0 {
                options.batch_size = size;
            }
        })
    }

    /// Sets the poll interval; a zero interval is ignored
    pub fn poll_interval(interval: Duration) -> Self {
        Self::new(move |options| {
            if !interval.is_zero() {
                options.poll_interval = interval;
            }
        })
    }

    /// Sets the poll timeout verbatim, including zero
    pub fn poll_timeout(timeout: impl Into<PollTimeout>) -> Self {
        let timeout = timeout.into();
        Self::new(move |options| options.poll_timeout = timeout)
    }

    /// Sets the domain verbatim; an empty string selects the default queue
    pub fn domain(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self::new(move |options| {
            options.domain = if domain.is_empty() {
                None
            } else {
                Some(domain.clone())
            };
        })
    }

    /// Ties the worker's lifetime and its task contexts to `token`
    pub fn base_context(token: CancellationToken) -> Self {
        let token = Arc::new(token);
        Self::new(move |options| options.base_context = Some(Arc::clone(&token)))
    }
}

impl fmt::Debug for WorkerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkerOption")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_options() {
        let options = WorkerOptions::default();
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.poll_interval, Duration::from_millis(100));
        assert_eq!(options.poll_timeout, PollTimeout::ServerDefault);
        assert_eq!(options.domain, None);
        assert!(options.base_context.is_none());
    }

    #[test]
    fn test_batch_size_ignores_zero() {
        let base = WorkerOptions {
            batch_size: 99,
            ..Default::default()
        };

        assert_eq!(base.clone().apply([WorkerOption::batch_size(0)]).batch_size, 99);
        assert_eq!(base.clone().apply([WorkerOption::batch_size(1)]).batch_size, 1);
        assert_eq!(base.apply([WorkerOption::batch_size(5)]).batch_size, 5);
    }

    #[test]
    fn test_poll_interval_ignores_zero() {
        let base = WorkerOptions {
            poll_interval: Duration::from_millis(987),
            ..Default::default()
        };

        let options = base.clone().apply([WorkerOption::poll_interval(Duration::ZERO)]);
        assert_eq!(options.poll_interval, Duration::from_millis(987));

        let options = base.apply([WorkerOption::poll_interval(Duration::from_millis(50))]);
        assert_eq!(options.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_poll_timeout_accepts_any_value() {
        let base = WorkerOptions {
            poll_timeout: PollTimeout::Bounded(Duration::from_millis(111)),
            ..Default::default()
        };

        let options = base.clone().apply([WorkerOption::poll_timeout(Duration::ZERO)]);
        assert_eq!(options.poll_timeout, PollTimeout::Bounded(Duration::ZERO));

        let options = base
            .clone()
            .apply([WorkerOption::poll_timeout(PollTimeout::from_millis(-1000))]);
        assert_eq!(options.poll_timeout, PollTimeout::ServerDefault);

        let options = base.apply([WorkerOption::poll_timeout(Duration::from_millis(250))]);
        assert_eq!(options.poll_timeout.as_duration(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_poll_timeout_from_millis() {
        assert_eq!(PollTimeout::from_millis(-1), PollTimeout::ServerDefault);
        assert_eq!(PollTimeout::from_millis(0), PollTimeout::Bounded(Duration::ZERO));
        assert_eq!(
            PollTimeout::from_millis(100),
            PollTimeout::Bounded(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_domain_set_as_is() {
        let base = WorkerOptions {
            domain: Some("old".to_string()),
            ..Default::default()
        };

        assert_eq!(base.clone().apply([WorkerOption::domain("")]).domain, None);
        assert_eq!(
            base.clone().apply([WorkerOption::domain("testing")]).domain.as_deref(),
            Some("testing")
        );
        assert_eq!(
            base.apply([WorkerOption::domain("  spaced  ")]).domain.as_deref(),
            Some("  spaced  ")
        );
    }

    #[test]
    fn test_base_context_compared_by_identity() {
        let token = CancellationToken::new();
        let option = WorkerOption::base_context(token.clone());

        let a = WorkerOptions::default().apply([option.clone()]);
        let b = WorkerOptions::default().apply([option]);
        let c = WorkerOptions::default().apply([WorkerOption::base_context(token)]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, WorkerOptions::default());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Batch(usize),
        Interval(u64),
        Timeout(i64),
        Domain(String),
    }

    impl Op {
        fn option(&self) -> WorkerOption {
            match self {
                Op::Batch(size) => WorkerOption::batch_size(*size),
                Op::Interval(ms) => WorkerOption::poll_interval(Duration::from_millis(*ms)),
                Op::Timeout(ms) => WorkerOption::poll_timeout(PollTimeout::from_millis(*ms)),
                Op::Domain(domain) => WorkerOption::domain(domain.clone()),
            }
        }
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..20).prop_map(Op::Batch),
            (0u64..500).prop_map(Op::Interval),
            (-1000i64..1000).prop_map(Op::Timeout),
            "[a-z]{0,6}".prop_map(Op::Domain),
        ]
    }

    proptest! {
        #[test]
        fn prop_last_valid_option_wins(ops in prop::collection::vec(arb_op(), 0..16)) {
            let options = WorkerOptions::default().apply(ops.iter().map(Op::option));

            let mut expected = WorkerOptions::default();
            for op in &ops {
                match op {
                    Op::Batch(size) if *size > 0 => expected.batch_size = *size,
                    Op::Interval(ms) if *ms > 0 => {
                        expected.poll_interval = Duration::from_millis(*ms)
                    }
                    Op::Timeout(ms) => expected.poll_timeout = PollTimeout::from_millis(*ms),
                    Op::Domain(domain) => {
                        expected.domain = Some(domain.clone()).filter(|d| !d.is_empty())
                    }
                    _ => {}
                }
            }

            prop_assert_eq!(options, expected);
        }

        #[test]
        fn prop_apply_never_mutates_receiver(ops in prop::collection::vec(arb_op(), 0..16)) {
            let base = WorkerOptions::default().apply([WorkerOption::batch_size(3)]);
            let before = base.clone();

            let _derived = base.clone().apply(ops.iter().map(Op::option));

            prop_assert_eq!(base, before);
        }
    }
}
