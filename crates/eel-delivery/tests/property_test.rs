//! Property-based tests for retry bounds.

#![allow(clippy::unwrap_used)]

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use eel_core::{Context, TestClock};
use eel_delivery::{BackoffMethod, Exchange, OutboundRequest, RetryDriver, RetryPolicy, Transport};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 48,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

#[derive(Debug)]
struct Fixed {
    status: u16,
    calls: AtomicU32,
}

#[async_trait]
impl Transport for Fixed {
    async fn send(&self, _ctx: &Context, _request: &OutboundRequest) -> Exchange {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Exchange::response(self.status, "")
    }
}

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (0u32..8, 0u64..100, 0u64..100, 0u64..20, any::<bool>()).prop_map(
        |(max_attempts, delay, backoff, pad, constant)| RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(delay),
            initial_backoff: Duration::from_millis(backoff),
            pad: Duration::from_millis(pad),
            backoff_method: if constant { BackoffMethod::Constant } else { BackoffMethod::Exponential },
        },
    )
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn attempts_never_exceed_limit(policy in policy_strategy(), status in 100u16..600) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let transport = Fixed { status, calls: AtomicU32::new(0) };
        let clock = TestClock::new();
        let driver = RetryDriver::new(policy, Arc::new(clock.clone()));

        let exchange = runtime.block_on(driver.retry(&Context::new(), &OutboundRequest::default(), &transport));

        let calls = transport.calls.load(Ordering::SeqCst);
        prop_assert!(calls >= 1);
        prop_assert!(calls <= policy.max_attempts.max(1));
        prop_assert_eq!(exchange.status, status);
        if (200..=499).contains(&status) {
            prop_assert_eq!(calls, 1);
        } else {
            prop_assert_eq!(calls, policy.max_attempts.max(1));
        }
        prop_assert_eq!(clock.sleep_count(), u64::from(calls - 1));
    }

    #[test]
    fn schedule_respects_wall_clock_bound(policy in policy_strategy()) {
        let total: Duration = policy.schedule().iter().sum();
        let limit = policy.attempt_limit();
        let mut bound = if limit > 1 { policy.initial_delay } else { Duration::ZERO };
        for i in 1..limit.saturating_sub(1) {
            bound += policy.initial_backoff * 2u32.pow(i) + policy.pad;
        }
        prop_assert!(total <= bound, "{total:?} > {bound:?}");
    }
}
