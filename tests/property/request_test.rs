// tests/property/request_test.rs

//! Property-based tests for subscription requests and the retry policy

use proptest::prelude::*;
use spinelink::config::SubscriberConfig;
use spinelink::core::SubscriptionRequest;
use spinelink::core::executor::ttl_from_millis;
use spinelink::core::subscriber::RetryPolicy;
use std::collections::HashSet;
use std::time::Duration;

proptest! {
    #[test]
    fn test_request_channels_are_unique_and_ordered(
        channels in prop::collection::vec("[a-c]{1,2}", 1..=30)
    ) {
        let request = SubscriptionRequest::new(channels.clone(), |_, _| {}).unwrap();

        // Same set of names, each once, in order of first appearance.
        let mut seen = HashSet::new();
        let expected: Vec<String> = channels
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        prop_assert_eq!(request.channels(), expected.as_slice());
    }

    #[test]
    fn test_ttl_clamp(ttl in any::<i64>()) {
        match ttl_from_millis(ttl) {
            None => prop_assert!(ttl <= 0),
            Some(d) => {
                prop_assert!(ttl > 0);
                prop_assert_eq!(d.as_millis(), ttl as u128);
            }
        }
    }

    #[test]
    fn test_retry_delay_is_monotonic_and_capped(
        initial_ms in 0u64..5_000,
        extra_ms in 0u64..60_000,
        steps in 1usize..40
    ) {
        let config = SubscriberConfig {
            reconnect_initial_delay: Duration::from_millis(initial_ms),
            reconnect_max_delay: Duration::from_millis(initial_ms + extra_ms),
            ..SubscriberConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);

        let mut delay = policy.initial_delay;
        for _ in 0..steps {
            let next = policy.next_delay(delay);
            prop_assert!(next >= delay);
            prop_assert!(next <= policy.max_delay);
            delay = next;
        }
    }
}
