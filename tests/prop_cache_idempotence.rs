// Property: resolution cache idempotence
//
// - resolving a cached key without force never calls the resolver again
// - invalidating an absent key is a no-op, any number of times
// - a forced refresh always calls the resolver and replaces the entry

mod common;

use cloud_streamer::{ObjectKey, ResolutionCache};
use common::ScriptedResolver;
use proptest::prelude::*;
use std::sync::Arc;

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(name).unwrap()
}

fn scripted(keys: &[String]) -> Arc<ScriptedResolver> {
    let resolver = ScriptedResolver::new();
    for name in keys {
        let urls = (1..=4)
            .map(|v| format!("https://origin.example/{}/v{}", name, v))
            .collect();
        resolver.add(name, urls, 4096);
    }
    resolver
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_repeated_resolves_hit_the_cache(
        keys in prop::collection::hash_set("[a-z]{1,6}", 1..6),
        repeats in 1usize..10,
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let resolver = scripted(&keys);
        let cache = ResolutionCache::new(resolver.clone());

        tokio_test::block_on(async {
            for _ in 0..repeats {
                for name in &keys {
                    cache.resolve(&key(name), false).await.unwrap();
                }
            }
        });

        prop_assert_eq!(resolver.resolve_calls(), keys.len());
        prop_assert_eq!(cache.len(), keys.len());
        prop_assert_eq!(cache.stats().hits as usize, keys.len() * (repeats - 1));
    }

    #[test]
    fn prop_invalidate_absent_key_is_noop(name in "[a-z]{1,6}", times in 1usize..5) {
        let resolver = scripted(&[]);
        let cache = ResolutionCache::new(resolver.clone());

        for _ in 0..times {
            prop_assert!(!cache.invalidate(&key(&name)));
        }
        prop_assert!(cache.is_empty());
        prop_assert_eq!(resolver.resolve_calls(), 0);
    }

    #[test]
    fn prop_forced_refresh_replaces_entry(name in "[a-z]{1,6}", refreshes in 1usize..4) {
        let resolver = scripted(&[name.clone()]);
        let cache = ResolutionCache::new(resolver.clone());

        let (first, last) = tokio_test::block_on(async {
            let first = cache.resolve(&key(&name), false).await.unwrap();
            let mut last = first.clone();
            for _ in 0..refreshes {
                cache.invalidate(&key(&name));
                last = cache.resolve(&key(&name), true).await.unwrap();
            }
            (first, last)
        });

        prop_assert_eq!(resolver.resolve_calls(), refreshes + 1);
        prop_assert_ne!(&first.direct_url, &last.direct_url);
        prop_assert_eq!(first.total_length, last.total_length);
        prop_assert_eq!(cache.get(&key(&name)).unwrap().direct_url, last.direct_url);
    }
}
