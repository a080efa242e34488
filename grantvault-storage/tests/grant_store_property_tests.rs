//! Property-Based Tests for the grant store
//!
//! For any set of grants belonging to one subject:
//! - every stored grant reads back unchanged
//! - `get_all` returns exactly the grants the filter matches
//! - `remove_all` removes exactly the grants the filter matches
//! - index sets never expire before the longest-lived grant they list

use std::collections::BTreeMap;
use std::time::Duration;

use grantvault_core::{ClaimsPrincipal, Grant};
use grantvault_storage::{KeyValueStore, PersistedGrantStore};
use grantvault_test_utils::{fixtures::TestBed, generators};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

/// Last write per key wins, as in the store.
fn latest_by_key(grants: &[Grant]) -> BTreeMap<String, Grant> {
    grants.iter().map(|g| (g.key.clone(), g.clone())).collect()
}

fn sorted_keys(grants: impl IntoIterator<Item = Grant>) -> Vec<String> {
    let mut keys: Vec<String> = grants.into_iter().map(|g| g.key).collect();
    keys.sort();
    keys
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_store_then_get_returns_same_grant(grant in generators::arb_grant(chrono::Utc::now())) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let bed = TestBed::new();
            // Keep the grant alive relative to the test clock.
            let mut grant = grant;
            grant.creation_time = bed.now();
            grant.expiration = bed.now() + chrono::Duration::hours(1);

            bed.store.store(&grant).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            bed.store.store(&grant).await.map_err(|e| TestCaseError::fail(e.to_string()))?;

            let fetched = bed.store.get(&grant.key).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(fetched.as_ref(), Some(&grant));

            let subject = grant.subject_id.clone().unwrap_or_default();
            let listed = bed
                .store
                .get_all(&grantvault_core::GrantFilter::for_subject(subject))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(listed, vec![grant]);
            Ok(())
        })?;
    }

    #[test]
    fn prop_get_all_returns_exactly_matching_grants(
        (grants, filter) in (
            generators::arb_subject_grants("S".to_string(), chrono::Utc::now(), 12),
            generators::arb_filter("S".to_string()),
        )
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let bed = TestBed::new();
            let grants: Vec<Grant> = grants
                .into_iter()
                .map(|mut g| {
                    g.creation_time = bed.now();
                    g.expiration = bed.now() + chrono::Duration::hours(1);
                    g
                })
                .collect();
            for grant in &grants {
                bed.store.store(grant).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            }

            let expected = sorted_keys(
                latest_by_key(&grants)
                    .into_values()
                    .filter(|g| filter.matches(g)),
            );
            let found = bed
                .store
                .get_all(&filter)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(sorted_keys(found), expected);
            Ok(())
        })?;
    }

    #[test]
    fn prop_remove_all_removes_exactly_matching_grants(
        (grants, filter) in (
            generators::arb_subject_grants("S".to_string(), chrono::Utc::now(), 12),
            generators::arb_filter("S".to_string()),
        )
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let bed = TestBed::new();
            let grants: Vec<Grant> = grants
                .into_iter()
                .map(|mut g| {
                    g.creation_time = bed.now();
                    g.expiration = bed.now() + chrono::Duration::hours(1);
                    g
                })
                .collect();
            for grant in &grants {
                bed.store.store(grant).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            }

            bed.store
                .remove_all(&filter)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let expected = sorted_keys(
                latest_by_key(&grants)
                    .into_values()
                    .filter(|g| !filter.matches(g)),
            );
            let remaining = bed
                .store
                .get_all(&grantvault_core::GrantFilter::for_subject("S"))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(sorted_keys(remaining), expected);
            Ok(())
        })?;
    }

    #[test]
    fn prop_index_ttl_tracks_longest_grant(
        grants in generators::arb_subject_grants("S".to_string(), chrono::Utc::now(), 8)
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let bed = TestBed::new();
            let now = bed.now();
            let mut longest = 0i64;
            for grant in &grants {
                let lifetime = (grant.expiration - grant.creation_time).num_seconds();
                let mut grant = grant.clone();
                grant.creation_time = now;
                grant.expiration = now + chrono::Duration::seconds(lifetime);
                bed.store.store(&grant).await.map_err(|e| TestCaseError::fail(e.to_string()))?;

                longest = longest.max(lifetime);
                let ttl = bed
                    .kv
                    .key_time_to_live("S")
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(ttl, Some(Duration::from_secs(longest as u64)));
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_claims_survive_grant_payload(principal in generators::arb_principal()) {
        let bed = TestBed::new();
        let payload = serde_json::to_string(&principal)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let grant = Grant::new("k", payload, bed.now(), bed.now());

        let decoded = Grant::from_json(&grant.to_json().map_err(|e| TestCaseError::fail(e.to_string()))?)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&decoded, &grant);

        let claims: ClaimsPrincipal = serde_json::from_str(&decoded.data)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(claims, principal);
    }
}
