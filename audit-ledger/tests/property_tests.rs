//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Deterministic hashing: same fields → same transaction and block hash
//! - Display-only fields never influence a hash
//! - Merkle: odd levels duplicate the last node, every proof verifies
//! - Sealing: n submissions at threshold t → n / t blocks, n % t pending

use audit_ledger::{
    crypto::digest,
    merkle::{hash_pair, merkle_root, MerkleTree},
    AssetEvent, Block, Config, Hash256, Ledger, Transaction, ZoneRef,
};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

/// Strategy for generating leaf hashes
fn leaves_strategy(max: usize) -> impl Strategy<Value = Vec<Hash256>> {
    prop::collection::vec(any::<[u8; 32]>().prop_map(Hash256::from_bytes), 1..max)
}

/// Strategy for generating millisecond timestamps
fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_600_000_000_000i64..1_900_000_000_000i64)
        .prop_map(|millis| Utc.timestamp_millis_opt(millis).unwrap())
}

/// Strategy for generating event types
fn event_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("movement".to_string()),
        Just("status_change".to_string()),
        Just("maintenance".to_string()),
        Just("theft_alert".to_string()),
        Just("zone_violation".to_string()),
    ]
}

/// Strategy for generating raw asset events
fn event_strategy() -> impl Strategy<Value = AssetEvent> {
    (
        1u64..10_000,
        event_type_strategy(),
        prop::option::of(1u64..50),
        prop::option::of(1u64..50),
        prop::collection::btree_map("[a-z]{1,8}", 0i64..1000, 0..5),
    )
        .prop_map(|(asset_id, event_type, from, to, metadata)| {
            AssetEvent::for_asset(asset_id)
                .with_event_type(event_type)
                .with_movement(
                    from.map(|id| ZoneRef::named(id, format!("Zone {}", id))),
                    to.map(|id| ZoneRef::named(id, format!("Zone {}", id))),
                )
                .with_metadata(serde_json::to_value(metadata).unwrap())
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Transaction hash is deterministic and recomputable
    #[test]
    fn prop_transaction_hash_deterministic(event in event_strategy(), ts in timestamp_strategy()) {
        let tx1 = Transaction::from_event(event.clone(), ts).unwrap();
        let tx2 = Transaction::from_event(event, ts).unwrap();

        prop_assert_eq!(tx1.transaction_hash, tx2.transaction_hash);
        prop_assert_eq!(tx1.compute_hash(), tx1.transaction_hash);
    }

    /// Property: Asset tag and zone names never affect the hash
    #[test]
    fn prop_display_fields_not_hashed(event in event_strategy(), ts in timestamp_strategy(), tag in "[A-Z]{3}-[0-9]{4}") {
        let plain = Transaction::from_event(event.clone(), ts).unwrap();

        let mut renamed = event.with_asset_tag(tag);
        if let Some(zone) = renamed.from_zone.as_mut() {
            zone.name = Some("Renamed".to_string());
        }
        if let Some(zone) = renamed.to_zone.as_mut() {
            zone.name = None;
        }
        let decorated = Transaction::from_event(renamed, ts).unwrap();

        prop_assert_eq!(plain.transaction_hash, decorated.transaction_hash);
    }

    /// Property: Any change to a hashed field changes the hash
    #[test]
    fn prop_hashed_fields_bind(event in event_strategy(), ts in timestamp_strategy()) {
        let original = Transaction::from_event(event.clone(), ts).unwrap();

        let mut other_asset = event.clone();
        other_asset.asset_id = event.asset_id.map(|id| id + 1);
        let moved = Transaction::from_event(other_asset, ts).unwrap();
        prop_assert_ne!(original.transaction_hash, moved.transaction_hash);

        let later = Transaction::from_event(event, ts + chrono::Duration::milliseconds(1)).unwrap();
        prop_assert_ne!(original.transaction_hash, later.transaction_hash);
    }

    /// Property: Block hash recomputation is idempotent
    #[test]
    fn prop_block_hash_recomputable(number in 1u64..1_000_000, leaves in leaves_strategy(20), ts in timestamp_strategy()) {
        let previous = digest(number.to_be_bytes());
        let block = Block::seal(number, previous, merkle_root(&leaves), ts, leaves.len() as u32);

        prop_assert_eq!(block.compute_hash(), block.block_hash);
        prop_assert_eq!(block.compute_hash(), block.compute_hash());
        prop_assert_eq!(block.nonce, 0);
    }

    /// Property: An odd level pairs its last node with itself
    #[test]
    fn prop_odd_levels_duplicate_last(leaves in leaves_strategy(64)) {
        prop_assume!(leaves.len() % 2 == 1);

        let mut padded = leaves.clone();
        padded.push(*leaves.last().unwrap());

        prop_assert_eq!(merkle_root(&leaves), merkle_root(&padded));
    }

    /// Property: Single leaf root is the leaf paired with itself
    #[test]
    fn prop_single_leaf_root(leaf in any::<[u8; 32]>().prop_map(Hash256::from_bytes)) {
        prop_assert_eq!(merkle_root(&[leaf]), hash_pair(&leaf, &leaf));
    }

    /// Property: Every leaf has a proof that verifies against the root
    #[test]
    fn prop_every_proof_verifies(leaves in leaves_strategy(64), pick in any::<prop::sample::Index>()) {
        let tree = MerkleTree::from_leaves(leaves.clone());
        let index = pick.index(leaves.len());

        let proof = tree.generate_proof(index).unwrap();
        prop_assert!(proof.verify());
        prop_assert_eq!(proof.root_hash, merkle_root(&leaves));
        prop_assert!(tree.verify_leaf(index, leaves[index]));
    }

    /// Property: Merkle root binds leaf order
    #[test]
    fn prop_merkle_root_order_sensitive(leaves in leaves_strategy(32)) {
        prop_assume!(leaves.len() >= 2 && leaves[0] != leaves[1]);

        let mut swapped = leaves.clone();
        swapped.swap(0, 1);

        prop_assert_ne!(merkle_root(&leaves), merkle_root(&swapped));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: Threshold sealing splits submissions into full blocks
    #[test]
    fn prop_threshold_sealing(threshold in 1usize..8, submissions in 0u64..30) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.data_dir = temp_dir.path().to_path_buf();
            config.sealing.timer_enabled = false; // Threshold seals only
            config.sealing.max_transactions_per_block = threshold;

            let ledger = Ledger::open(config).await.unwrap();

            for seq in 0..submissions {
                let event = AssetEvent::for_asset(seq + 1)
                    .with_event_type("movement")
                    .with_metadata(serde_json::json!({ "seq": seq }));
                ledger.submit(event).await.unwrap();
            }

            let threshold = threshold as u64;
            let tip = ledger.tip().await.unwrap();
            prop_assert_eq!(tip.block_number, submissions / threshold);
            prop_assert_eq!(ledger.pending_count().await.unwrap() as u64, submissions % threshold);

            for number in 1..=tip.block_number {
                let detail = ledger.get_block(number).unwrap().unwrap();
                prop_assert_eq!(detail.block.event_count as u64, threshold);
            }

            let report = ledger.verify().unwrap();
            prop_assert!(report.valid);
            prop_assert_eq!(report.blocks_verified, tip.block_number + 1);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
