//! Property-based testing for snapchain
//!
//! Uses proptest to check the diff invariants over random inventories and
//! the snapshot round trip over random paths and timestamps.

use ::snapchain::diff::diff_inventories;
use ::snapchain::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

/// Generate absolute paths from a small alphabet so inventories overlap
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dir = prop_oneof![Just("src"), Just("docs"), Just("data dir"), Just("x,y")];
    let file = "[a-c]{1,2}(\\.txt)?";
    (prop::collection::vec(dir, 0..=2), file).prop_map(|(dirs, file)| {
        let mut path = PathBuf::from("/root");
        for d in dirs {
            path.push(d);
        }
        path.push(file);
        path
    })
}

/// Generate an inventory with timestamps from a narrow range to force collisions
fn inventory_strategy() -> impl Strategy<Value = Inventory> {
    prop::collection::vec((path_strategy(), 0i64..4), 0..30).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(path, ns)| FileRecord::new(path, ns))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_diff_partitions_union(previous in inventory_strategy(), current in inventory_strategy()) {
        let changes = diff_inventories(&previous, &current);

        prop_assert!(changes.added.is_disjoint(&changes.removed));
        prop_assert!(changes.added.is_disjoint(&changes.modified));
        prop_assert!(changes.removed.is_disjoint(&changes.modified));

        let union: BTreeSet<PathBuf> = previous.path_set().union(&current.path_set()).cloned().collect();
        let changed = changes.added.len() + changes.removed.len() + changes.modified.len();
        prop_assert_eq!(changed + changes.unchanged, union.len());

        for path in &changes.added {
            prop_assert!(current.contains(path) && !previous.contains(path));
        }
        for path in &changes.removed {
            prop_assert!(previous.contains(path) && !current.contains(path));
        }
        for path in &changes.modified {
            prop_assert_ne!(previous.get(path), current.get(path));
        }
    }

    #[test]
    fn prop_diff_with_itself_is_empty(inventory in inventory_strategy()) {
        let changes = diff_inventories(&inventory, &inventory);
        prop_assert!(!changes.has_changes());
        prop_assert_eq!(changes.unchanged, inventory.len());
    }

    #[test]
    fn prop_applying_diff_reproduces_current(previous in inventory_strategy(), current in inventory_strategy()) {
        let changes = diff_inventories(&previous, &current);

        let mut rebuilt: BTreeSet<PathBuf> = previous.path_set();
        rebuilt.extend(changes.added.iter().cloned());
        for path in &changes.removed {
            rebuilt.remove(path);
        }
        prop_assert_eq!(rebuilt, current.path_set());
    }

    #[test]
    fn prop_snapshot_round_trip(
        inventory in prop::collection::vec((path_strategy(), any::<i64>()), 0..40)
            .prop_map(|entries| entries.into_iter().map(|(p, t)| FileRecord::new(p, t)).collect::<Inventory>())
    ) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path().join("store")).unwrap();
        let day = parse_date("2024-03-01").unwrap();

        store.save(day, &inventory).unwrap();
        prop_assert_eq!(store.load_by_date(day).unwrap(), Some(inventory));
    }
}
