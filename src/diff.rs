//! Inventory comparison
//!
//! Classifies every path of two inventories as added, removed, modified or
//! unchanged. With `P` the previous and `C` the current path set:
//!
//! - `removed = P - C`
//! - `added = C - P`
//! - `modified` = paths of `P ∩ C` whose modification times differ
//!
//! Everything else in `P ∩ C` is unchanged and appears in no set. Only the
//! modification time is compared, so a content change that keeps the
//! timestamp goes unnoticed.
//!
//! ## Examples
//!
//! ```rust
//! use snapchain::diff::diff_inventories;
//! use snapchain::types::{FileRecord, Inventory};
//!
//! let previous: Inventory = vec![FileRecord::new("/a".into(), 1)].into_iter().collect();
//! let current: Inventory = vec![
//!     FileRecord::new("/a".into(), 1),
//!     FileRecord::new("/c".into(), 3),
//! ].into_iter().collect();
//!
//! let changes = diff_inventories(&previous, &current);
//! assert_eq!(changes.added.len(), 1);
//! assert!(changes.removed.is_empty() && changes.modified.is_empty());
//! ```

use crate::types::{ChangeSet, Inventory};
use tracing::debug;

/// Compare a previous inventory against the current one
pub fn diff_inventories(previous: &Inventory, current: &Inventory) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, prev_ns) in previous.iter() {
        match current.get(path) {
            None => {
                changes.removed.insert(path.to_path_buf());
            }
            Some(cur_ns) if cur_ns != prev_ns => {
                changes.modified.insert(path.to_path_buf());
            }
            Some(_) => changes.unchanged += 1,
        }
    }

    changes.added = current
        .paths()
        .filter(|path| !previous.contains(path))
        .map(|path| path.to_path_buf())
        .collect();

    debug!(
        "Diff: {} added, {} removed, {} modified, {} unchanged",
        changes.added.len(),
        changes.removed.len(),
        changes.modified.len(),
        changes.unchanged
    );
    changes
}

/// Change set of a first run: every current file is new
pub fn initial_changes(current: &Inventory) -> ChangeSet {
    diff_inventories(&Inventory::new(), current)
}
