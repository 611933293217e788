//! Cursor merge engine: polled snapshots combined with pushed changes.
//!
//! Two input streams feed the monitoring view: a periodic full poll of all
//! cursors and a push subscription delivering insert/update notifications as
//! they occur. Both are at-least-once and possibly out of order, so the
//! merge is modeled as a reducer over an event overlay keyed by cursor id:
//!
//! - insert for an unseen id prepends to the overlay;
//! - update for a known id replaces that id's overlay entry in place;
//! - update for an unseen id is applied as an insert (the paired insert may
//!   simply not have arrived yet);
//! - the merged view is the overlay followed by polled entries whose id the
//!   overlay does not cover.
//!
//! The overlay always wins over the poll for ids it covers, and re-applying
//! any event is a no-op on the result. The engine holds no locks; it has
//! exactly one logical writer (the monitor's recomputation pass).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::cursor::Cursor;

/// A pushed cursor change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "cursor", rename_all = "snake_case")]
pub enum CursorChange {
    /// A cursor was created by the backfill worker.
    Insert(Cursor),
    /// An existing cursor advanced.
    Update(Cursor),
}

impl CursorChange {
    /// The cursor payload, regardless of change type.
    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        match self {
            Self::Insert(c) | Self::Update(c) => c,
        }
    }

    /// Consume the change and return the payload.
    #[must_use]
    pub fn into_cursor(self) -> Cursor {
        match self {
            Self::Insert(c) | Self::Update(c) => c,
        }
    }
}

/// De-duplicating merge of polled snapshots and pushed changes.
#[derive(Debug, Default, Clone)]
pub struct MergeEngine {
    /// Event-derived entries, newest insert first. One entry per id.
    overlay: Vec<Cursor>,
    /// The most recent full poll.
    polled: Vec<Cursor>,
}

impl MergeEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one pushed change. Idempotent: re-applying the same change
    /// leaves the merged view unchanged.
    pub fn apply(&mut self, change: CursorChange) {
        let cursor = change.into_cursor();
        if let Some(existing) = self.overlay.iter_mut().find(|c| c.id == cursor.id) {
            *existing = cursor;
        } else {
            self.overlay.insert(0, cursor);
        }
    }

    /// Replace the polled snapshot. Does not touch the overlay: a re-poll
    /// never reverts an id that has an event-derived entry.
    pub fn set_snapshot(&mut self, cursors: Vec<Cursor>) {
        self.polled = cursors;
    }

    /// The merged view: overlay entries, then polled entries the overlay
    /// does not cover. Exactly one entry per cursor id.
    #[must_use]
    pub fn merged(&self) -> Vec<Cursor> {
        let covered: HashSet<&str> = self.overlay.iter().map(|c| c.id.as_str()).collect();
        self.overlay
            .iter()
            .cloned()
            .chain(
                self.polled
                    .iter()
                    .filter(|c| !covered.contains(c.id.as_str()))
                    .cloned(),
            )
            .collect()
    }

    /// Number of event-derived overlay entries.
    #[must_use]
    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }

    /// Whether neither poll nor push has delivered anything yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overlay.is_empty() && self.polled.is_empty()
    }

    /// Drop all state (used after a purge, which clears cursor state
    /// atomically from the dashboard's point of view).
    pub fn clear(&mut self) {
        self.overlay.clear();
        self.polled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorRecord;
    use proptest::prelude::*;

    fn cursor(id: &str, total_updates: u64) -> Cursor {
        Cursor::from(CursorRecord {
            id: id.into(),
            total_updates,
            ..CursorRecord::default()
        })
    }

    fn ids(cursors: &[Cursor]) -> Vec<&str> {
        cursors.iter().map(|c| c.id.as_str()).collect()
    }

    // ── Basic merge semantics ──────────────────────────────────────

    #[test]
    fn empty_engine() {
        let engine = MergeEngine::new();
        assert!(engine.is_empty());
        assert!(engine.merged().is_empty());
    }

    #[test]
    fn poll_only_passes_through() {
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 1), cursor("b", 2)]);
        assert_eq!(ids(&engine.merged()), vec!["a", "b"]);
    }

    #[test]
    fn insert_unseen_prepends() {
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 1)]);
        engine.apply(CursorChange::Insert(cursor("b", 1)));
        engine.apply(CursorChange::Insert(cursor("c", 1)));
        // Newest insert first, then older overlay, then polled remainder.
        assert_eq!(ids(&engine.merged()), vec!["c", "b", "a"]);
    }

    #[test]
    fn update_known_replaces_in_place() {
        let mut engine = MergeEngine::new();
        engine.apply(CursorChange::Insert(cursor("a", 1)));
        engine.apply(CursorChange::Insert(cursor("b", 1)));
        engine.apply(CursorChange::Update(cursor("a", 5)));
        let merged = engine.merged();
        assert_eq!(ids(&merged), vec!["b", "a"]);
        assert_eq!(merged[1].total_updates, 5);
    }

    #[test]
    fn update_unseen_applied_as_insert() {
        let mut engine = MergeEngine::new();
        engine.apply(CursorChange::Update(cursor("a", 3)));
        let merged = engine.merged();
        assert_eq!(ids(&merged), vec!["a"]);
        assert_eq!(merged[0].total_updates, 3);
    }

    #[test]
    fn one_entry_per_id() {
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 1), cursor("b", 2)]);
        engine.apply(CursorChange::Update(cursor("a", 9)));
        let merged = engine.merged();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().filter(|c| c.id == "a").count(), 1);
    }

    // ── Idempotence ────────────────────────────────────────────────

    #[test]
    fn reapplying_same_event_is_idempotent() {
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 1)]);
        engine.apply(CursorChange::Update(cursor("a", 7)));
        let once = engine.merged();
        engine.apply(CursorChange::Update(cursor("a", 7)));
        assert_eq!(engine.merged(), once);
    }

    #[test]
    fn reapplying_insert_is_idempotent() {
        let mut engine = MergeEngine::new();
        engine.apply(CursorChange::Insert(cursor("a", 1)));
        let once = engine.merged();
        engine.apply(CursorChange::Insert(cursor("a", 1)));
        assert_eq!(engine.merged(), once);
        assert_eq!(engine.overlay_len(), 1);
    }

    // ── Freshest-wins, poll/push ordering ──────────────────────────

    #[test]
    fn overlay_wins_over_poll_regardless_of_order() {
        // Push then poll.
        let mut engine = MergeEngine::new();
        engine.apply(CursorChange::Update(cursor("a", 9)));
        engine.set_snapshot(vec![cursor("a", 2)]);
        assert_eq!(engine.merged()[0].total_updates, 9);

        // Poll then push.
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 2)]);
        engine.apply(CursorChange::Update(cursor("a", 9)));
        assert_eq!(engine.merged()[0].total_updates, 9);
    }

    #[test]
    fn repoll_does_not_revert_overlay_entry() {
        let mut engine = MergeEngine::new();
        engine.apply(CursorChange::Update(cursor("a", 9)));
        engine.set_snapshot(vec![cursor("a", 2)]);
        engine.set_snapshot(vec![cursor("a", 3)]);
        assert_eq!(engine.merged()[0].total_updates, 9);
    }

    #[test]
    fn repoll_updates_uncovered_ids() {
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 1), cursor("b", 1)]);
        engine.apply(CursorChange::Update(cursor("a", 9)));
        engine.set_snapshot(vec![cursor("a", 2), cursor("b", 8)]);
        let merged = engine.merged();
        let b = merged.iter().find(|c| c.id == "b").unwrap();
        assert_eq!(b.total_updates, 8);
    }

    #[test]
    fn clear_drops_everything() {
        let mut engine = MergeEngine::new();
        engine.set_snapshot(vec![cursor("a", 1)]);
        engine.apply(CursorChange::Insert(cursor("b", 1)));
        engine.clear();
        assert!(engine.is_empty());
        assert!(engine.merged().is_empty());
    }

    // ── Properties ─────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    enum Op {
        Poll(std::collections::BTreeMap<u8, u64>),
        Insert(u8, u64),
        Update(u8, u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            // A real poll never repeats an id, hence the map.
            prop::collection::btree_map(0u8..6, any::<u64>(), 0..6).prop_map(Op::Poll),
            (0u8..6, any::<u64>()).prop_map(|(id, v)| Op::Insert(id, v)),
            (0u8..6, any::<u64>()).prop_map(|(id, v)| Op::Update(id, v)),
        ]
    }

    fn run(ops: &[Op]) -> MergeEngine {
        let mut engine = MergeEngine::new();
        for op in ops {
            match op {
                Op::Poll(entries) => engine.set_snapshot(
                    entries
                        .iter()
                        .map(|(id, v)| cursor(&format!("c{id}"), *v))
                        .collect(),
                ),
                Op::Insert(id, v) => {
                    engine.apply(CursorChange::Insert(cursor(&format!("c{id}"), *v)));
                }
                Op::Update(id, v) => {
                    engine.apply(CursorChange::Update(cursor(&format!("c{id}"), *v)));
                }
            }
        }
        engine
    }

    proptest! {
        #[test]
        fn merged_ids_always_unique(ops in prop::collection::vec(op_strategy(), 0..24)) {
            let engine = run(&ops);
            let merged = engine.merged();
            let unique: HashSet<&str> = merged.iter().map(|c| c.id.as_str()).collect();
            prop_assert_eq!(unique.len(), merged.len());
        }

        #[test]
        fn replaying_last_change_is_noop(
            ops in prop::collection::vec(op_strategy(), 0..24),
            id in 0u8..6,
            v in any::<u64>(),
        ) {
            let mut engine = run(&ops);
            engine.apply(CursorChange::Update(cursor(&format!("c{id}"), v)));
            let once = engine.merged();
            engine.apply(CursorChange::Update(cursor(&format!("c{id}"), v)));
            prop_assert_eq!(engine.merged(), once);
        }
    }
}
