//! Snapshot reconciliation.
//!
//! [`reconcile`] takes ownership of the previous [`Snapshot`] and a freshly
//! fetched map and returns the next snapshot together with the events that
//! explain the difference.  Applying the returned events to the previous
//! snapshot always yields exactly the fresh map without the self id.

use std::collections::BTreeMap;

use crate::types::{ChangeEvent, Record, Snapshot};

/// Classify every key of `fresh` against `previous`.
///
/// Added and Changed events come first, in fresh-map order, followed by
/// Removed events in previous-snapshot order.  `self_id` is dropped from
/// the fresh map before anything else happens.
pub fn reconcile(
    previous: Snapshot,
    fresh: BTreeMap<String, Record>,
    self_id: &str,
) -> (Snapshot, Vec<ChangeEvent>) {
    let mut remaining = previous.into_entries();
    let mut next = BTreeMap::new();
    let mut events = Vec::new();

    for (id, record) in fresh {
        if id == self_id {
            continue;
        }
        match remaining.remove(&id) {
            None => events.push(ChangeEvent::Added {
                id: id.clone(),
                record: record.clone(),
            }),
            Some(cached) if cached != record => events.push(ChangeEvent::Changed {
                id: id.clone(),
                record: record.clone(),
            }),
            Some(_) => {}
        }
        next.insert(id, record);
    }

    // Whatever was not consumed above has disappeared remotely.
    events.extend(
        remaining
            .into_keys()
            .filter(|id| id != self_id)
            .map(|id| ChangeEvent::Removed { id }),
    );

    (Snapshot::from_entries(next), events)
}
