//! Order key allocation.
//!
//! Keys are sparse integers. A moved entry takes the midpoint between its new
//! neighbours, or a neighbour's key offset by the spacing at either end. When
//! no free key exists the whole arrangement is renumbered.

use std::collections::{BTreeSet, HashMap};

use super::types::{FavoriteEntry, OrderUpdate};

/// Pick a key strictly between `prev` and `next`, avoiding `reserved`.
///
/// `None` means the gap is exhausted and the caller has to renumber.
pub fn allocate_between(
    prev: Option<i64>,
    next: Option<i64>,
    spacing: i64,
    reserved: &BTreeSet<i64>,
) -> Option<i64> {
    let candidate = match (prev, next) {
        (Some(p), Some(n)) => {
            if n.checked_sub(p)? < 2 {
                return None;
            }
            p + (n - p) / 2
        }
        (Some(p), None) => p.checked_add(spacing)?,
        (None, Some(n)) => n.checked_sub(spacing)?,
        (None, None) => spacing,
    };

    if reserved.contains(&candidate) {
        // Look for any other free key inside the open interval
        let lo = prev.map_or(candidate.saturating_sub(spacing), |p| p + 1);
        let hi = next.map_or(candidate.saturating_add(spacing), |n| n - 1);
        return (lo..=hi).find(|k| !reserved.contains(k));
    }

    Some(candidate)
}

/// Reassign evenly spaced keys to `entries` in place, skipping reserved keys.
///
/// The spacing shrinks when the whole set would not fit below `i64::MAX`.
pub fn renumber(entries: &mut [FavoriteEntry], spacing: i64, reserved: &BTreeSet<i64>) {
    let slots = i64::try_from(entries.len() + reserved.len())
        .unwrap_or(i64::MAX - 1)
        .saturating_add(1);
    let spacing = spacing.clamp(1, (i64::MAX / slots).max(1));

    let mut next = spacing;
    for entry in entries.iter_mut() {
        while reserved.contains(&next) {
            next = next.saturating_add(1);
        }
        entry.order = next;
        next = next.saturating_add(spacing);
    }
}

/// Order updates for every entry of `after` whose key differs from `before`
pub fn changed_orders(before: &[FavoriteEntry], after: &[FavoriteEntry]) -> Vec<OrderUpdate> {
    let previous: HashMap<&str, i64> = before.iter().map(|e| (e.id.as_str(), e.order)).collect();
    after
        .iter()
        .filter(|e| previous.get(e.id.as_str()) != Some(&e.order))
        .map(|e| OrderUpdate {
            id: e.id.clone(),
            order: e.order,
        })
        .collect()
}

/// Move `from` to `to` within `entries` and fix up order keys.
///
/// Returns the rearranged copy together with the order updates to persist,
/// which list exactly the entries whose key changed.
pub fn plan_move(
    entries: &[FavoriteEntry],
    from: usize,
    to: usize,
    spacing: i64,
    reserved: &BTreeSet<i64>,
) -> (Vec<FavoriteEntry>, Vec<OrderUpdate>) {
    let mut arranged = entries.to_vec();
    let moved = arranged.remove(from);
    arranged.insert(to, moved);

    let prev = to.checked_sub(1).map(|i| arranged[i].order);
    let next = arranged.get(to + 1).map(|e| e.order);

    match allocate_between(prev, next, spacing, reserved) {
        Some(order) => arranged[to].order = order,
        None => {
            tracing::debug!(from, to, "order keys exhausted, renumbering favorites");
            renumber(&mut arranged, spacing, reserved);
        }
    }

    let updates = changed_orders(entries, &arranged);
    (arranged, updates)
}

/// True when keys are strictly increasing
pub fn is_strictly_increasing(entries: &[FavoriteEntry]) -> bool {
    entries.windows(2).all(|w| w[0].order < w[1].order)
}
