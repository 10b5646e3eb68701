//! Ordering rules for clipboard items
//!
//! Display order: pinned partition first, then by ascending `order`, newer
//! `updatedAt`, newer `createdAt`, and finally `id` so that any multiset of
//! items sorts the same way no matter what order the store returned them in.
//!
//! Order keys are not contiguous and need not be unique. New items and pin /
//! unpin moves step one past the current extreme of the target partition
//! instead of renumbering, because the store has no transactions.

use crate::models::StoredItem;
use serde_json::Value;
use std::cmp::Ordering;

/// Order key from a loosely-typed field. Missing, non-numeric and non-finite
/// values become +inf so they sort last.
pub fn normalize_order(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(f64::INFINITY)
}

fn effective_order(order: f64) -> f64 {
    if order.is_finite() {
        order
    } else {
        f64::INFINITY
    }
}

/// Total order used for every listing
pub fn compare_items(a: &StoredItem, b: &StoredItem) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| effective_order(a.order).total_cmp(&effective_order(b.order)))
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_items(items: &mut [StoredItem]) {
    items.sort_by(compare_items);
}

fn finite_orders<'a, I>(items: I) -> impl Iterator<Item = f64> + 'a
where
    I: Iterator<Item = &'a StoredItem> + 'a,
{
    items.map(|item| item.order).filter(|order| order.is_finite())
}

/// Order for a newly created (unpinned) item: one below the smallest finite
/// order in the unpinned partition, or 0 when there is none.
pub fn insertion_order(items: &[StoredItem]) -> f64 {
    finite_orders(items.iter().filter(|item| !item.pinned))
        .reduce(f64::min)
        .map_or(0.0, |min| min - 1.0)
}

/// Order for an item being pinned: one below the smallest pinned order.
pub fn pinned_order(items: &[StoredItem]) -> f64 {
    finite_orders(items.iter().filter(|item| item.pinned))
        .reduce(f64::min)
        .unwrap_or(0.0)
        - 1.0
}

/// Order for an item being unpinned: one above the largest unpinned order,
/// ignoring the item itself.
pub fn unpinned_order(items: &[StoredItem], id: &str) -> f64 {
    finite_orders(items.iter().filter(|item| !item.pinned && item.id != id))
        .reduce(f64::max)
        .unwrap_or(0.0)
        + 1.0
}
