//! Multi-target removal
//!
//! Every target is resolved to an index or key before the container is
//! touched. List indices are then applied in descending order, so removing
//! one element never shifts the position of another target.

use std::collections::HashSet;

use super::view::{mismatch, private, Resolver};
use super::PathStep;
use crate::class::can_access;
use crate::error::Result;
use crate::heap::{Container, ReleaseQueue};
use crate::value::{ObjId, Value};

/// Distinct in-range indices, largest first.
pub(crate) fn descending_indices(indices: &[usize], len: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = indices.iter().copied().filter(|&i| i < len).collect();
    indices.sort_unstable_by(|a, b| b.cmp(a));
    indices.dedup();
    indices
}

/// Keys in first-seen order, duplicates dropped.
fn distinct_keys(targets: &[PathStep]) -> Result<Vec<&str>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(targets.len());
    for target in targets {
        let key = target.key()?;
        if seen.insert(key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

impl Resolver<'_> {
    /// Remove elements of the (already unique) list or map `id`. Removed
    /// values are returned in removal order and owned by the caller.
    pub(super) fn remove_elements(&self, id: ObjId, targets: &[PathStep]) -> Result<Vec<Value>> {
        let removed = self.heap.with_container_mut(id, |c| match c {
            Container::List(items) => {
                let indices = targets
                    .iter()
                    .map(PathStep::list_index)
                    .collect::<Result<Vec<_>>>()?;
                Ok(descending_indices(&indices, items.len())
                    .into_iter()
                    .map(|i| items.remove(i))
                    .collect::<Vec<_>>())
            }
            Container::Map(map) => Ok(distinct_keys(targets)?
                .into_iter()
                .map(|key| map.shift_remove(key).unwrap_or(Value::Nothing))
                .collect()),
            other => Err(mismatch("list or map", other)),
        })??;
        let scanned = removed.iter().filter(|v| self.heap.value_needs_scan(v)).count();
        self.heap.adjust_scan(id, -(scanned as isize));
        Ok(removed)
    }

    /// Remove members of object `obj`, checking visibility of every key
    /// before any is removed.
    pub(super) fn remove_members(
        &self,
        obj: ObjId,
        targets: &[PathStep],
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Vec<Value>> {
        let context = self.class_context;
        let keys = distinct_keys(targets)?;
        let removed = self.heap.with_container_mut(obj, |c| {
            let Container::Object(data) = c else {
                return Err(mismatch("object", c));
            };
            if let Some(hidden) = keys.iter().find(|k| !can_access(&*data.class, k, context)) {
                return Err(private(data.class.name(), hidden));
            }
            Ok(keys
                .iter()
                .map(|key| data.members.shift_remove(*key).unwrap_or(Value::Nothing))
                .collect::<Vec<_>>())
        })??;
        let scanned = removed.iter().filter(|v| self.heap.value_needs_scan(v)).count();
        if scanned > 0 {
            self.heap.adjust_scan(obj, -(scanned as isize));
            queue.rescan(obj);
        }
        Ok(removed)
    }
}
