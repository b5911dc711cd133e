// Draft order entries and validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One participant's seat in the draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSlot {
    pub name: String,
    /// 1-based pick position within the first round.
    pub position: u32,
}

impl DraftSlot {
    pub fn new(name: impl Into<String>, position: u32) -> Self {
        DraftSlot {
            name: name.into(),
            position,
        }
    }
}

/// Check that `order` is usable as a draft order and return it sorted by
/// position.
///
/// Positions must form the contiguous permutation `1..=N`. Names must be
/// non-blank and distinct, since assignments are keyed by participant name.
pub fn validate_order(order: &[DraftSlot]) -> Result<Vec<DraftSlot>> {
    if order.is_empty() {
        return Err(Error::InvalidOrder("draft order is empty".into()));
    }

    let mut sorted = order.to_vec();
    sorted.sort_by_key(|slot| slot.position);

    for (expected, slot) in (1u32..).zip(&sorted) {
        if slot.position != expected {
            return Err(Error::InvalidOrder(format!(
                "positions must be a contiguous 1..={} permutation, \
                 found position {} where {} was expected",
                order.len(),
                slot.position,
                expected
            )));
        }
    }

    {
        let mut seen = HashSet::new();
        for slot in &sorted {
            let name = slot.name.trim();
            if name.is_empty() {
                return Err(Error::InvalidOrder(format!(
                    "position {} has a blank participant name",
                    slot.position
                )));
            }
            if !seen.insert(name) {
                return Err(Error::InvalidOrder(format!(
                    "participant '{name}' appears more than once"
                )));
            }
        }
    }

    for slot in &mut sorted {
        slot.name = slot.name.trim().to_string();
    }
    Ok(sorted)
}
