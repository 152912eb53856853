//! Buckets redemption records into the windows that contain them.

use serde::Serialize;
use tracing::debug;

use crate::models::{Redemption, Window};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowTotal {
    pub window: Window,
    pub total: f64,
    pub count: usize,
    pub redemption_ids: Vec<i64>,
}

/// Sums redemptions per window using `start <= occurred_on < end`.
///
/// Redemptions outside every window (before tracking began, after the cycle,
/// or with an unreadable date) are left out of all totals. They are never
/// clamped into the nearest window.
pub fn aggregate_redemptions(windows: &[Window], redemptions: &[Redemption]) -> Vec<WindowTotal> {
    let mut totals: Vec<WindowTotal> = windows
        .iter()
        .map(|window| WindowTotal {
            window: window.clone(),
            total: 0.0,
            count: 0,
            redemption_ids: Vec::new(),
        })
        .collect();

    let mut unassigned = 0usize;
    for redemption in redemptions {
        let slot = match redemption.occurred_on {
            Some(date) => totals.iter_mut().find(|t| t.window.contains(date)),
            None => None,
        };
        match slot {
            Some(slot) => {
                slot.total += redemption.amount;
                slot.count += 1;
                slot.redemption_ids.push(redemption.id);
            }
            None => unassigned += 1,
        }
    }
    if unassigned > 0 {
        debug!(unassigned, "redemptions outside every tracked window");
    }
    totals
}

/// Cycle-wide total over the given (active) windows.
pub fn cycle_total(totals: &[WindowTotal]) -> f64 {
    totals.iter().map(|t| t.total).sum()
}

/// Total over every record regardless of windows.
pub fn lifetime_total(redemptions: &[Redemption]) -> f64 {
    redemptions.iter().map(|r| r.amount).sum()
}
