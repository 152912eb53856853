//! Partitions a cycle into benefit redemption windows.

use tracing::debug;

use crate::date_math;
use crate::models::{Cycle, Frequency, Window};

/// Splits `cycle` into contiguous windows at `frequency` granularity.
///
/// Window boundaries are projected from the cycle start (`start + k * months`)
/// rather than chained from the previous window end, so a cycle starting on
/// the 31st keeps month-end boundaries instead of drifting to the 28th.
/// The last window always ends at `cycle.end` and may be shorter than a full
/// period when the cycle length is not a whole number of periods.
pub fn compute_frequency_windows(cycle: &Cycle, frequency: Frequency) -> Vec<Window> {
    let Some(months) = frequency.months_per_window() else {
        return vec![Window {
            start: cycle.start,
            end: cycle.end,
            label: cycle.label.clone(),
            index: 1,
        }];
    };

    let mut windows = Vec::with_capacity(frequency.windows_per_cycle());
    let mut cursor = cycle.start;
    let mut index: u32 = 1;
    while cursor < cycle.end {
        let raw_end = date_math::add_months(cycle.start, (index * months) as i32);
        let end = raw_end.min(cycle.end);
        windows.push(Window {
            start: cursor,
            end,
            label: format!(
                "{} {} · {}",
                frequency.period_noun(),
                index,
                date_math::format_date_range(cursor, end)
            ),
            index,
        });
        cursor = raw_end;
        index += 1;
    }
    debug!(cycle = %cycle.label, %frequency, count = windows.len(), "generated windows");
    windows
}
