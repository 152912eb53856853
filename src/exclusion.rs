//! Removes user-deleted windows from tracking.
//!
//! The filter is a pure function of (cycle, windows, exclusions): deleting an
//! exclusion record makes its window reappear on the next computation.

use serde::Serialize;
use tracing::debug;

use crate::models::{Cycle, Window, WindowExclusion};

/// Which rule matched an exclusion to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedBy {
    Index,
    Range,
    Label,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedWindow {
    pub window: Window,
    pub exclusion_id: i64,
    pub matched_by: MatchedBy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilteredWindows {
    pub active: Vec<Window>,
    pub deleted: Vec<DeletedWindow>,
}

/// Matches one exclusion against one window in priority order:
/// index, then exact `[start, end)` range, then label.
///
/// An index only identifies a window within one cycle instance and one
/// frequency, so an index match also requires the recorded `window_start`
/// (when known) to fall inside `window`. Otherwise a deleted "Month 3" would
/// hide month 3 of every year, or "Quarter 3" once the benefit turns quarterly.
pub fn match_exclusion(cycle: &Cycle, window: &Window, exclusion: &WindowExclusion) -> Option<MatchedBy> {
    if let Some(index) = exclusion.window_index {
        let same_instance =
            exclusion.window_start.is_none_or(|start| cycle.contains(start) && window.contains(start));
        if index == window.index && same_instance {
            return Some(MatchedBy::Index);
        }
    }
    if let (Some(start), Some(end)) = (exclusion.window_start, exclusion.window_end) {
        if start == window.start && end == window.end {
            return Some(MatchedBy::Range);
        }
    }
    match &exclusion.window_label {
        Some(label) if *label == window.label => Some(MatchedBy::Label),
        _ => None,
    }
}

/// Splits windows into active and deleted sets. Exclusions matching nothing
/// (e.g. stale after a frequency change) are ignored.
pub fn filter_windows(cycle: &Cycle, windows: Vec<Window>, exclusions: &[WindowExclusion]) -> FilteredWindows {
    let mut filtered = FilteredWindows::default();
    for window in windows {
        let hit = exclusions
            .iter()
            .find_map(|exclusion| match_exclusion(cycle, &window, exclusion).map(|by| (exclusion.id, by)));
        match hit {
            Some((exclusion_id, matched_by)) => filtered.deleted.push(DeletedWindow {
                window,
                exclusion_id,
                matched_by,
            }),
            None => filtered.active.push(window),
        }
    }
    if !filtered.deleted.is_empty() {
        debug!(cycle = %cycle.label, deleted = filtered.deleted.len(), "excluded windows");
    }
    filtered
}

/// Builds the exclusion record that deletes `window` from tracking.
pub fn exclusion_for(benefit_id: i64, window: &Window) -> WindowExclusion {
    WindowExclusion {
        id: 0,
        benefit_id,
        window_start: Some(window.start),
        window_end: Some(window.end),
        window_index: Some(window.index),
        window_label: Some(window.label.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::{compute_cycle, previous_cycle};
    use crate::models::{Frequency, YearTrackingMode};
    use crate::window::compute_frequency_windows;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn current_cycle() -> Cycle {
        compute_cycle(d(2024, 8, 15), YearTrackingMode::Calendar, d(2024, 5, 20))
    }

    fn bare_exclusion(id: i64) -> WindowExclusion {
        WindowExclusion {
            id,
            benefit_id: 1,
            window_start: None,
            window_end: None,
            window_index: None,
            window_label: None,
        }
    }

    #[test]
    fn test_exclude_by_index_then_restore() {
        let cycle = current_cycle();
        let windows = compute_frequency_windows(&cycle, Frequency::Monthly);
        let exclusion = exclusion_for(1, &windows[2]);

        let filtered = filter_windows(&cycle, windows.clone(), &[exclusion]);
        assert_eq!(filtered.active.len(), 11);
        assert!(filtered.active.iter().all(|w| w.index != 3));
        assert_eq!(filtered.deleted.len(), 1);
        assert_eq!(filtered.deleted[0].window.index, 3);
        assert_eq!(filtered.deleted[0].matched_by, MatchedBy::Index);

        // Exclusion record deleted: same output as plain generation.
        let restored = filter_windows(&cycle, compute_frequency_windows(&cycle, Frequency::Monthly), &[]);
        assert_eq!(restored.active, windows);
        assert!(restored.deleted.is_empty());
    }

    #[test]
    fn test_index_scoped_to_cycle_instance() {
        let cycle = current_cycle();
        let last_year = previous_cycle(&cycle, d(2024, 8, 15));
        let windows = compute_frequency_windows(&cycle, Frequency::Monthly);
        let exclusion = exclusion_for(1, &windows[2]);

        let old_windows = compute_frequency_windows(&last_year, Frequency::Monthly);
        let filtered = filter_windows(&last_year, old_windows, &[exclusion]);
        assert_eq!(filtered.active.len(), 12);
    }

    #[test]
    fn test_exclude_by_range() {
        let cycle = current_cycle();
        let windows = compute_frequency_windows(&cycle, Frequency::Quarterly);
        let mut exclusion = bare_exclusion(7);
        exclusion.window_start = Some(d(2024, 4, 1));
        exclusion.window_end = Some(d(2024, 7, 1));

        let filtered = filter_windows(&cycle, windows, &[exclusion]);
        assert_eq!(filtered.deleted.len(), 1);
        assert_eq!(filtered.deleted[0].window.index, 2);
        assert_eq!(filtered.deleted[0].matched_by, MatchedBy::Range);
        assert_eq!(filtered.deleted[0].exclusion_id, 7);
    }

    #[test]
    fn test_exclude_by_label_fallback() {
        let cycle = current_cycle();
        let windows = compute_frequency_windows(&cycle, Frequency::Semiannual);
        let mut exclusion = bare_exclusion(2);
        exclusion.window_label = Some(windows[1].label.clone());

        let filtered = filter_windows(&cycle, windows, &[exclusion]);
        assert_eq!(filtered.active.len(), 1);
        assert_eq!(filtered.deleted[0].matched_by, MatchedBy::Label);
    }

    #[test]
    fn test_stale_exclusion_is_noop() {
        let cycle = current_cycle();
        let monthly = compute_frequency_windows(&cycle, Frequency::Monthly);
        let stale = exclusion_for(1, &monthly[10]);

        // Benefit switched to quarterly: index 11 and the month range no longer exist.
        let quarterly = compute_frequency_windows(&cycle, Frequency::Quarterly);
        let filtered = filter_windows(&cycle, quarterly.clone(), &[stale]);
        assert_eq!(filtered.active, quarterly);
        assert!(filtered.deleted.is_empty());
    }

    #[test]
    fn test_low_index_does_not_carry_over_to_new_frequency() {
        let cycle = current_cycle();
        let monthly = compute_frequency_windows(&cycle, Frequency::Monthly);
        let february = exclusion_for(1, &monthly[1]);

        // Quarter 2 shares index 2 with February but not its dates.
        let quarterly = compute_frequency_windows(&cycle, Frequency::Quarterly);
        assert_eq!(match_exclusion(&cycle, &quarterly[1], &february), None);
        let filtered = filter_windows(&cycle, quarterly.clone(), &[february]);
        assert_eq!(filtered.active, quarterly);
    }

    #[test]
    fn test_index_takes_priority_over_range() {
        let cycle = current_cycle();
        let windows = compute_frequency_windows(&cycle, Frequency::Quarterly);
        let mut exclusion = exclusion_for(1, &windows[0]);
        // Range points at another window; index still wins.
        exclusion.window_end = Some(d(2024, 2, 1));

        assert_eq!(match_exclusion(&cycle, &windows[0], &exclusion), Some(MatchedBy::Index));
        assert_eq!(match_exclusion(&cycle, &windows[1], &exclusion), None);
    }
}
