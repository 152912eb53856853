//! Multi-year report for a card: every historical cycle, every benefit.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{aggregate_redemptions, cycle_total};
use crate::classify::{BenefitState, WindowState, classify_cycle, classify_windows};
use crate::cycle::{build_card_cycles, compute_cycle, next_cycle};
use crate::exclusion::{DeletedWindow, FilteredWindows, filter_windows};
use crate::models::{Benefit, Card, Cycle, Frequency, Redemption, Window};
use crate::window::compute_frequency_windows;

/// Immutable input for one computation pass.
#[derive(Debug, Clone)]
pub struct CardSnapshot {
    pub card: Card,
    /// Each benefit carries its own window exclusions.
    pub benefits: Vec<Benefit>,
    /// Redemptions keyed by benefit id.
    pub redemptions: HashMap<i64, Vec<Redemption>>,
}

impl CardSnapshot {
    pub fn redemptions_for(&self, benefit_id: i64) -> &[Redemption] {
        self.redemptions.get(&benefit_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryOptions {
    /// Tracking start: cycles never reach back before the one containing it.
    pub floor: Option<NaiveDate>,
    pub newest_first: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenefitCycleReport {
    pub benefit_id: i64,
    pub name: String,
    pub benefit_type: &'static str,
    pub frequency: Frequency,
    pub windows: Vec<WindowState>,
    pub deleted_windows: Vec<DeletedWindow>,
    pub redemption_total: f64,
    pub state: BenefitState,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: Cycle,
    pub benefits: Vec<BenefitCycleReport>,
    pub potential_value: f64,
    pub utilized_value: f64,
    pub annual_fee: f64,
    /// `utilized_value - annual_fee`
    pub net_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardHistory {
    pub card_id: i64,
    pub cycles: Vec<CycleReport>,
    /// Redemptions that landed in no active window of any reported cycle.
    pub untracked_redemption_ids: Vec<i64>,
}

/// Earliest of card creation, any redemption, and any standard `used_at`.
pub fn earliest_activity(snapshot: &CardSnapshot) -> Option<NaiveDate> {
    let redemption_dates = snapshot
        .redemptions
        .values()
        .flatten()
        .filter_map(|r| r.occurred_on);
    let used_dates = snapshot.benefits.iter().filter_map(|b| b.kind.used_at());
    snapshot
        .card
        .created_at
        .into_iter()
        .chain(redemption_dates)
        .chain(used_dates)
        .min()
}

/// Windows a benefit contributes to `card_cycle`, already filtered for exclusions.
///
/// When the benefit keeps the card's mode these are simply the card cycle's
/// windows. With an override, the benefit's own cycles are walked and each
/// window is assigned to the card cycle containing its start; the oldest card
/// cycle also takes a window straddling its start so early activity is not lost.
pub fn benefit_windows_in_cycle(
    card: &Card,
    benefit: &Benefit,
    card_cycle: &Cycle,
    is_oldest: bool,
) -> FilteredWindows {
    let mode = benefit.effective_mode(card);
    if mode == card_cycle.mode {
        let windows = compute_frequency_windows(card_cycle, benefit.frequency);
        return filter_windows(card_cycle, windows, &benefit.exclusions);
    }

    let belongs = |w: &Window| {
        card_cycle.contains(w.start)
            || (is_oldest && w.start < card_cycle.start && w.end > card_cycle.start)
    };
    let mut result = FilteredWindows::default();
    let mut own_cycle = compute_cycle(card.fee_due_date, mode, card_cycle.start);
    while own_cycle.start < card_cycle.end {
        let windows = compute_frequency_windows(&own_cycle, benefit.frequency);
        let filtered = filter_windows(&own_cycle, windows, &benefit.exclusions);
        result.active.extend(filtered.active.into_iter().filter(|w| belongs(w)));
        result.deleted.extend(filtered.deleted.into_iter().filter(|d| belongs(&d.window)));
        own_cycle = next_cycle(&own_cycle, card.fee_due_date);
    }
    result
}

fn benefit_report(
    snapshot: &CardSnapshot,
    benefit: &Benefit,
    card_cycle: &Cycle,
    is_oldest: bool,
    today: NaiveDate,
) -> BenefitCycleReport {
    let filtered = benefit_windows_in_cycle(&snapshot.card, benefit, card_cycle, is_oldest);
    let totals = aggregate_redemptions(&filtered.active, snapshot.redemptions_for(benefit.id));
    let windows = classify_windows(benefit, &totals, today);
    let state = classify_cycle(benefit, &windows);
    BenefitCycleReport {
        benefit_id: benefit.id,
        name: benefit.name.clone(),
        benefit_type: benefit.kind.type_name(),
        frequency: benefit.frequency,
        windows,
        deleted_windows: filtered.deleted,
        redemption_total: cycle_total(&totals),
        state,
    }
}

/// Card cycles from the earliest activity (clamped to the floor) up to the
/// one containing `today`, oldest first.
pub fn history_cycles(snapshot: &CardSnapshot, today: NaiveDate, floor: Option<NaiveDate>) -> Vec<Cycle> {
    let mut earliest = earliest_activity(snapshot).unwrap_or(today);
    if let Some(floor) = floor {
        earliest = earliest.max(floor);
    }
    if snapshot.card.created_at.is_none() {
        warn!(card_id = snapshot.card.id, "card has no readable creation date");
    }
    build_card_cycles(&snapshot.card, earliest, today)
}

/// Rebuilds every cycle from the card's earliest activity up to the one
/// containing `today`.
pub fn build_card_history(snapshot: &CardSnapshot, today: NaiveDate, options: HistoryOptions) -> CardHistory {
    let cycles = history_cycles(snapshot, today, options.floor);
    let mut tracked: HashSet<i64> = HashSet::new();
    let mut reports = Vec::with_capacity(cycles.len());
    for (position, cycle) in cycles.into_iter().enumerate() {
        let benefits: Vec<BenefitCycleReport> = snapshot
            .benefits
            .iter()
            .map(|benefit| benefit_report(snapshot, benefit, &cycle, position == 0, today))
            .collect();
        for report in &benefits {
            for redemption in snapshot.redemptions_for(report.benefit_id) {
                let Some(date) = redemption.occurred_on else {
                    continue;
                };
                if report.windows.iter().any(|w| w.window.contains(date)) {
                    tracked.insert(redemption.id);
                }
            }
        }

        let potential_value: f64 = benefits.iter().map(|b| b.state.target).sum();
        let utilized_value: f64 = benefits.iter().map(|b| b.state.utilized_value()).sum();
        reports.push(CycleReport {
            cycle,
            benefits,
            potential_value,
            utilized_value,
            annual_fee: snapshot.card.annual_fee,
            net_value: utilized_value - snapshot.card.annual_fee,
        });
    }

    let mut untracked_redemption_ids: Vec<i64> = snapshot
        .redemptions
        .values()
        .flatten()
        .map(|r| r.id)
        .filter(|id| !tracked.contains(id))
        .collect();
    untracked_redemption_ids.sort_unstable();
    if !untracked_redemption_ids.is_empty() {
        debug!(
            card_id = snapshot.card.id,
            count = untracked_redemption_ids.len(),
            "redemptions outside tracked history"
        );
    }

    if options.newest_first {
        reports.reverse();
    }
    CardHistory {
        card_id: snapshot.card.id,
        cycles: reports,
        untracked_redemption_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BenefitStatus;
    use crate::models::{BenefitKind, WindowExclusion, YearTrackingMode};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn card(mode: YearTrackingMode, created_at: NaiveDate) -> Card {
        Card {
            id: 7,
            name: "Travel Card".into(),
            annual_fee: 95.0,
            fee_due_date: d(2024, 8, 15),
            year_tracking_mode: mode,
            created_at: Some(created_at),
        }
    }

    fn benefit(id: i64, frequency: Frequency, kind: BenefitKind) -> Benefit {
        Benefit {
            id,
            card_id: 7,
            name: format!("Benefit {id}"),
            frequency,
            kind,
            window_values: None,
            window_tracking_mode: None,
            expiration_date: None,
            exclusions: Vec::new(),
        }
    }

    fn redemption(id: i64, benefit_id: i64, amount: f64, occurred_on: NaiveDate) -> Redemption {
        Redemption {
            id,
            benefit_id,
            amount,
            occurred_on: Some(occurred_on),
            label: "Use".into(),
        }
    }

    fn snapshot(card: Card, benefits: Vec<Benefit>, redemptions: Vec<Redemption>) -> CardSnapshot {
        let mut by_benefit: HashMap<i64, Vec<Redemption>> = HashMap::new();
        for r in redemptions {
            by_benefit.entry(r.benefit_id).or_default().push(r);
        }
        CardSnapshot {
            card,
            benefits,
            redemptions: by_benefit,
        }
    }

    #[test]
    fn test_earliest_activity_includes_redemptions_and_used_at() {
        let snap = snapshot(
            card(YearTrackingMode::Calendar, d(2023, 6, 1)),
            vec![benefit(
                1,
                Frequency::Yearly,
                BenefitKind::Standard { value: 100.0, used_at: Some(d(2023, 2, 1)) },
            )],
            vec![redemption(1, 1, 10.0, d(2023, 3, 1))],
        );
        assert_eq!(earliest_activity(&snap), Some(d(2023, 2, 1)));
    }

    #[test]
    fn test_history_spans_every_cycle_and_nets_fee() {
        let snap = snapshot(
            card(YearTrackingMode::Calendar, d(2022, 6, 1)),
            vec![
                benefit(1, Frequency::Monthly, BenefitKind::Incremental { value: 10.0 }),
                benefit(
                    2,
                    Frequency::Yearly,
                    BenefitKind::Standard { value: 100.0, used_at: Some(d(2023, 4, 1)) },
                ),
            ],
            vec![
                redemption(1, 1, 10.0, d(2023, 1, 5)),
                redemption(2, 1, 25.0, d(2023, 2, 5)),
            ],
        );
        let history = build_card_history(&snap, d(2024, 5, 20), HistoryOptions::default());
        let labels: Vec<&str> = history.cycles.iter().map(|c| c.cycle.label.as_str()).collect();
        assert_eq!(labels, vec!["2022", "2023", "2024"]);

        let y2023 = &history.cycles[1];
        assert_eq!(y2023.potential_value, 220.0);
        // 10 + 10 (capped) on the monthly credit, 100 on the standard one.
        assert_eq!(y2023.utilized_value, 120.0);
        assert_eq!(y2023.net_value, 25.0);
        assert_eq!(y2023.benefits[1].state.status, BenefitStatus::Utilized);
        assert_eq!(y2023.benefits[0].redemption_total, 35.0);

        let y2024 = &history.cycles[2];
        assert_eq!(y2024.utilized_value, 0.0);
        assert_eq!(y2024.net_value, -95.0);
        assert!(history.untracked_redemption_ids.is_empty());
    }

    #[test]
    fn test_redemption_before_tracking_start_is_excluded() {
        let snap = snapshot(
            card(YearTrackingMode::Calendar, d(2023, 3, 1)),
            vec![benefit(1, Frequency::Quarterly, BenefitKind::Incremental { value: 50.0 })],
            vec![
                redemption(1, 1, 40.0, d(2021, 11, 20)),
                redemption(2, 1, 30.0, d(2023, 5, 1)),
            ],
        );
        let options = HistoryOptions {
            floor: Some(d(2023, 3, 1)),
            ..HistoryOptions::default()
        };
        let history = build_card_history(&snap, d(2024, 5, 20), options);

        assert_eq!(history.cycles[0].cycle.label, "2023");
        let total: f64 = history
            .cycles
            .iter()
            .flat_map(|c| c.benefits.iter())
            .map(|b| b.redemption_total)
            .sum();
        assert_eq!(total, 30.0);
        assert_eq!(history.untracked_redemption_ids, vec![1]);
        assert_eq!(snap.redemptions_for(1).len(), 2);
    }

    #[test]
    fn test_future_redemption_is_untracked() {
        let snap = snapshot(
            card(YearTrackingMode::Calendar, d(2024, 1, 10)),
            vec![benefit(1, Frequency::Monthly, BenefitKind::Incremental { value: 15.0 })],
            vec![redemption(9, 1, 15.0, d(2026, 1, 3))],
        );
        let history = build_card_history(&snap, d(2024, 5, 20), HistoryOptions::default());
        assert_eq!(history.cycles.len(), 1);
        assert_eq!(history.untracked_redemption_ids, vec![9]);
    }

    #[test]
    fn test_excluded_window_drops_out_of_totals() {
        let mut monthly = benefit(1, Frequency::Monthly, BenefitKind::Incremental { value: 10.0 });
        monthly.exclusions.push(WindowExclusion {
            id: 3,
            benefit_id: 1,
            window_start: Some(d(2024, 2, 1)),
            window_end: Some(d(2024, 3, 1)),
            window_index: Some(2),
            window_label: None,
        });
        let snap = snapshot(
            card(YearTrackingMode::Calendar, d(2024, 1, 1)),
            vec![monthly],
            vec![redemption(1, 1, 10.0, d(2024, 2, 10))],
        );
        let history = build_card_history(&snap, d(2024, 5, 20), HistoryOptions::default());
        let report = &history.cycles[0].benefits[0];
        assert_eq!(report.windows.len(), 11);
        assert_eq!(report.deleted_windows.len(), 1);
        assert_eq!(report.redemption_total, 0.0);
        assert_eq!(history.cycles[0].potential_value, 110.0);
        assert_eq!(history.untracked_redemption_ids, vec![1]);
    }

    #[test]
    fn test_override_mode_windows_assigned_by_start() {
        let mut quarterly = benefit(1, Frequency::Quarterly, BenefitKind::Incremental { value: 30.0 });
        quarterly.window_tracking_mode = Some(YearTrackingMode::Calendar);
        let snap = snapshot(
            card(YearTrackingMode::Anniversary, d(2023, 9, 1)),
            vec![quarterly],
            vec![redemption(1, 1, 12.0, d(2023, 8, 10))],
        );
        let history = build_card_history(&snap, d(2024, 9, 1), HistoryOptions::default());
        let labels: Vec<&str> = history.cycles.iter().map(|c| c.cycle.label.as_str()).collect();
        assert_eq!(labels, vec!["2022-2023", "2023-2024", "2024-2025"]);

        // Oldest anniversary cycle: Q3 2022 straddles its start, then Q4 2022..Q2 2023, Q3 2023.
        let oldest = &history.cycles[0].benefits[0];
        assert_eq!(oldest.windows.first().unwrap().window.start, d(2022, 7, 1));
        assert_eq!(oldest.windows.len(), 5);
        assert_eq!(oldest.redemption_total, 12.0);

        // Every calendar quarter lands in exactly one anniversary cycle.
        let starts: Vec<NaiveDate> = history
            .cycles
            .iter()
            .flat_map(|c| c.benefits[0].windows.iter().map(|w| w.window.start))
            .collect();
        let unique: HashSet<NaiveDate> = starts.iter().copied().collect();
        assert_eq!(starts.len(), unique.len());
    }

    #[test]
    fn test_override_standard_status_follows_assigned_windows() {
        let mut credit = benefit(
            1,
            Frequency::Yearly,
            BenefitKind::Standard { value: 100.0, used_at: Some(d(2023, 9, 1)) },
        );
        credit.window_tracking_mode = Some(YearTrackingMode::Calendar);
        let snap = snapshot(card(YearTrackingMode::Anniversary, d(2022, 9, 1)), vec![credit], Vec::new());
        let history = build_card_history(&snap, d(2024, 9, 1), HistoryOptions::default());
        let labels: Vec<&str> = history.cycles.iter().map(|c| c.cycle.label.as_str()).collect();
        assert_eq!(labels, vec!["2022-2023", "2023-2024", "2024-2025"]);

        // Calendar 2023 starts inside 2022-2023, so the usage lands there.
        let first = &history.cycles[0].benefits[0];
        assert_eq!(first.state.status, BenefitStatus::Utilized);
        assert_eq!(first.state.used, 100.0);
        let second = &history.cycles[1].benefits[0];
        assert_eq!(second.state.status, BenefitStatus::Available);
        assert_eq!(second.state.used, 0.0);

        for report in &history.cycles {
            let state = &report.benefits[0].state;
            assert_eq!(state.status == BenefitStatus::Utilized, state.used > 0.0);
        }
    }

    #[test]
    fn test_missing_creation_date_falls_back_to_activity() {
        let mut no_created = card(YearTrackingMode::Calendar, d(2020, 1, 1));
        no_created.created_at = None;
        let snap = snapshot(
            no_created.clone(),
            vec![benefit(1, Frequency::Quarterly, BenefitKind::Incremental { value: 25.0 })],
            vec![redemption(1, 1, 20.0, d(2023, 3, 1))],
        );
        assert_eq!(earliest_activity(&snap), Some(d(2023, 3, 1)));
        let history = build_card_history(&snap, d(2024, 5, 20), HistoryOptions::default());
        let labels: Vec<&str> = history.cycles.iter().map(|c| c.cycle.label.as_str()).collect();
        assert_eq!(labels, vec!["2023", "2024"]);
        assert_eq!(history.cycles[0].benefits[0].redemption_total, 20.0);

        // Nothing at all to anchor on: only the current cycle.
        let empty = snapshot(no_created, Vec::new(), Vec::new());
        assert_eq!(earliest_activity(&empty), None);
        let history = build_card_history(&empty, d(2024, 5, 20), HistoryOptions::default());
        assert_eq!(history.cycles.len(), 1);
        assert_eq!(history.cycles[0].cycle.label, "2024");
    }

    #[test]
    fn test_newest_first_ordering() {
        let snap = snapshot(card(YearTrackingMode::Calendar, d(2022, 6, 1)), Vec::new(), Vec::new());
        let options = HistoryOptions {
            newest_first: true,
            ..HistoryOptions::default()
        };
        let history = build_card_history(&snap, d(2024, 5, 20), options);
        assert_eq!(history.cycles.first().unwrap().cycle.label, "2024");
        assert_eq!(history.cycles.last().unwrap().cycle.label, "2022");
    }
}
