//! Annual-fee year boundaries, current and historical.

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::date_math;
use crate::models::{Benefit, Card, Cycle, YearTrackingMode};

fn calendar_cycle(year: i32) -> Cycle {
    Cycle {
        start: date_math::clamped_date(year, 1, 1),
        end: date_math::clamped_date(year + 1, 1, 1),
        label: year.to_string(),
        mode: YearTrackingMode::Calendar,
    }
}

/// The anniversary year ending on the fee-due month/day of `end_year`.
/// Both edges are re-projected from the original day so a fee due on
/// Feb 29 or the 31st never drifts across years.
fn anniversary_cycle(fee_due_date: NaiveDate, end_year: i32) -> Cycle {
    let (month, day) = (fee_due_date.month(), fee_due_date.day());
    Cycle {
        start: date_math::clamped_date(end_year - 1, month, day),
        end: date_math::clamped_date(end_year, month, day),
        label: format!("{}-{}", end_year - 1, end_year),
        mode: YearTrackingMode::Anniversary,
    }
}

/// The cycle containing `reference`.
pub fn compute_cycle(fee_due_date: NaiveDate, mode: YearTrackingMode, reference: NaiveDate) -> Cycle {
    match mode {
        YearTrackingMode::Calendar => calendar_cycle(reference.year()),
        YearTrackingMode::Anniversary => {
            let (month, day) = (fee_due_date.month(), fee_due_date.day());
            let candidate_end = date_math::clamped_date(reference.year(), month, day);
            if candidate_end <= reference {
                anniversary_cycle(fee_due_date, reference.year() + 1)
            } else {
                anniversary_cycle(fee_due_date, reference.year())
            }
        }
    }
}

pub fn previous_cycle(cycle: &Cycle, fee_due_date: NaiveDate) -> Cycle {
    match cycle.mode {
        YearTrackingMode::Calendar => calendar_cycle(cycle.start.year() - 1),
        YearTrackingMode::Anniversary => anniversary_cycle(fee_due_date, cycle.end.year() - 1),
    }
}

pub fn next_cycle(cycle: &Cycle, fee_due_date: NaiveDate) -> Cycle {
    match cycle.mode {
        YearTrackingMode::Calendar => calendar_cycle(cycle.start.year() + 1),
        YearTrackingMode::Anniversary => anniversary_cycle(fee_due_date, cycle.end.year() + 1),
    }
}

/// Walks back from the cycle containing `reference` until a cycle starts at
/// or before `earliest`. Returned oldest-first.
pub fn build_cycles(
    fee_due_date: NaiveDate,
    mode: YearTrackingMode,
    earliest: NaiveDate,
    reference: NaiveDate,
) -> Vec<Cycle> {
    let mut cycle = compute_cycle(fee_due_date, mode, reference);
    let mut cycles = Vec::new();
    while cycle.start > earliest {
        let previous = previous_cycle(&cycle, fee_due_date);
        cycles.push(cycle);
        cycle = previous;
    }
    cycles.push(cycle);
    cycles.reverse();
    debug!(count = cycles.len(), %mode, "built cycle history");
    cycles
}

pub fn compute_card_cycle(card: &Card, reference: NaiveDate) -> Cycle {
    compute_cycle(card.fee_due_date, card.year_tracking_mode, reference)
}

pub fn build_card_cycles(card: &Card, earliest: NaiveDate, reference: NaiveDate) -> Vec<Cycle> {
    build_cycles(card.fee_due_date, card.year_tracking_mode, earliest, reference)
}

/// Like [`compute_card_cycle`], honouring the benefit's own tracking mode.
pub fn compute_benefit_cycle(card: &Card, benefit: &Benefit, reference: NaiveDate) -> Cycle {
    compute_cycle(card.fee_due_date, benefit.effective_mode(card), reference)
}
