//! Current-cycle view of a card and its benefits.

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{aggregate_redemptions, cycle_total, lifetime_total};
use crate::classify::{BenefitState, WindowState, classify_cycle, classify_windows};
use crate::cycle::{compute_benefit_cycle, compute_card_cycle};
use crate::exclusion::{DeletedWindow, filter_windows};
use crate::history::CardSnapshot;
use crate::models::{Benefit, Card, Cycle, Frequency, Redemption};
use crate::window::compute_frequency_windows;

#[derive(Debug, Clone, Serialize)]
pub struct BenefitSummary {
    pub benefit_id: i64,
    pub name: String,
    pub benefit_type: &'static str,
    pub frequency: Frequency,
    /// The benefit's own cycle, which differs from the card's under a mode override.
    pub cycle: Cycle,
    pub cycle_window_count: usize,
    pub windows: Vec<WindowState>,
    pub deleted_windows: Vec<DeletedWindow>,
    /// `None` when today's window has been excluded.
    pub current_window: Option<WindowState>,
    pub cycle_redemption_total: f64,
    pub redemption_total: f64,
    pub redemption_count: usize,
    pub cycle_target_value: f64,
    pub remaining_value: Option<f64>,
    /// Unused value lost from windows of this cycle that already closed.
    pub missed_value: f64,
    pub cycle_state: BenefitState,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardSummary {
    pub card_id: i64,
    pub name: String,
    pub cycle: Cycle,
    pub benefits: Vec<BenefitSummary>,
    pub potential_value: f64,
    pub utilized_value: f64,
    pub annual_fee: f64,
    pub net_position: f64,
}

pub fn summarize_benefit(
    card: &Card,
    benefit: &Benefit,
    redemptions: &[Redemption],
    today: NaiveDate,
) -> BenefitSummary {
    let cycle = compute_benefit_cycle(card, benefit, today);
    let windows = compute_frequency_windows(&cycle, benefit.frequency);
    let filtered = filter_windows(&cycle, windows, &benefit.exclusions);
    let totals = aggregate_redemptions(&filtered.active, redemptions);
    let states = classify_windows(benefit, &totals, today);
    let cycle_state = classify_cycle(benefit, &states);
    let current_window = states.iter().find(|s| s.window.contains(today)).cloned();

    BenefitSummary {
        benefit_id: benefit.id,
        name: benefit.name.clone(),
        benefit_type: benefit.kind.type_name(),
        frequency: benefit.frequency,
        cycle_window_count: states.len(),
        remaining_value: current_window.as_ref().map(|w| w.state.remaining),
        missed_value: states.iter().map(|s| s.state.expired).sum(),
        cycle_redemption_total: cycle_total(&totals),
        redemption_total: lifetime_total(redemptions),
        redemption_count: redemptions.len(),
        cycle_target_value: cycle_state.target,
        expires_in_days: benefit.expiration_date.map(|date| (date - today).num_days()),
        cycle,
        windows: states,
        deleted_windows: filtered.deleted,
        current_window,
        cycle_state,
    }
}

pub fn summarize_card(snapshot: &CardSnapshot, today: NaiveDate) -> CardSummary {
    let card = &snapshot.card;
    let benefits: Vec<BenefitSummary> = snapshot
        .benefits
        .iter()
        .map(|b| summarize_benefit(card, b, snapshot.redemptions_for(b.id), today))
        .collect();
    let potential_value: f64 = benefits.iter().map(|b| b.cycle_target_value).sum();
    let utilized_value: f64 = benefits.iter().map(|b| b.cycle_state.utilized_value()).sum();
    CardSummary {
        card_id: card.id,
        name: card.name.clone(),
        cycle: compute_card_cycle(card, today),
        benefits,
        potential_value,
        utilized_value,
        annual_fee: card.annual_fee,
        net_position: utilized_value - card.annual_fee,
    }
}
