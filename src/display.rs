//! Table rows for terminal output.

use tabled::Tabled;

use crate::classify::WindowState;
use crate::date_math::{format_date_input, format_date_range};
use crate::exclusion::DeletedWindow;
use crate::history::{BenefitCycleReport, CycleReport};
use crate::models::{Card, Cycle, Redemption};
use crate::summary::BenefitSummary;

fn money(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", -value)
    } else {
        format!("${value:.2}")
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CardRow {
    pub id: i64,
    pub name: String,
    pub annual_fee: String,
    pub fee_due_date: String,
    pub tracking: String,
    pub created: String,
}

impl From<&Card> for CardRow {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            name: card.name.clone(),
            annual_fee: money(card.annual_fee),
            fee_due_date: format_date_input(card.fee_due_date),
            tracking: card.year_tracking_mode.to_string(),
            created: card.created_at.map(format_date_input).unwrap_or_else(|| "-".into()),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CycleRow {
    pub label: String,
    pub dates: String,
    pub mode: String,
}

impl From<&Cycle> for CycleRow {
    fn from(cycle: &Cycle) -> Self {
        Self {
            label: cycle.label.clone(),
            dates: format_date_range(cycle.start, cycle.end),
            mode: cycle.mode.to_string(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct WindowRow {
    pub index: u32,
    pub window: String,
    pub used: String,
    pub target: String,
    pub remaining: String,
    pub progress: String,
    pub status: String,
}

impl From<&WindowState> for WindowRow {
    fn from(state: &WindowState) -> Self {
        let status = if state.state.is_expired() {
            format!("{} (expired {})", state.state.status, money(state.state.expired))
        } else {
            state.state.status.to_string()
        };
        Self {
            index: state.window.index,
            window: state.window.label.clone(),
            used: money(state.state.used),
            target: money(state.state.target),
            remaining: money(state.state.remaining),
            progress: format!("{:.0}%", state.state.progress_percent()),
            status,
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct DeletedWindowRow {
    pub exclusion_id: i64,
    pub index: u32,
    pub window: String,
    pub matched_by: String,
}

impl From<&DeletedWindow> for DeletedWindowRow {
    fn from(deleted: &DeletedWindow) -> Self {
        Self {
            exclusion_id: deleted.exclusion_id,
            index: deleted.window.index,
            window: deleted.window.label.clone(),
            matched_by: format!("{:?}", deleted.matched_by).to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct RedemptionRow {
    pub id: i64,
    pub date: String,
    pub label: String,
    pub amount: String,
}

impl From<&Redemption> for RedemptionRow {
    fn from(redemption: &Redemption) -> Self {
        Self {
            id: redemption.id,
            date: redemption
                .occurred_on
                .map(format_date_input)
                .unwrap_or_else(|| "invalid".into()),
            label: redemption.label.clone(),
            amount: money(redemption.amount),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct BenefitSummaryRow {
    pub id: i64,
    pub benefit: String,
    #[tabled(rename = "type")]
    pub benefit_type: String,
    pub cycle: String,
    pub current_window: String,
    pub remaining: String,
    pub cycle_used: String,
    pub cycle_value: String,
    pub missed: String,
    pub status: String,
}

impl From<&BenefitSummary> for BenefitSummaryRow {
    fn from(summary: &BenefitSummary) -> Self {
        let current_window = summary
            .current_window
            .as_ref()
            .map(|w| w.window.label.clone())
            .unwrap_or_else(|| "excluded".into());
        let status = summary
            .current_window
            .as_ref()
            .map(|w| w.state.status)
            .unwrap_or(summary.cycle_state.status);
        Self {
            id: summary.benefit_id,
            benefit: summary.name.clone(),
            benefit_type: format!("{} / {}", summary.benefit_type, summary.frequency),
            cycle: summary.cycle.label.clone(),
            current_window,
            remaining: summary.remaining_value.map(money).unwrap_or_else(|| "-".into()),
            cycle_used: money(summary.cycle_state.utilized_value()),
            cycle_value: money(summary.cycle_target_value),
            missed: money(summary.missed_value),
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CycleReportRow {
    pub cycle: String,
    pub dates: String,
    pub potential: String,
    pub utilized: String,
    pub annual_fee: String,
    pub net: String,
}

impl From<&CycleReport> for CycleReportRow {
    fn from(report: &CycleReport) -> Self {
        Self {
            cycle: report.cycle.label.clone(),
            dates: format_date_range(report.cycle.start, report.cycle.end),
            potential: money(report.potential_value),
            utilized: money(report.utilized_value),
            annual_fee: money(report.annual_fee),
            net: money(report.net_value),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct BenefitCycleRow {
    pub benefit: String,
    pub windows: usize,
    pub redeemed: String,
    pub used: String,
    pub target: String,
    pub status: String,
}

impl From<&BenefitCycleReport> for BenefitCycleRow {
    fn from(report: &BenefitCycleReport) -> Self {
        Self {
            benefit: report.name.clone(),
            windows: report.windows.len(),
            redeemed: money(report.redemption_total),
            used: money(report.state.utilized_value()),
            target: money(report.state.target),
            status: report.state.status.to_string(),
        }
    }
}

/// Converts a slice of records into table rows.
pub fn rows<'a, R, T>(items: &'a [T]) -> Vec<R>
where
    R: From<&'a T>,
{
    items.iter().map(R::from).collect()
}
