//! Per-window and per-cycle benefit status.
//!
//! Status is a pure function of the resolved target and the aggregated
//! used/expired amounts.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::WindowTotal;
use crate::models::{Benefit, BenefitKind, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitStatus {
    // standard
    Available,
    Utilized,
    // incremental
    NotStarted,
    InProgress,
    Completed,
    // cumulative
    NoActivity,
    Tracking,
}

impl BenefitStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Utilized => "Utilized",
            Self::NotStarted => "Not started",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
            Self::NoActivity => "No activity",
            Self::Tracking => "Tracking",
        }
    }
}

impl fmt::Display for BenefitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BenefitState {
    pub target: f64,
    pub used: f64,
    pub remaining: f64,
    /// Unused target from windows that have already closed.
    pub expired: f64,
    pub status: BenefitStatus,
}

impl BenefitState {
    fn new(target: f64, used: f64, expired: f64, status: BenefitStatus) -> Self {
        Self {
            target,
            used,
            remaining: (target - used - expired).max(0.0),
            expired,
            status,
        }
    }

    /// Share of the target used, 0-100. Zero when there is no positive target.
    pub fn progress_percent(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        (self.used * 100.0 / self.target).clamp(0.0, 100.0)
    }

    /// Value actually captured: usage beyond a positive target does not count.
    pub fn utilized_value(&self) -> f64 {
        if self.target > 0.0 {
            self.used.min(self.target)
        } else {
            self.used
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowState {
    pub window: Window,
    /// Raw redemption total in the window.
    pub total: f64,
    pub state: BenefitState,
}

/// Target for window `index` (1-based): the matching `window_values` entry
/// when configured, else the flat value. `None` for cumulative benefits
/// without an expected value, whose target is their running total.
pub fn resolve_target(benefit: &Benefit, index: u32) -> Option<f64> {
    match &benefit.kind {
        BenefitKind::Standard { value, .. } | BenefitKind::Incremental { value } => {
            let custom = benefit
                .window_values
                .as_ref()
                .and_then(|values| values.get(index.saturating_sub(1) as usize))
                .copied();
            Some(custom.unwrap_or(*value))
        }
        BenefitKind::Cumulative { expected_value } => *expected_value,
    }
}

/// Shortfall lost from a window whose end has passed. A window counts as
/// expired once `today >= end` with `used < target`; no grace period applies.
pub fn expired_amount(target: f64, used: f64, window_end: NaiveDate, today: NaiveDate) -> f64 {
    if today >= window_end && used < target {
        target - used
    } else {
        0.0
    }
}

pub fn classify_standard(target: f64, utilized: bool, expired: f64) -> BenefitState {
    if utilized {
        BenefitState::new(target, target, 0.0, BenefitStatus::Utilized)
    } else {
        BenefitState::new(target, 0.0, expired, BenefitStatus::Available)
    }
}

pub fn classify_incremental(target: f64, used: f64, expired: f64) -> BenefitState {
    let status = if target > 0.0 && used >= target {
        BenefitStatus::Completed
    } else if used > 0.0 && used < target {
        BenefitStatus::InProgress
    } else {
        BenefitStatus::NotStarted
    };
    BenefitState::new(target, used, expired, status)
}

/// Cumulative benefits complete only against an explicit expected value.
pub fn classify_cumulative(expected_value: Option<f64>, used: f64) -> BenefitState {
    let target = expected_value.unwrap_or(used);
    let status = match expected_value {
        Some(expected) if used >= expected && expected > 0.0 => BenefitStatus::Completed,
        _ if used > 0.0 => BenefitStatus::Tracking,
        _ => BenefitStatus::NoActivity,
    };
    BenefitState::new(target, used, 0.0, status)
}

/// Classifies one aggregated window as of `today`.
pub fn classify_window(benefit: &Benefit, total: &WindowTotal, today: NaiveDate) -> WindowState {
    let window = &total.window;
    let state = match &benefit.kind {
        BenefitKind::Standard { used_at, .. } => {
            let target = resolve_target(benefit, window.index).unwrap_or(0.0);
            let utilized = used_at.is_some_and(|date| window.contains(date));
            let expired = if utilized {
                0.0
            } else {
                expired_amount(target, 0.0, window.end, today)
            };
            classify_standard(target, utilized, expired)
        }
        BenefitKind::Incremental { .. } => {
            let target = resolve_target(benefit, window.index).unwrap_or(0.0);
            let expired = expired_amount(target, total.total, window.end, today);
            classify_incremental(target, total.total, expired)
        }
        // The expected value is a whole-cycle goal; windows just track.
        BenefitKind::Cumulative { .. } => classify_cumulative(None, total.total),
    };
    WindowState {
        window: window.clone(),
        total: total.total,
        state,
    }
}

pub fn classify_windows(benefit: &Benefit, totals: &[WindowTotal], today: NaiveDate) -> Vec<WindowState> {
    totals.iter().map(|t| classify_window(benefit, t, today)).collect()
}

/// Rolls classified windows up into a whole-cycle state.
///
/// Only the windows decide the result, so a benefit whose windows were
/// assigned from its own override cycles reports consistently.
pub fn classify_cycle(benefit: &Benefit, windows: &[WindowState]) -> BenefitState {
    let target: f64 = windows.iter().map(|w| w.state.target).sum();
    let expired: f64 = windows.iter().map(|w| w.state.expired).sum();
    match &benefit.kind {
        BenefitKind::Standard { .. } => {
            let used: f64 = windows.iter().map(|w| w.state.used).sum();
            let status = if windows.iter().any(|w| w.state.status == BenefitStatus::Utilized) {
                BenefitStatus::Utilized
            } else {
                BenefitStatus::Available
            };
            BenefitState::new(target, used, expired, status)
        }
        BenefitKind::Incremental { .. } => {
            let used: f64 = windows.iter().map(|w| w.state.utilized_value()).sum();
            classify_incremental(target, used, expired)
        }
        BenefitKind::Cumulative { expected_value } => {
            let used: f64 = windows.iter().map(|w| w.total).sum();
            classify_cumulative(*expected_value, used)
        }
    }
}
