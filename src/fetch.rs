//! Scatter/gather loading of per-benefit redemptions.
//!
//! The engine never does I/O. Callers fetch every benefit's redemptions
//! concurrently and hand the gathered map over as part of a [`CardSnapshot`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::db;
use crate::error::Result;
use crate::history::CardSnapshot;
use crate::models::Redemption;

/// Anything able to produce the redemptions recorded against one benefit.
pub trait RedemptionSource: Send + Sync + 'static {
    fn redemptions_for(&self, benefit_id: i64) -> Result<Vec<Redemption>>;
}

/// Reads redemptions from a SQLite file, one connection per fetch.
#[derive(Debug, Clone)]
pub struct SqliteRedemptionSource {
    path: PathBuf,
}

impl SqliteRedemptionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RedemptionSource for SqliteRedemptionSource {
    fn redemptions_for(&self, benefit_id: i64) -> Result<Vec<Redemption>> {
        let conn = db::open_db(&self.path)?;
        db::list_redemptions(&conn, benefit_id)
    }
}

/// Fetches every benefit's redemptions in parallel and waits for all of them.
///
/// Completion order is irrelevant. The first failure drops the set, which
/// aborts whatever is still in flight.
pub async fn gather_redemptions<S: RedemptionSource>(
    source: Arc<S>,
    benefit_ids: &[i64],
) -> Result<HashMap<i64, Vec<Redemption>>> {
    let mut set = JoinSet::new();
    for &benefit_id in benefit_ids {
        let source = Arc::clone(&source);
        set.spawn_blocking(move || {
            source
                .redemptions_for(benefit_id)
                .map(|redemptions| (benefit_id, redemptions))
        });
    }

    let mut gathered = HashMap::with_capacity(benefit_ids.len());
    while let Some(joined) = set.join_next().await {
        let (benefit_id, redemptions) = joined??;
        gathered.insert(benefit_id, redemptions);
    }
    debug!(benefits = gathered.len(), "gathered redemptions");
    Ok(gathered)
}

/// Loads a card and its benefits, then gathers their redemptions concurrently.
pub async fn load_card_snapshot(path: PathBuf, card_id: i64) -> Result<CardSnapshot> {
    let card_path = path.clone();
    let (card, benefits) = tokio::task::spawn_blocking(move || -> Result<_> {
        let conn = db::open_db(&card_path)?;
        let card = db::get_card(&conn, card_id)?;
        let benefits = db::list_benefits_for_card(&conn, card_id)?;
        Ok((card, benefits))
    })
    .await??;

    let ids: Vec<i64> = benefits.iter().map(|b| b.id).collect();
    let redemptions = gather_redemptions(Arc::new(SqliteRedemptionSource::new(path)), &ids).await?;
    Ok(CardSnapshot {
        card,
        benefits,
        redemptions,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use super::*;
    use crate::db::{NewBenefit, NewCard};
    use crate::error::TrackerError;
    use crate::models::{BenefitKind, Frequency, YearTrackingMode};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct MemorySource {
        by_benefit: HashMap<i64, Vec<Redemption>>,
        calls: Mutex<Vec<i64>>,
    }

    impl RedemptionSource for MemorySource {
        fn redemptions_for(&self, benefit_id: i64) -> Result<Vec<Redemption>> {
            self.calls.lock().unwrap().push(benefit_id);
            self.by_benefit
                .get(&benefit_id)
                .cloned()
                .ok_or(TrackerError::NotFound { entity: "Benefit", id: benefit_id })
        }
    }

    fn redemption(id: i64, benefit_id: i64, amount: f64) -> Redemption {
        Redemption {
            id,
            benefit_id,
            amount,
            occurred_on: Some(d(2024, 3, 1)),
            label: "Use".into(),
        }
    }

    #[tokio::test]
    async fn test_gather_waits_for_every_benefit() {
        let mut by_benefit = HashMap::new();
        by_benefit.insert(1, vec![redemption(1, 1, 10.0)]);
        by_benefit.insert(2, vec![redemption(2, 2, 5.0), redemption(3, 2, 7.0)]);
        by_benefit.insert(3, Vec::new());
        let source = Arc::new(MemorySource {
            by_benefit,
            calls: Mutex::new(Vec::new()),
        });

        let gathered = gather_redemptions(Arc::clone(&source), &[1, 2, 3]).await.unwrap();
        assert_eq!(gathered.len(), 3);
        assert_eq!(gathered[&2].len(), 2);
        assert!(gathered[&3].is_empty());

        let mut calls = source.calls.lock().unwrap().clone();
        calls.sort_unstable();
        assert_eq!(calls, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_gather_surfaces_failure() {
        let source = Arc::new(MemorySource {
            by_benefit: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        });
        let result = gather_redemptions(source, &[4]).await;
        assert!(matches!(result, Err(TrackerError::NotFound { id: 4, .. })));
    }

    #[tokio::test]
    async fn test_gather_with_no_benefits() {
        let source = Arc::new(MemorySource {
            by_benefit: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        });
        assert!(gather_redemptions(source, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_card_snapshot_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.db");
        let (card_id, benefit_id) = {
            let conn = db::init_db(&path).unwrap();
            let card_id = db::add_card(
                &conn,
                &NewCard {
                    name: "Travel Card".into(),
                    annual_fee: 250.0,
                    fee_due_date: d(2024, 8, 15),
                    year_tracking_mode: YearTrackingMode::Calendar,
                    created_at: d(2024, 1, 5),
                },
            )
            .unwrap();
            let benefit_id = db::add_benefit(
                &conn,
                card_id,
                &NewBenefit {
                    name: "Rideshare".into(),
                    frequency: Frequency::Monthly,
                    kind: BenefitKind::Incremental { value: 15.0 },
                    window_values: None,
                    window_tracking_mode: None,
                    expiration_date: None,
                },
            )
            .unwrap();
            db::add_redemption(&conn, benefit_id, "Ride", 12.5, d(2024, 2, 14)).unwrap();
            (card_id, benefit_id)
        };

        let snapshot = load_card_snapshot(path, card_id).await.unwrap();
        assert_eq!(snapshot.card.name, "Travel Card");
        assert_eq!(snapshot.benefits.len(), 1);
        assert_eq!(snapshot.redemptions_for(benefit_id).len(), 1);
        assert_eq!(snapshot.redemptions_for(benefit_id)[0].amount, 12.5);
    }

    #[tokio::test]
    async fn test_load_card_snapshot_missing_card() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.db");
        db::init_db(&path).unwrap();
        let result = load_card_snapshot(path, 99).await;
        assert!(matches!(result, Err(TrackerError::NotFound { entity: "Card", id: 99 })));
    }
}
