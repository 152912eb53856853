use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use crate::date_math::{format_date_input, parse_date_lenient};
use crate::error::{Result, TrackerError};
use crate::models::{
    Benefit, BenefitKind, BenefitType, Card, Frequency, Redemption, WindowExclusion,
    YearTrackingMode,
};

/// Creates tables on the given connection.
pub fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS cards (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL,
            annual_fee          REAL NOT NULL DEFAULT 0.0,
            fee_due_date        TEXT NOT NULL,
            year_tracking_mode  TEXT NOT NULL DEFAULT 'calendar',
            created_at          TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS benefits (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id               INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            name                  TEXT NOT NULL,
            benefit_type          TEXT NOT NULL DEFAULT 'standard',
            frequency             TEXT NOT NULL,
            value                 REAL NOT NULL DEFAULT 0.0,
            expected_value        REAL,
            window_values         TEXT,
            window_tracking_mode  TEXT,
            used_at               TEXT,
            expiration_date       TEXT
        );
        CREATE TABLE IF NOT EXISTS redemptions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            benefit_id   INTEGER NOT NULL REFERENCES benefits(id) ON DELETE CASCADE,
            label        TEXT NOT NULL,
            amount       REAL NOT NULL,
            occurred_on  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS window_exclusions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            benefit_id    INTEGER NOT NULL REFERENCES benefits(id) ON DELETE CASCADE,
            window_start  TEXT,
            window_end    TEXT,
            window_label  TEXT,
            window_index  INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_benefits_card ON benefits(card_id);
        CREATE INDEX IF NOT EXISTS idx_redemptions_benefit ON redemptions(benefit_id);
        CREATE INDEX IF NOT EXISTS idx_exclusions_benefit ON window_exclusions(benefit_id);",
    )?;
    Ok(())
}

/// Opens (or creates) the SQLite database file and ensures tables exist.
pub fn init_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_tables(&conn)?;
    Ok(conn)
}

/// Opens an existing database with foreign keys enforced, without touching the schema.
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub name: String,
    pub annual_fee: f64,
    pub fee_due_date: NaiveDate,
    pub year_tracking_mode: YearTrackingMode,
    pub created_at: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct NewBenefit {
    pub name: String,
    pub frequency: Frequency,
    pub kind: BenefitKind,
    pub window_values: Option<Vec<f64>>,
    pub window_tracking_mode: Option<YearTrackingMode>,
    pub expiration_date: Option<NaiveDate>,
}

/// Fields to change on a card; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct CardUpdate {
    pub name: Option<String>,
    pub annual_fee: Option<f64>,
    pub fee_due_date: Option<NaiveDate>,
    pub year_tracking_mode: Option<YearTrackingMode>,
}

/// Fields to change on a benefit. The nested options clear a field with
/// `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct BenefitUpdate {
    pub name: Option<String>,
    pub benefit_type: Option<BenefitType>,
    pub frequency: Option<Frequency>,
    pub value: Option<f64>,
    pub expected_value: Option<Option<f64>>,
    pub window_values: Option<Option<Vec<f64>>>,
    pub window_tracking_mode: Option<Option<YearTrackingMode>>,
    pub expiration_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default)]
pub struct RedemptionUpdate {
    pub label: Option<String>,
    pub amount: Option<f64>,
    pub occurred_on: Option<NaiveDate>,
}

fn check_annual_fee(fee: f64) -> Result<()> {
    if fee < 0.0 || !fee.is_finite() {
        return Err(TrackerError::InvalidAmount(format!(
            "annual fee must be a finite amount of zero or greater, got {fee}"
        )));
    }
    Ok(())
}

fn check_redemption_amount(amount: f64) -> Result<()> {
    if !(amount > 0.0 && amount.is_finite()) {
        return Err(TrackerError::InvalidAmount(format!(
            "redemption amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn window_values_json(values: &Option<Vec<f64>>) -> Result<Option<String>> {
    match values {
        Some(values) => Ok(Some(serde_json::to_string(values)?)),
        None => Ok(None),
    }
}

fn opt_date(value: Option<NaiveDate>) -> Option<String> {
    value.map(format_date_input)
}

fn read_date(value: Option<String>) -> Option<NaiveDate> {
    value.as_deref().and_then(parse_date_lenient)
}

pub fn add_card(conn: &Connection, card: &NewCard) -> Result<i64> {
    check_annual_fee(card.annual_fee)?;
    conn.execute(
        "INSERT INTO cards (name, annual_fee, fee_due_date, year_tracking_mode, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            card.name,
            card.annual_fee,
            format_date_input(card.fee_due_date),
            card.year_tracking_mode.as_str(),
            format_date_input(card.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let fee_due: String = row.get(3)?;
    let mode: String = row.get(4)?;
    let created: String = row.get(5)?;
    // Every cycle hangs off the fee date, so an unreadable one fails the row.
    let fee_due_date = parse_date_lenient(&fee_due).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            Box::new(TrackerError::InvalidDate(fee_due.clone())),
        )
    })?;
    Ok(Card {
        id: row.get(0)?,
        name: row.get(1)?,
        annual_fee: row.get(2)?,
        fee_due_date,
        year_tracking_mode: mode.parse().unwrap_or(YearTrackingMode::Calendar),
        created_at: parse_date_lenient(&created),
    })
}

const CARD_COLUMNS: &str =
    "id, name, annual_fee, fee_due_date, year_tracking_mode, created_at";

pub fn list_cards(conn: &Connection) -> Result<Vec<Card>> {
    let mut stmt = conn.prepare(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY id"))?;
    let rows = stmt.query_map([], card_from_row)?;

    let mut cards = Vec::new();
    for card in rows {
        cards.push(card?);
    }
    Ok(cards)
}

pub fn get_card(conn: &Connection, id: i64) -> Result<Card> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
        params![id],
        card_from_row,
    )
    .optional()?
    .ok_or(TrackerError::NotFound { entity: "Card", id })
}

/// Applies `update` and returns the stored card.
pub fn update_card(conn: &Connection, id: i64, update: &CardUpdate) -> Result<Card> {
    let mut card = get_card(conn, id)?;
    if let Some(name) = &update.name {
        card.name = name.clone();
    }
    if let Some(fee) = update.annual_fee {
        check_annual_fee(fee)?;
        card.annual_fee = fee;
    }
    if let Some(date) = update.fee_due_date {
        card.fee_due_date = date;
    }
    if let Some(mode) = update.year_tracking_mode {
        card.year_tracking_mode = mode;
    }
    conn.execute(
        "UPDATE cards SET name = ?1, annual_fee = ?2, fee_due_date = ?3, year_tracking_mode = ?4
         WHERE id = ?5",
        params![
            card.name,
            card.annual_fee,
            format_date_input(card.fee_due_date),
            card.year_tracking_mode.as_str(),
            id,
        ],
    )?;
    get_card(conn, id)
}

pub fn remove_card(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

pub fn add_benefit(conn: &Connection, card_id: i64, new: &NewBenefit) -> Result<i64> {
    get_card(conn, card_id)?;
    let candidate = Benefit {
        id: 0,
        card_id,
        name: new.name.clone(),
        frequency: new.frequency,
        kind: new.kind.clone(),
        window_values: new.window_values.clone(),
        window_tracking_mode: new.window_tracking_mode,
        expiration_date: new.expiration_date,
        exclusions: Vec::new(),
    };
    candidate.validate()?;

    let window_values_json = window_values_json(&new.window_values)?;
    conn.execute(
        "INSERT INTO benefits (card_id, name, benefit_type, frequency, value, expected_value,
                               window_values, window_tracking_mode, used_at, expiration_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            card_id,
            new.name,
            new.kind.type_name(),
            new.frequency.as_str(),
            new.kind.flat_value(),
            new.kind.expected_value(),
            window_values_json,
            new.window_tracking_mode.map(|m| m.as_str()),
            opt_date(new.kind.used_at()),
            opt_date(new.expiration_date),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const BENEFIT_COLUMNS: &str = "id, card_id, name, benefit_type, frequency, value, expected_value,
     window_values, window_tracking_mode, used_at, expiration_date";

fn benefit_from_row(row: &Row<'_>) -> rusqlite::Result<Benefit> {
    let id: i64 = row.get(0)?;
    let benefit_type: String = row.get(3)?;
    let frequency: String = row.get(4)?;
    let value: f64 = row.get(5)?;
    let expected_value: Option<f64> = row.get(6)?;
    let window_values: Option<String> = row.get(7)?;
    let window_mode: Option<String> = row.get(8)?;
    let used_at: Option<String> = row.get(9)?;
    let expiration: Option<String> = row.get(10)?;

    let kind = match benefit_type.as_str() {
        "incremental" => BenefitKind::Incremental { value },
        "cumulative" => BenefitKind::Cumulative { expected_value },
        other => {
            if other != "standard" {
                warn!(benefit_id = id, benefit_type = other, "unknown benefit type, treating as standard");
            }
            BenefitKind::Standard {
                value,
                used_at: read_date(used_at),
            }
        }
    };
    let window_values = window_values.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(values) => Some(values),
        Err(err) => {
            warn!(benefit_id = id, %err, "ignoring unreadable window values");
            None
        }
    });

    Ok(Benefit {
        id,
        card_id: row.get(1)?,
        name: row.get(2)?,
        frequency: Frequency::from_stored(&frequency),
        kind,
        window_values,
        window_tracking_mode: window_mode.and_then(|m| m.parse().ok()),
        expiration_date: read_date(expiration),
        exclusions: Vec::new(),
    })
}

/// Benefits of a card, each with its window exclusions attached.
pub fn list_benefits_for_card(conn: &Connection, card_id: i64) -> Result<Vec<Benefit>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BENEFIT_COLUMNS} FROM benefits WHERE card_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![card_id], benefit_from_row)?;

    let mut benefits = Vec::new();
    for benefit in rows {
        let mut benefit = benefit?;
        benefit.exclusions = list_window_exclusions(conn, benefit.id)?;
        benefits.push(benefit);
    }
    Ok(benefits)
}

pub fn get_benefit(conn: &Connection, id: i64) -> Result<Benefit> {
    let mut benefit = conn
        .query_row(
            &format!("SELECT {BENEFIT_COLUMNS} FROM benefits WHERE id = ?1"),
            params![id],
            benefit_from_row,
        )
        .optional()?
        .ok_or(TrackerError::NotFound { entity: "Benefit", id })?;
    benefit.exclusions = list_window_exclusions(conn, id)?;
    Ok(benefit)
}

/// Applies `update`, re-validating the result. Changing the type drops any
/// recorded `used_at`. Exclusions are kept; ones that no longer line up with
/// a window after a frequency change simply match nothing.
pub fn update_benefit(conn: &Connection, id: i64, update: &BenefitUpdate) -> Result<Benefit> {
    let mut benefit = get_benefit(conn, id)?;
    let benefit_type = update.benefit_type.unwrap_or(benefit.kind.benefit_type());
    let value = update.value.unwrap_or(benefit.kind.flat_value());
    let expected_value = update.expected_value.unwrap_or(benefit.kind.expected_value());
    benefit.kind = benefit.kind.with_type(benefit_type, value, expected_value);

    if let Some(name) = &update.name {
        benefit.name = name.clone();
    }
    if let Some(frequency) = update.frequency {
        benefit.frequency = frequency;
    }
    if let Some(values) = &update.window_values {
        benefit.window_values = values.clone();
    }
    if let Some(mode) = update.window_tracking_mode {
        benefit.window_tracking_mode = mode;
    }
    if let Some(date) = update.expiration_date {
        benefit.expiration_date = date;
    }
    benefit.validate()?;

    conn.execute(
        "UPDATE benefits SET name = ?1, benefit_type = ?2, frequency = ?3, value = ?4,
                expected_value = ?5, window_values = ?6, window_tracking_mode = ?7,
                used_at = ?8, expiration_date = ?9
         WHERE id = ?10",
        params![
            benefit.name,
            benefit.kind.type_name(),
            benefit.frequency.as_str(),
            benefit.kind.flat_value(),
            benefit.kind.expected_value(),
            window_values_json(&benefit.window_values)?,
            benefit.window_tracking_mode.map(|m| m.as_str()),
            opt_date(benefit.kind.used_at()),
            opt_date(benefit.expiration_date),
            id,
        ],
    )?;
    get_benefit(conn, id)
}

pub fn remove_benefit(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM benefits WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Marks a standard benefit used on `used_at`, or clears it with `None`.
pub fn set_benefit_usage(conn: &Connection, id: i64, used_at: Option<NaiveDate>) -> Result<()> {
    let benefit = get_benefit(conn, id)?;
    if !matches!(benefit.kind, BenefitKind::Standard { .. }) {
        return Err(TrackerError::Validation(format!(
            "benefit {id} is {}; only standard benefits are marked used, others track redemptions",
            benefit.kind.type_name()
        )));
    }
    conn.execute(
        "UPDATE benefits SET used_at = ?1 WHERE id = ?2",
        params![opt_date(used_at), id],
    )?;
    Ok(())
}

pub fn add_redemption(
    conn: &Connection,
    benefit_id: i64,
    label: &str,
    amount: f64,
    occurred_on: NaiveDate,
) -> Result<i64> {
    check_redemption_amount(amount)?;
    get_benefit(conn, benefit_id)?;
    conn.execute(
        "INSERT INTO redemptions (benefit_id, label, amount, occurred_on) VALUES (?1, ?2, ?3, ?4)",
        params![benefit_id, label, amount, format_date_input(occurred_on)],
    )?;
    Ok(conn.last_insert_rowid())
}

fn redemption_from_row(row: &Row<'_>) -> rusqlite::Result<Redemption> {
    let occurred_on: String = row.get(4)?;
    Ok(Redemption {
        id: row.get(0)?,
        benefit_id: row.get(1)?,
        label: row.get(2)?,
        amount: row.get(3)?,
        occurred_on: parse_date_lenient(&occurred_on),
    })
}

pub fn get_redemption(conn: &Connection, id: i64) -> Result<Redemption> {
    conn.query_row(
        "SELECT id, benefit_id, label, amount, occurred_on FROM redemptions WHERE id = ?1",
        params![id],
        redemption_from_row,
    )
    .optional()?
    .ok_or(TrackerError::NotFound { entity: "Redemption", id })
}

/// Redemptions for one benefit, newest first.
pub fn list_redemptions(conn: &Connection, benefit_id: i64) -> Result<Vec<Redemption>> {
    let mut stmt = conn.prepare(
        "SELECT id, benefit_id, label, amount, occurred_on FROM redemptions
         WHERE benefit_id = ?1
         ORDER BY occurred_on DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![benefit_id], redemption_from_row)?;

    let mut redemptions = Vec::new();
    for redemption in rows {
        redemptions.push(redemption?);
    }
    Ok(redemptions)
}

pub fn update_redemption(conn: &Connection, id: i64, update: &RedemptionUpdate) -> Result<Redemption> {
    let mut redemption = get_redemption(conn, id)?;
    if let Some(label) = &update.label {
        redemption.label = label.clone();
    }
    if let Some(amount) = update.amount {
        check_redemption_amount(amount)?;
        redemption.amount = amount;
    }
    if let Some(date) = update.occurred_on {
        redemption.occurred_on = Some(date);
    }
    let Some(occurred_on) = redemption.occurred_on else {
        return Err(TrackerError::Validation(format!(
            "redemption {id} has an unreadable date; pass a new one"
        )));
    };
    conn.execute(
        "UPDATE redemptions SET label = ?1, amount = ?2, occurred_on = ?3 WHERE id = ?4",
        params![redemption.label, redemption.amount, format_date_input(occurred_on), id],
    )?;
    get_redemption(conn, id)
}

pub fn remove_redemption(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM redemptions WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

pub fn add_window_exclusion(conn: &Connection, exclusion: &WindowExclusion) -> Result<i64> {
    get_benefit(conn, exclusion.benefit_id)?;
    conn.execute(
        "INSERT INTO window_exclusions (benefit_id, window_start, window_end, window_label, window_index)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            exclusion.benefit_id,
            opt_date(exclusion.window_start),
            opt_date(exclusion.window_end),
            exclusion.window_label,
            exclusion.window_index,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_window_exclusions(conn: &Connection, benefit_id: i64) -> Result<Vec<WindowExclusion>> {
    let mut stmt = conn.prepare(
        "SELECT id, benefit_id, window_start, window_end, window_label, window_index
         FROM window_exclusions WHERE benefit_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![benefit_id], |row| {
        Ok(WindowExclusion {
            id: row.get(0)?,
            benefit_id: row.get(1)?,
            window_start: read_date(row.get(2)?),
            window_end: read_date(row.get(3)?),
            window_label: row.get(4)?,
            window_index: row.get(5)?,
        })
    })?;

    let mut exclusions = Vec::new();
    for exclusion in rows {
        exclusions.push(exclusion?);
    }
    Ok(exclusions)
}

pub fn remove_window_exclusion(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM window_exclusions WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
