use std::path::PathBuf;
use std::process::ExitCode;

use cc_benefit_tracker::date_math::{format_date_input, parse_date, start_of_day};
use cc_benefit_tracker::db::{self, BenefitUpdate, CardUpdate, NewBenefit, NewCard, RedemptionUpdate};
use cc_benefit_tracker::display::{
    BenefitCycleRow, BenefitSummaryRow, CardRow, CycleReportRow, CycleRow, DeletedWindowRow,
    RedemptionRow, WindowRow, rows,
};
use cc_benefit_tracker::exclusion::exclusion_for;
use cc_benefit_tracker::fetch;
use cc_benefit_tracker::history::{HistoryOptions, build_card_history, history_cycles};
use cc_benefit_tracker::models::{BenefitKind, BenefitType, Frequency, YearTrackingMode};
use cc_benefit_tracker::summary::{summarize_benefit, summarize_card};
use cc_benefit_tracker::{Result, TrackerError};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tabled::Table;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Credit card benefit tracker: annual-fee cycles, benefit windows and what you got back
#[derive(Parser)]
#[command(name = "cc-tracker", version, about)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "CC_TRACKER_DB", default_value = "cc_tracker.db")]
    db: PathBuf,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long, global = true, env = "CC_TRACKER_AS_OF", value_parser = date_arg)]
    as_of: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new credit card
    AddCard {
        /// Card name (e.g. "Sapphire Reserve")
        #[arg(long)]
        name: String,
        /// Annual fee in dollars
        #[arg(long, default_value_t = 0.0)]
        annual_fee: f64,
        /// Date the annual fee is due (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        fee_due: NaiveDate,
        /// Year tracking mode: calendar or anniversary
        #[arg(long, default_value_t = YearTrackingMode::Calendar)]
        mode: YearTrackingMode,
        /// When tracking started (defaults to today)
        #[arg(long, value_parser = date_arg)]
        opened: Option<NaiveDate>,
    },

    /// List all saved credit cards
    ListCards,

    /// Change a card's details
    EditCard {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        annual_fee: Option<f64>,
        #[arg(long, value_parser = date_arg)]
        fee_due: Option<NaiveDate>,
        #[arg(long)]
        mode: Option<YearTrackingMode>,
    },

    /// Remove a credit card (and its benefits) by ID
    RemoveCard {
        #[arg(long)]
        id: i64,
    },

    /// Add a benefit to a card
    AddBenefit {
        #[arg(long)]
        card_id: i64,
        #[arg(long)]
        name: String,
        /// standard (marked used), incremental (spent down) or cumulative (running tally)
        #[arg(long = "type", default_value_t = BenefitType::Incremental)]
        kind: BenefitType,
        /// monthly, quarterly, semiannual or yearly
        #[arg(long)]
        frequency: Frequency,
        /// Value per window
        #[arg(long, default_value_t = 0.0)]
        value: f64,
        /// Per-window values, comma separated (one per window in the cycle)
        #[arg(long, value_delimiter = ',')]
        window_values: Vec<f64>,
        /// Whole-cycle goal for cumulative benefits
        #[arg(long)]
        expected_value: Option<f64>,
        /// Track windows by a different year mode than the card
        #[arg(long)]
        window_mode: Option<YearTrackingMode>,
        #[arg(long, value_parser = date_arg)]
        expires: Option<NaiveDate>,
    },

    /// Change a benefit; switching its type clears any usage date
    EditBenefit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        kind: Option<BenefitType>,
        #[arg(long)]
        frequency: Option<Frequency>,
        #[arg(long)]
        value: Option<f64>,
        #[arg(long, value_delimiter = ',', conflicts_with = "clear_window_values")]
        window_values: Option<Vec<f64>>,
        #[arg(long)]
        clear_window_values: bool,
        #[arg(long, conflicts_with = "clear_expected_value")]
        expected_value: Option<f64>,
        #[arg(long)]
        clear_expected_value: bool,
        #[arg(long, conflicts_with = "card_mode")]
        window_mode: Option<YearTrackingMode>,
        /// Follow the card's year mode again
        #[arg(long)]
        card_mode: bool,
        #[arg(long, value_parser = date_arg, conflicts_with = "no_expiry")]
        expires: Option<NaiveDate>,
        #[arg(long)]
        no_expiry: bool,
    },

    /// Remove a benefit by ID
    RemoveBenefit {
        #[arg(long)]
        id: i64,
    },

    /// Mark a standard benefit used (or clear it)
    UseBenefit {
        #[arg(long)]
        id: i64,
        /// Date it was used (defaults to today)
        #[arg(long, value_parser = date_arg, conflicts_with = "clear")]
        on: Option<NaiveDate>,
        #[arg(long)]
        clear: bool,
    },

    /// Record a redemption against a benefit
    AddRedemption {
        #[arg(long)]
        benefit_id: i64,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "Redemption")]
        label: String,
        /// Date of the redemption (defaults to today)
        #[arg(long, value_parser = date_arg)]
        on: Option<NaiveDate>,
    },

    /// Change a recorded redemption
    EditRedemption {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, value_parser = date_arg)]
        on: Option<NaiveDate>,
    },

    /// Remove a redemption by ID
    RemoveRedemption {
        #[arg(long)]
        id: i64,
    },

    /// List a benefit's redemptions, newest first
    ListRedemptions {
        #[arg(long)]
        benefit_id: i64,
    },

    /// Show the card's fee cycles from its earliest activity to today
    Cycles {
        #[arg(long)]
        card_id: i64,
        /// Ignore activity before this date
        #[arg(long, value_parser = date_arg)]
        since: Option<NaiveDate>,
    },

    /// Show a benefit's windows in its current cycle
    Windows {
        #[arg(long)]
        benefit_id: i64,
    },

    /// Hide a window of the current cycle by its index
    ExcludeWindow {
        #[arg(long)]
        benefit_id: i64,
        #[arg(long)]
        index: u32,
    },

    /// Bring back an excluded window by exclusion ID
    RestoreWindow {
        #[arg(long)]
        id: i64,
    },

    /// Current-cycle value of a card and its benefits
    Summary {
        #[arg(long)]
        card_id: i64,
    },

    /// Cycle-by-cycle value report for a card
    History {
        #[arg(long)]
        card_id: i64,
        /// Tracking start; earlier redemptions are reported as untracked
        #[arg(long, value_parser = date_arg)]
        since: Option<NaiveDate>,
        /// Show the oldest cycle first
        #[arg(long)]
        oldest_first: bool,
        /// Include the per-benefit breakdown of every cycle
        #[arg(long)]
        detail: bool,
    },
}

fn date_arg(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let today = cli.as_of.unwrap_or_else(|| start_of_day(chrono::Local::now().naive_local()));
    debug!(db = %cli.db.display(), today = %today, "starting");
    let conn = db::init_db(&cli.db)?;

    match cli.command {
        Commands::AddCard {
            name,
            annual_fee,
            fee_due,
            mode,
            opened,
        } => {
            let card = NewCard {
                name,
                annual_fee,
                fee_due_date: fee_due,
                year_tracking_mode: mode,
                created_at: opened.unwrap_or(today),
            };
            let id = db::add_card(&conn, &card)?;
            println!("Added card '{}' with ID {} ({} tracking)", card.name, id, mode);
        }

        Commands::ListCards => {
            let cards = db::list_cards(&conn)?;
            if cards.is_empty() {
                println!("No cards found. Add one with: cc-tracker add-card --name \"...\" --fee-due 2025-08-15");
            } else {
                println!("{}", Table::new(rows::<CardRow, _>(&cards)));
            }
        }

        Commands::EditCard {
            id,
            name,
            annual_fee,
            fee_due,
            mode,
        } => {
            let update = CardUpdate {
                name,
                annual_fee,
                fee_due_date: fee_due,
                year_tracking_mode: mode,
            };
            let card = db::update_card(&conn, id, &update)?;
            println!("Updated card '{}'", card.name);
            println!("{}", Table::new(rows::<CardRow, _>(std::slice::from_ref(&card))));
        }

        Commands::RemoveCard { id } => {
            if db::remove_card(&conn, id)? {
                println!("Removed card with ID {}", id);
            } else {
                println!("No card found with ID {}", id);
            }
        }

        Commands::AddBenefit {
            card_id,
            name,
            kind,
            frequency,
            value,
            window_values,
            expected_value,
            window_mode,
            expires,
        } => {
            let kind = match kind {
                BenefitType::Standard => BenefitKind::Standard { value, used_at: None },
                BenefitType::Incremental => BenefitKind::Incremental { value },
                BenefitType::Cumulative => BenefitKind::Cumulative { expected_value },
            };
            let benefit = NewBenefit {
                name,
                frequency,
                kind,
                window_values: (!window_values.is_empty()).then_some(window_values),
                window_tracking_mode: window_mode,
                expiration_date: expires,
            };
            let id = db::add_benefit(&conn, card_id, &benefit)?;
            println!("Added {} benefit '{}' with ID {}", frequency, benefit.name, id);
        }

        Commands::EditBenefit {
            id,
            name,
            kind,
            frequency,
            value,
            window_values,
            clear_window_values,
            expected_value,
            clear_expected_value,
            window_mode,
            card_mode,
            expires,
            no_expiry,
        } => {
            let update = BenefitUpdate {
                name,
                benefit_type: kind,
                frequency,
                value,
                expected_value: if clear_expected_value { Some(None) } else { expected_value.map(Some) },
                window_values: if clear_window_values { Some(None) } else { window_values.map(Some) },
                window_tracking_mode: if card_mode { Some(None) } else { window_mode.map(Some) },
                expiration_date: if no_expiry { Some(None) } else { expires.map(Some) },
            };
            let benefit = db::update_benefit(&conn, id, &update)?;
            println!(
                "Updated {} {} benefit '{}'",
                benefit.frequency,
                benefit.kind.type_name(),
                benefit.name
            );
        }

        Commands::RemoveBenefit { id } => {
            if db::remove_benefit(&conn, id)? {
                println!("Removed benefit with ID {}", id);
            } else {
                println!("No benefit found with ID {}", id);
            }
        }

        Commands::UseBenefit { id, on, clear } => {
            let used_at = if clear { None } else { Some(on.unwrap_or(today)) };
            db::set_benefit_usage(&conn, id, used_at)?;
            match used_at {
                Some(date) => println!("Marked benefit {} used on {}", id, format_date_input(date)),
                None => println!("Cleared usage for benefit {}", id),
            }
        }

        Commands::AddRedemption {
            benefit_id,
            amount,
            label,
            on,
        } => {
            let date = on.unwrap_or(today);
            let id = db::add_redemption(&conn, benefit_id, &label, amount, date)?;
            println!("Recorded ${:.2} on {} with ID {}", amount, format_date_input(date), id);
        }

        Commands::EditRedemption {
            id,
            amount,
            label,
            on,
        } => {
            let update = RedemptionUpdate {
                label,
                amount,
                occurred_on: on,
            };
            let redemption = db::update_redemption(&conn, id, &update)?;
            println!("{}", Table::new(rows::<RedemptionRow, _>(std::slice::from_ref(&redemption))));
        }

        Commands::RemoveRedemption { id } => {
            if db::remove_redemption(&conn, id)? {
                println!("Removed redemption with ID {}", id);
            } else {
                println!("No redemption found with ID {}", id);
            }
        }

        Commands::ListRedemptions { benefit_id } => {
            db::get_benefit(&conn, benefit_id)?;
            let redemptions = db::list_redemptions(&conn, benefit_id)?;
            if redemptions.is_empty() {
                println!("No redemptions recorded for benefit {}", benefit_id);
            } else {
                println!("{}", Table::new(rows::<RedemptionRow, _>(&redemptions)));
            }
        }

        Commands::Cycles { card_id, since } => {
            let snapshot = fetch::load_card_snapshot(cli.db.clone(), card_id).await?;
            let cycles = history_cycles(&snapshot, today, since);
            println!("{} ({} tracking)", snapshot.card.name, snapshot.card.year_tracking_mode);
            println!("{}", Table::new(rows::<CycleRow, _>(&cycles)));
        }

        Commands::Windows { benefit_id } => {
            let benefit = db::get_benefit(&conn, benefit_id)?;
            let card = db::get_card(&conn, benefit.card_id)?;
            let redemptions = db::list_redemptions(&conn, benefit_id)?;
            let summary = summarize_benefit(&card, &benefit, &redemptions, today);

            println!("{}, cycle {}", summary.name, summary.cycle.label);
            println!("{}", Table::new(rows::<WindowRow, _>(&summary.windows)));
            if !summary.deleted_windows.is_empty() {
                println!("Excluded windows:");
                println!("{}", Table::new(rows::<DeletedWindowRow, _>(&summary.deleted_windows)));
            }
        }

        Commands::ExcludeWindow { benefit_id, index } => {
            let benefit = db::get_benefit(&conn, benefit_id)?;
            let card = db::get_card(&conn, benefit.card_id)?;
            let summary = summarize_benefit(&card, &benefit, &[], today);
            if summary.deleted_windows.iter().any(|d| d.window.index == index) {
                println!("Window {} is already excluded", index);
                return Ok(());
            }
            let window = summary
                .windows
                .iter()
                .map(|w| &w.window)
                .find(|w| w.index == index)
                .ok_or_else(|| {
                    TrackerError::Validation(format!(
                        "cycle {} has no window {} (1-{})",
                        summary.cycle.label, index, summary.cycle_window_count
                    ))
                })?;
            let id = db::add_window_exclusion(&conn, &exclusion_for(benefit_id, window))?;
            println!("Excluded '{}' (exclusion ID {})", window.label, id);
        }

        Commands::RestoreWindow { id } => {
            if db::remove_window_exclusion(&conn, id)? {
                println!("Restored window for exclusion {}", id);
            } else {
                println!("No window exclusion found with ID {}", id);
            }
        }

        Commands::Summary { card_id } => {
            let snapshot = fetch::load_card_snapshot(cli.db.clone(), card_id).await?;
            let summary = summarize_card(&snapshot, today);

            println!("{}, cycle {}", summary.name, summary.cycle.label);
            if summary.benefits.is_empty() {
                println!("No benefits yet. Add one with: cc-tracker add-benefit --card-id {} ...", card_id);
            } else {
                println!("{}", Table::new(rows::<BenefitSummaryRow, _>(&summary.benefits)));
            }
            println!(
                "Potential ${:.2} | Utilized ${:.2} | Fee ${:.2} | Net ${:.2}",
                summary.potential_value, summary.utilized_value, summary.annual_fee, summary.net_position
            );
        }

        Commands::History {
            card_id,
            since,
            oldest_first,
            detail,
        } => {
            let snapshot = fetch::load_card_snapshot(cli.db.clone(), card_id).await?;
            let options = HistoryOptions {
                floor: since,
                newest_first: !oldest_first,
            };
            let history = build_card_history(&snapshot, today, options);

            println!("{}", Table::new(rows::<CycleReportRow, _>(&history.cycles)));
            if detail {
                for report in &history.cycles {
                    println!("\n{}", report.cycle.label);
                    println!("{}", Table::new(rows::<BenefitCycleRow, _>(&report.benefits)));
                }
            }
            if !history.untracked_redemption_ids.is_empty() {
                println!(
                    "{} redemption(s) fall outside every tracked window: {:?}",
                    history.untracked_redemption_ids.len(),
                    history.untracked_redemption_ids
                );
            }
        }
    }

    Ok(())
}
