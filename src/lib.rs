//! Annual-fee cycle and benefit-window tracking for credit cards.

pub mod aggregate;
pub mod classify;
pub mod cycle;
pub mod date_math;
pub mod db;
pub mod display;
pub mod error;
pub mod exclusion;
pub mod fetch;
pub mod history;
pub mod models;
pub mod summary;
pub mod window;

pub use error::{Result, TrackerError};
