pub mod actions;
pub mod balance;
pub mod calendar;
#[cfg(feature = "serde")]
pub mod config;
pub mod error;
pub mod loan;
pub mod schedule;
pub mod status;
pub mod store;
pub mod summary;
