pub mod account;
pub mod sweeper;

pub use account::{AccountDeletion, AccountDeletionReport};
pub use sweeper::{SweepReport, Sweeper, ValidUsers};
