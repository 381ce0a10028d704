pub mod checker;
pub mod ledger;
pub mod monitor;
pub mod notifier;
