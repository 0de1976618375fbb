pub mod admission;
pub mod auth;
pub mod inference;
pub mod ledger;
pub mod naming;
pub mod orchestrator;
pub mod queue;
pub mod storage;
pub mod validation;
pub mod watchdog;
pub mod worker;
