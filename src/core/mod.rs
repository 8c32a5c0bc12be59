pub mod catalog;
pub mod ledger;
pub mod processor;
pub mod report;
pub mod scheduler;
pub mod storage;
pub mod task;
