pub mod common;
pub mod entity;
pub mod outcome;
pub mod partition;
pub mod submission;
