//! Shell data model: parsed command lines and the job table.

pub mod job;
pub mod job_table;
pub mod parser;
