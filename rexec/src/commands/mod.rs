pub mod batch;
pub mod check;
mod common;
pub mod exec;
pub mod run;
