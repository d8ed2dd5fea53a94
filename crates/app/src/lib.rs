pub mod cli;
pub mod tracking;
