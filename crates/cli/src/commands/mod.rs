//! Command implementations.

mod demo;
mod run;
mod validate;

pub use run::run_collector;
pub use validate::run_validate;
