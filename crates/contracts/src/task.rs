//! Task - coordinator execution unit
//!
//! Long-running work (draining a dispatcher, background coordination) is
//! expressed as a task that runs until done and reports failure as an error.

use crate::ContractError;

/// Unit of executable work
#[trait_variant::make(Task: Send)]
pub trait LocalTask {
    /// Execute the task
    ///
    /// # Errors
    /// Returns the error that stopped the task
    async fn execute(&mut self) -> Result<(), ContractError>;
}
