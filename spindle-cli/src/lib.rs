//! Instruction-tape runner for Spindle.
//!
//! Scripts are parsed by [`script`], executed by the [`machine`] against a
//! database and the resulting stack is printed by [`output`].

pub mod machine;
pub mod output;
pub mod script;

pub use machine::{is_known_operation, MachineError, Rendered, StackEntry, StackMachine};
pub use output::OutputFormat;
pub use script::{Instruction, Operand, Script};

use anyhow::{Context, Result};
use spindle_client::Database;

/// Runs `script` on `db` with a fresh machine and returns the final stack.
pub fn run_script(db: Database, script: &Script) -> Result<Vec<StackEntry>> {
    let mut machine = StackMachine::new(db).context("Failed to create transaction")?;
    machine.run(&script.instructions)?;
    Ok(machine.finish())
}
