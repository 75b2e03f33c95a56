//! Forgeloop build - verify and repair a generated project tree
//!
//! - [`SystemRunner`]: external commands with a hard timeout, plus an idle
//!   watchdog variant for test runs
//! - [`repair`]: ordered diagnostic rules and root-confined placeholder repairs
//! - [`RepairLoop`]: bounded analyze / repair / test rounds

pub mod command;
pub mod compile_loop;
pub mod error;
pub mod repair;
pub mod runner;
pub mod toolchain;

pub use command::{CommandOutcome, CommandResult, CommandSpec, KILLED_EXIT_CODE};
pub use compile_loop::{
    CompileReport, CompileRound, RepairLoop, RepairLoopOptions, run_repair_loop,
};
pub use error::{BuildError, Result};
pub use repair::{ProjectLayout, RepairAction, RepairPass, RepairRule, Repairer};
pub use runner::{CommandRunner, SystemRunner};
pub use toolchain::Toolchain;
