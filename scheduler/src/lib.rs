//! Quota-aware task scheduler around an external coding-assistant CLI.
//!
//! Tasks live in a flat file (`.scheduler/tasks.toml`) and are executed
//! strictly sequentially, each in an isolated workspace, by shelling
//! out to the assistant tool. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task model, state machine,
//!   output parsing, change detection). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting operations (task store, workspaces,
//!   process execution, the assistant adapter). The assistant is always
//!   an injected trait object, never an ambient global, so tests swap in
//!   scripted doubles.
//!
//! [`flow`] coordinates core logic with I/O to implement one scheduler
//! run.

pub mod core;
pub mod exit_codes;
pub mod flow;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
