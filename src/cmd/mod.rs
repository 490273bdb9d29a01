//! CLI command implementations.
//!
//! | Module    | Command handled                         |
//! |-----------|------------------------------------------|
//! | `run`     | `run` — grade a roster end to end       |
//! | `check`   | `check` — verify the environment        |
//! | `cleanup` | `cleanup` — remove student workspaces   |
//! | `summary` | `summary` — print roster statistics     |

pub mod check;
pub mod cleanup;
pub mod run;
pub mod summary;

pub use check::cmd_check;
pub use cleanup::cmd_cleanup;
pub use run::{RunArgs, cmd_run};
pub use summary::cmd_summary;
