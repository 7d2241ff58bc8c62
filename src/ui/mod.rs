//! Terminal output for the CLI
//!
//! Uses `cliclack` framing and `indicatif` progress in a terminal, plain
//! lines when piped or running under CI.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, step_error_detail, step_info, step_ok, step_ok_detail,
    step_warn_hint,
};
pub use progress::{PrecacheProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, CampusTheme};
