// mkc-cli: Clap commands, UI helpers, and output rendering.
// Depends on mkc-core and mkc-runtime.

pub mod commands;
pub mod display;
pub mod logging;
pub mod output;
pub mod ui;

pub use commands::run;
