//! CLI output formatting
//!
//! Provides human-readable terminal display for poll execution,
//! replacing raw JSON output with formatted, colored output.

pub mod display;

pub use display::TickDisplay;
