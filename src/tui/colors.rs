//! Color constants for the terminal user interface.

use ratatui::style::Color;

/// Headers, selected tab and the status bar.
pub const PRIMARY: Color = Color::Rgb(30, 136, 229);
/// Keypad and login backdrop.
pub const BRAND_YELLOW: Color = Color::Rgb(255, 214, 10);
/// Fully processed phases and success notices.
pub const SUCCESS: Color = Color::Rgb(76, 175, 80);
/// Error notices and skipped tasks.
pub const ERROR: Color = Color::Rgb(255, 64, 64);
/// Text drawn on the yellow backdrop.
pub const INK: Color = Color::Rgb(20, 20, 20);
