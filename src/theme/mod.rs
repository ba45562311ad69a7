//! Theme system for human-mode output.

use console::Style;

/// Visual theme for human-mode output.
///
/// Centralizes styles for consistent rendering.
#[derive(Debug, Clone)]
pub struct LayoutTheme {
    pub accent: Style,
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    pub muted: Style,

    pub header: Style,
    pub label: Style,
    pub value: Style,
    pub slot_index: Style,
    pub active_marker: Style,
}

impl Default for LayoutTheme {
    fn default() -> Self {
        Self {
            accent: Style::new().blue(),
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warning: Style::new().yellow(),
            muted: Style::new().dim(),
            header: Style::new().blue().bold().underlined(),
            label: Style::new().dim(),
            value: Style::new().bold(),
            slot_index: Style::new().yellow().bold(),
            active_marker: Style::new().green().bold(),
        }
    }
}

impl LayoutTheme {
    /// Plain styles for `--no-color` and pipes.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            accent: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warning: Style::new(),
            muted: Style::new(),
            header: Style::new(),
            label: Style::new(),
            value: Style::new(),
            slot_index: Style::new(),
            active_marker: Style::new(),
        }
    }
}
