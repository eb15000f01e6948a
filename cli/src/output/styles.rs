//! Output styles using owo-colors stylesheet pattern

use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success messages (green)
    pub success: Style,
    /// Warning messages (yellow)
    pub warning: Style,
    /// Error messages (red)
    pub error: Style,
    /// Info messages and in-progress steps (cyan)
    pub info: Style,
    /// Dimmed/secondary text
    pub dim: Style,
    /// Headers/section titles
    pub header: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().cyan();
        self.dim = Style::new().dimmed();
        self.header = Style::new().bold();
    }

    /// Style for a VM power state.
    #[must_use]
    pub fn state(&self, state: devbox_common::VmState) -> Style {
        use devbox_common::VmState;
        match state {
            VmState::Running => self.success,
            VmState::Stopped => self.dim,
            VmState::ShuttingDown | VmState::Terminated => self.error,
            VmState::Pending | VmState::Stopping => self.warning,
        }
    }
}
