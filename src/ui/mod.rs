pub mod layout;
pub mod renderer;
pub mod terminal;

pub use terminal::run_ui;

use crate::registry::Metric;

/// Operator-side view state, independent of the session
#[derive(Debug, Clone)]
pub struct ConsoleView {
    pub metric: Metric,
    /// Last operator action result, shown in the footer
    pub message: Option<String>,
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self {
            metric: Metric::Rssi,
            message: None,
        }
    }
}
