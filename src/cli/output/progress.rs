//! Spinners for long-running commands.
//!
//! Spinners draw to stderr so JSON on stdout stays parseable, and are hidden
//! entirely in JSON mode.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::future::Future;
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg} ({elapsed})";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";
const TICK: Duration = Duration::from_millis(100);

/// Spinner for a command step; hidden in JSON mode.
///
/// # Example
/// ```
/// use sce_closeloop::cli::output::progress::command_spinner;
///
/// let spinner = command_spinner(true, "Draining queue...");
/// assert!(spinner.is_hidden());
/// spinner.finish_and_clear();
/// ```
pub fn command_spinner(json_mode: bool, message: impl Into<String>) -> ProgressBar {
    let spinner = if json_mode {
        ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
    } else {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            spinner.set_style(style.tick_chars(SPINNER_CHARS));
        }
        spinner.enable_steady_tick(TICK);
        spinner
    };
    spinner.set_message(message.into());
    spinner
}

/// Await `work` behind a spinner that is cleared before the result is
/// printed.
pub async fn with_spinner<F, T>(json_mode: bool, message: impl Into<String>, work: F) -> T
where
    F: Future<Output = T>,
{
    let spinner = command_spinner(json_mode, message);
    let result = work.await;
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spinner_hidden_in_json_mode() {
        let spinner = command_spinner(true, "Running batch");
        assert!(spinner.is_hidden());
        assert_eq!(spinner.message(), "Running batch");
        spinner.finish_and_clear();
        assert!(spinner.is_finished());
    }

    #[tokio::test]
    async fn test_with_spinner_returns_work_result() {
        let value = with_spinner(true, "Pruning", async { 7 }).await;
        assert_eq!(value, 7);
    }
}
