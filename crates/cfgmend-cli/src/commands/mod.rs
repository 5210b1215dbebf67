pub mod deps;
pub mod diff;
pub mod doctor;
pub mod merge;
pub mod reconcile;

use cfgmend_schema::ConfigKey;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INPUT_ERROR: u8 = 2;
pub const EXIT_ORACLE_ERROR: u8 = 3;
pub const EXIT_UNRESOLVED: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "converged" => Style::new().green().apply_to(state).to_string(),
        "failed" => Style::new().red().bold().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Print one labeled key section in the report layout.
pub fn print_section<'a>(
    title: &str,
    lines: impl IntoIterator<Item = (&'a ConfigKey, Option<String>)>,
) {
    use console::Style;
    println!("{}", Style::new().bold().apply_to(format!("{title}:")));
    for (key, note) in lines {
        match note {
            Some(n) => println!("  {key} ({})", Style::new().yellow().apply_to(n)),
            None => println!("  {key}"),
        }
    }
}
