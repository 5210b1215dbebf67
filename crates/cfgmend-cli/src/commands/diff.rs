use super::{json_pretty, EXIT_SUCCESS};
use cfgmend_schema::{diff, ConfigSnapshot};
use std::path::Path;

pub fn run(before: &Path, after: &Path, json: bool) -> Result<u8, String> {
    let read = |p: &Path| {
        ConfigSnapshot::read_from_file(p, 0)
            .map(|parsed| parsed.snapshot)
            .map_err(|e| format!("failed to read {}: {e}", p.display()))
    };
    let report = diff(&read(before)?, &read(after)?);

    if json {
        println!("{}", json_pretty(&report)?);
    } else if report.is_empty() {
        println!("no feature changes");
    } else {
        for key in &report.added {
            println!("  + {key}");
        }
        for key in &report.removed {
            println!("  - {key}");
        }
    }
    Ok(EXIT_SUCCESS)
}
