use super::{
    colorize_state, json_pretty, print_section, spin_fail, spin_ok, spinner, EXIT_SUCCESS,
    EXIT_UNRESOLVED,
};
use cfgmend_core::{Pipeline, PipelineResult, RunOptions};
use std::path::Path;

pub fn run(
    manifest: &Path,
    options: &RunOptions,
    fail_on_unresolved: bool,
    json: bool,
) -> Result<u8, String> {
    let pipeline = Pipeline::load(manifest).map_err(|e| e.to_string())?;

    if std::env::var("CFGMEND_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = cfgmend_runtime::check_pipeline_prereqs(
            &pipeline.manifest().oracle.program,
            pipeline.manifest().metadata.program.as_deref(),
            &pipeline.tree_dir(),
        );
        if !missing.is_empty() {
            return Err(cfgmend_runtime::format_missing(&missing));
        }
    }

    let pb = if json {
        None
    } else {
        Some(spinner("reconciling configuration..."))
    };
    let result = match pipeline.run(options) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("reconciliation {}", r.outcome.state));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "reconciliation aborted");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&result.document)?);
    } else {
        print_human(&result);
    }

    if fail_on_unresolved && !result.outcome.converged() {
        return Ok(EXIT_UNRESOLVED);
    }
    Ok(EXIT_SUCCESS)
}

fn print_human(result: &PipelineResult) {
    let report = &result.outcome.report;
    print_section("Added", report.added.iter().map(|k| (k, None)));
    print_section("Removed", report.removed.iter().map(|k| (k, None)));
    print_section("Restored", report.restored.iter().map(|k| (k, None)));
    print_section(
        "Unresolved",
        report
            .unresolved
            .iter()
            .map(|(k, reason)| (k, Some(reason.to_string()))),
    );
    println!();
    println!("state: {}", colorize_state(&result.outcome.state.to_string()));
    if let Some(err) = &result.outcome.recheck_error {
        println!("recheck error: {err}");
    }
    println!("config: {}", result.outputs.config.display());
    println!("report: {}", result.outputs.report.display());
}
