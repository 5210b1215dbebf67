use super::{EXIT_FAILURE, EXIT_SUCCESS};
use cfgmend_core::{check_idempotence, Pipeline, WorkLock};
use std::path::Path;

pub fn run(manifest: &Path, check_idempotent: bool, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let pipeline = match Pipeline::load(manifest) {
        Ok(p) => {
            checks.push(Check::pass(
                "manifest",
                &format!("Manifest {} is valid", manifest.display()),
            ));
            p
        }
        Err(e) => {
            checks.push(Check::fail("manifest", &format!("Cannot load manifest: {e}")));
            return print_results(&checks, false, json_output);
        }
    };

    check_prereqs(&pipeline, &mut checks, &mut all_pass);
    check_layers(&pipeline, &mut checks, &mut all_pass);

    let tree = pipeline.tree_dir();
    if tree.is_dir() {
        checks.push(Check::pass(
            "tree",
            &format!("Build tree {} exists", tree.display()),
        ));
        check_lock(&tree, &mut checks, &mut all_pass);
    } else {
        all_pass = false;
        checks.push(Check::fail(
            "tree",
            &format!("Build tree {} not found", tree.display()),
        ));
    }

    match pipeline.metadata() {
        Ok(svc) => checks.push(Check::pass(
            "metadata",
            &format!("Metadata service '{}' ready", svc.name()),
        )),
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail("metadata", &format!("Metadata service: {e}")));
        }
    }

    if check_idempotent && all_pass {
        check_oracle_idempotence(&pipeline, &mut checks, &mut all_pass);
    }

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(pipeline: &Pipeline, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let m = pipeline.manifest();
    let missing = cfgmend_runtime::check_pipeline_prereqs(
        &m.oracle.program,
        m.metadata.program.as_deref(),
        &pipeline.tree_dir(),
    );
    if missing.is_empty() {
        checks.push(Check::pass(
            "prereqs",
            &format!("Normalizer '{}' available", m.oracle.program),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "prereqs",
            &cfgmend_runtime::format_missing(&missing),
        ));
    }
}

fn check_layers(pipeline: &Pipeline, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layers = pipeline.manifest().resolved_layers(pipeline.base_dir());
    let absent: Vec<String> = layers
        .iter()
        .filter(|l| !l.path.is_file())
        .map(|l| format!("{} ({})", l.name, l.path.display()))
        .collect();
    if absent.is_empty() {
        checks.push(Check::pass(
            "layers",
            &format!("All {} layers present", layers.len()),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "layers",
            &format!("Missing layers: {}", absent.join(", ")),
        ));
    }
}

fn check_lock(tree: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match WorkLock::try_acquire(&WorkLock::path_for(tree)) {
        Ok(Some(_)) => checks.push(Check::pass("lock", "Tree lock is free")),
        Ok(None) => checks.push(Check::warn(
            "lock",
            "Tree lock is held by another run",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("lock", &format!("Cannot check tree lock: {e}")));
        }
    }
}

fn check_oracle_idempotence(pipeline: &Pipeline, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let result = pipeline.merge().map_err(|e| e.to_string()).and_then(|merged| {
        let _lock = WorkLock::for_tree(&pipeline.tree_dir()).map_err(|e| e.to_string())?;
        check_idempotence(&pipeline.oracle(), &merged.snapshot).map_err(|e| e.to_string())
    });
    match result {
        Ok(drift) if drift.is_empty() => checks.push(Check::pass(
            "idempotence",
            "Normalizer is stable on its own output",
        )),
        Ok(drift) => {
            *all_pass = false;
            checks.push(Check::fail(
                "idempotence",
                &format!(
                    "Second normalization drifted: {} added, {} removed",
                    drift.added.len(),
                    drift.removed.len()
                ),
            ));
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "idempotence",
                &format!("Idempotence check failed: {e}"),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("cfgmend doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                _ => "⚠",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn pass(name: &'static str, message: &str) -> Self {
        Self {
            name,
            status: "pass",
            message: message.to_owned(),
        }
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self {
            name,
            status: "fail",
            message: message.to_owned(),
        }
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self {
            name,
            status: "warn",
            message: message.to_owned(),
        }
    }
}
