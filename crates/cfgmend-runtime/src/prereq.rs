use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// Whether `program` can be spawned from `work_dir`: an existing path
/// (relative paths resolve against `work_dir`), or a name on `PATH`.
pub fn program_available(program: &str, work_dir: &Path) -> bool {
    if program.contains('/') {
        return work_dir.join(program).is_file();
    }
    Command::new("which")
        .arg(program)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check the external programs a pipeline run needs, as seen from the build
/// tree both commands run in.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_pipeline_prereqs(
    oracle_program: &str,
    metadata_program: Option<&str>,
    tree_dir: &Path,
) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !program_available(oracle_program, tree_dir) {
        missing.push(MissingPrereq {
            name: oracle_program.to_owned(),
            purpose: "configuration normalizer",
            install_hint: "install the build tree's host tools (make, ncurses, perl), or point oracle.program at the normalizer",
        });
    }

    if let Some(program) = metadata_program {
        if !program_available(program, tree_dir) {
            missing.push(MissingPrereq {
                name: program.to_owned(),
                purpose: "package metadata lookups",
                install_hint: "point metadata.program at an executable, or use kind = \"index\"",
            });
        }
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ncfgmend shells out to these tools to normalize configurations.");
    msg
}
