//! CLI subprocess integration tests.
//!
//! These tests invoke the `cfgmend` binary against a scratch project whose
//! build tree normalizes with a small shell script.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn cfgmend_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cfgmend"));
    cmd.env_remove("CFGMEND_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// drops luci-app-bar unless libbaz is on, drops luci-app-qux unless libqux is on
const NORMALIZE_SH: &str = r#"set -e
if ! grep -q '^CONFIG_PACKAGE_libbaz=y$' .config; then
  sed -i 's/^CONFIG_PACKAGE_luci-app-bar=y$/# CONFIG_PACKAGE_luci-app-bar is not set/' .config
fi
if ! grep -q '^CONFIG_PACKAGE_libqux=y$' .config; then
  sed -i 's/^CONFIG_PACKAGE_luci-app-qux=y$/# CONFIG_PACKAGE_luci-app-qux is not set/' .config
fi
"#;

const PACKAGEINFO: &str = "\
Package: luci-app-bar
Depends: +libbaz @TARGET_x86
@@
";

fn write_project(dir: &Path, layers: &[(&str, &str)]) -> PathBuf {
    let tree = dir.join("openwrt");
    fs::create_dir_all(tree.join("tmp")).unwrap();
    fs::write(tree.join("normalize.sh"), NORMALIZE_SH).unwrap();
    fs::write(tree.join("tmp/.packageinfo"), PACKAGEINFO).unwrap();

    let mut manifest = String::from(
        "manifest_version = 1\n\n[tree]\npath = \"openwrt\"\n\n\
         [oracle]\nprogram = \"/bin/sh\"\nargs = [\"normalize.sh\"]\ntimeout_secs = 30\n\n\
         [metadata]\nkind = \"index\"\nindex = \"tmp/.packageinfo\"\n",
    );
    for (name, content) in layers {
        let file = format!("{name}.config");
        fs::write(dir.join(&file), content).unwrap();
        manifest.push_str(&format!("\n[[layers]]\nname = \"{name}\"\npath = \"{file}\"\n"));
    }
    let path = dir.join("cfgmend.toml");
    fs::write(&path, manifest).unwrap();
    path
}

#[test]
fn cli_version_exits_zero() {
    let output = cfgmend_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("cfgmend"));
}

#[test]
fn cli_help_lists_commands() {
    let output = cfgmend_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["merge", "diff", "reconcile", "deps", "doctor"] {
        assert!(out.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn merge_prints_last_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.config");
    let b = dir.path().join("b.config");
    fs::write(&a, "CONFIG_PACKAGE_a=y\nCONFIG_PACKAGE_b=y\n").unwrap();
    fs::write(&b, "# CONFIG_PACKAGE_a is not set\n").unwrap();

    let output = cfgmend_bin().arg("merge").arg(&a).arg(&b).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "# CONFIG_PACKAGE_a is not set\nCONFIG_PACKAGE_b=y\n"
    );
}

#[test]
fn merge_json_lists_required_set() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.config");
    fs::write(&a, "CONFIG_PACKAGE_a=y\nCONFIG_TARGET_x86=y\nCONFIG_PACKAGE_b=m\n").unwrap();
    let out = dir.path().join("merged.config");

    let output = cfgmend_bin()
        .args(["--json", "merge"])
        .arg(&a)
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        json["required"],
        serde_json::json!(["CONFIG_PACKAGE_a", "CONFIG_PACKAGE_b"])
    );
    assert!(out.exists());
}

#[test]
fn merge_missing_layer_exits_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = cfgmend_bin()
        .arg("merge")
        .arg(dir.path().join("nope.config"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("layer error"));
}

#[test]
fn diff_reports_feature_changes() {
    let dir = tempfile::tempdir().unwrap();
    let before = dir.path().join("before.config");
    let after = dir.path().join("after.config");
    fs::write(&before, "CONFIG_PACKAGE_a=y\nCONFIG_PACKAGE_b=y\n").unwrap();
    fs::write(
        &after,
        "CONFIG_PACKAGE_a=y\n# CONFIG_PACKAGE_b is not set\nCONFIG_PACKAGE_c=y\n",
    )
    .unwrap();

    let output = cfgmend_bin()
        .args(["--json", "diff"])
        .arg(&before)
        .arg(&after)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["added"], serde_json::json!(["CONFIG_PACKAGE_c"]));
    assert_eq!(json["removed"], serde_json::json!(["CONFIG_PACKAGE_b"]));
}

#[test]
fn reconcile_restores_dropped_feature() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(
        dir.path(),
        &[
            ("base", "CONFIG_PACKAGE_luci-app-foo=y\n"),
            ("extra", "CONFIG_PACKAGE_luci-app-bar=y\n"),
        ],
    );

    let output = cfgmend_bin()
        .arg("reconcile")
        .arg(&manifest)
        .arg("--fail-on-unresolved")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Restored:\n  CONFIG_PACKAGE_luci-app-bar\n"));

    let final_config = fs::read_to_string(dir.path().join("out/final.config")).unwrap();
    assert!(final_config.contains("CONFIG_PACKAGE_luci-app-bar=y"));
    assert!(final_config.contains("CONFIG_PACKAGE_libbaz=y"));
    let report = fs::read_to_string(dir.path().join("out/reconcile-report.txt")).unwrap();
    assert!(report.starts_with("Added:\n  CONFIG_PACKAGE_libbaz\n"));
}

#[test]
fn reconcile_unknown_package_is_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "CONFIG_PACKAGE_luci-app-qux=y\n")]);
    let report_path = dir.path().join("report.json");

    let output = cfgmend_bin()
        .arg("reconcile")
        .arg(&manifest)
        .arg("--report")
        .arg(&report_path)
        .args(["--report-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["state"], "failed");
    assert_eq!(
        json["unresolved"]["CONFIG_PACKAGE_luci-app-qux"],
        "metadata-unknown"
    );

    let strict = cfgmend_bin()
        .arg("reconcile")
        .arg(&manifest)
        .arg("--fail-on-unresolved")
        .output()
        .unwrap();
    assert_eq!(strict.status.code(), Some(4));
}

#[test]
fn reconcile_json_prints_document() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "CONFIG_PACKAGE_luci-app-bar=y\n")]);

    let output = cfgmend_bin()
        .args(["--json", "reconcile"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["state"], "converged");
    assert_eq!(
        json["pulled_in"]["CONFIG_PACKAGE_luci-app-bar"],
        serde_json::json!(["CONFIG_PACKAGE_libbaz"])
    );
}

#[test]
fn reconcile_accepts_tree_relative_program() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "CONFIG_PACKAGE_luci-app-bar=y\n")]);
    let wrapper = dir.path().join("openwrt/defconfig.sh");
    fs::write(&wrapper, "#!/bin/sh\nexec sh normalize.sh\n").unwrap();
    fs::set_permissions(&wrapper, fs::Permissions::from_mode(0o755)).unwrap();
    let text = fs::read_to_string(&manifest).unwrap().replace(
        "program = \"/bin/sh\"\nargs = [\"normalize.sh\"]",
        "program = \"./defconfig.sh\"\nargs = []",
    );
    fs::write(&manifest, text).unwrap();

    let output = cfgmend_bin().arg("reconcile").arg(&manifest).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!stderr(&output).contains("missing prerequisites"));
}

#[test]
fn reconcile_oracle_failure_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "CONFIG_PACKAGE_a=y\n")]);
    fs::write(dir.path().join("openwrt/normalize.sh"), "exit 1\n").unwrap();

    let output = cfgmend_bin().arg("reconcile").arg(&manifest).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(!dir.path().join("out/final.config").exists());
}

#[test]
fn reconcile_invalid_manifest_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfgmend.toml");
    fs::write(&path, "manifest_version = 7\n[tree]\npath = \"x\"\n").unwrap();

    let output = cfgmend_bin().arg("reconcile").arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("manifest error"));
}

#[test]
fn deps_resolves_feature_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "")]);

    let output = cfgmend_bin()
        .args(["deps", "luci-app-bar"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("+libbaz -> CONFIG_PACKAGE_libbaz"));
    assert!(out.contains("@TARGET_x86 (condition, not forced)"));

    let unknown = cfgmend_bin()
        .args(["deps", "luci-app-qux"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert_eq!(unknown.status.code(), Some(1));
}

#[test]
fn doctor_checks_project() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "CONFIG_PACKAGE_a=y\n")]);

    let output = cfgmend_bin()
        .args(["--json", "doctor"])
        .arg(&manifest)
        .arg("--check-idempotence")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stdout(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["healthy"], true);
    let names: Vec<&str> = json["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"idempotence"));
    assert!(names.contains(&"lock"));
}

#[test]
fn doctor_flags_missing_layer() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_project(dir.path(), &[("base", "")]);
    fs::remove_file(dir.path().join("base.config")).unwrap();

    let output = cfgmend_bin().arg("doctor").arg(&manifest).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Missing layers: base"));
}
