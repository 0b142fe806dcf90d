use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

const T1: &str = "2020-01-01-000000";
const T2: &str = "2020-02-01-000000";
const T3: &str = "2021-01-01-000000";

fn require_rsync() {
    let found = Command::new("rsync")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    assert!(found, "rsync is not installed; these tests need the real binary");
}

fn tmbackup(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tmbackup"))
        .args(args)
        .output()
        .unwrap()
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn write_source(root: &Path) {
    for (path, contents) in [
        (format!("A/{T1}/HD/notes.txt"), "first"),
        (format!("A/{T2}/HD/notes.txt"), "second"),
        (format!("B/{T3}/HD/notes.txt"), "other"),
    ] {
        let file = root.join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, contents).unwrap();
    }
}

#[test]
fn list_source_prints_catalog_in_order() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path());

    let output = tmbackup(&["list", "source", "--mounted", tmp.path().to_str().unwrap()]);

    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        vec![format!("A/{T1}"), format!("A/{T2}"), format!("B/{T3}")]
    );
}

#[test]
fn backup_requires_a_destination() {
    let tmp = tempdir().unwrap();
    let config_path = tmp.path().join("config.toml");
    fs::write(&config_path, "[rsync]\nextra_args = []\n").unwrap();

    let output = tmbackup(&[
        "--config",
        config_path.to_str().unwrap(),
        "backup",
        "--mounted",
        tmp.path().to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("destination required"));
}

#[test]
fn prune_rejects_malformed_timestamp() {
    let tmp = tempdir().unwrap();
    let output = tmbackup(&[
        "prune",
        "A",
        "yesterday",
        "--destination",
        tmp.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid snapshot timestamp"));
}

#[test]
#[ignore = "needs the rsync binary; run with --ignored"]
fn backup_then_prune_round() {
    require_rsync();
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("tm");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&dest).unwrap();
    write_source(&source);

    let config_path = tmp.path().join("config.toml");
    fs::write(
        &config_path,
        format!("[destination]\nroot = \"{}\"\n", dest.display()),
    )
    .unwrap();
    let config = config_path.to_str().unwrap();
    let mounted = source.to_str().unwrap();

    let output = tmbackup(&["--config", config, "backup", "--mounted", mounted]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output), vec!["3 transferred, 0 refreshed, 0 up to date, 0 pruned"]);
    assert_eq!(
        fs::read_to_string(dest.join("A").join(T2).join("HD/notes.txt")).unwrap(),
        "second"
    );

    // Second run only re-copies the newest snapshot of each computer.
    let output = tmbackup(&["--config", config, "backup", "--mounted", mounted]);
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        vec!["0 transferred, 2 refreshed, 1 up to date, 0 pruned"]
    );

    // The oldest snapshot expires from the Time Machine volume.
    fs::remove_dir_all(source.join("A").join(T1)).unwrap();
    let output = tmbackup(&[
        "--config", config, "backup", "--mounted", mounted, "--computer", "A", "--prune",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["0 transferred, 1 refreshed, 0 up to date, 1 pruned"]);

    let output = tmbackup(&["--config", config, "list", "destination", "A"]);
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec![format!("A/{T2}")]);

    let output = tmbackup(&["--config", config, "prune", "B", T3]);
    assert!(output.status.success());
    let output = tmbackup(&["--config", config, "list", "destination", "B"]);
    assert!(output.status.success());
    assert!(stdout_lines(&output).is_empty());
}
