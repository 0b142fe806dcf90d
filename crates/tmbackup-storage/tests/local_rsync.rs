//! Runs the real rsync binary against local directories: `cargo test -- --ignored`.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

use tmbackup_core::address::Destination;
use tmbackup_core::error::BackupError;
use tmbackup_core::exec::SystemRunner;
use tmbackup_core::snapshot::{scan_local, Timestamp};
use tmbackup_storage::{ensure_computer_dir, list_remote, prune, Rsync, Transfer};

const T1: &str = "2020-01-01-000000";
const T2: &str = "2020-02-01-000000";
const T3: &str = "2020-03-01-000000";

fn require_rsync() {
    let found = Command::new("rsync")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    assert!(found, "rsync is not installed; these tests need the real binary");
}

fn ts(value: &str) -> Timestamp {
    Timestamp::parse(value).unwrap()
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn names(timestamps: &[Timestamp]) -> Vec<&str> {
    timestamps.iter().map(Timestamp::as_str).collect()
}

#[test]
#[ignore = "needs the rsync binary; run with --ignored"]
fn second_snapshot_hard_links_unchanged_files() {
    require_rsync();
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("tm");
    let dest_root = tmp.path().join("dest");
    fs::create_dir_all(&dest_root).unwrap();

    write(&source.join("C").join(T1).join("HD/same.txt"), "unchanged");
    write(&source.join("C").join(T1).join("HD/changed.txt"), "v1");
    fs::create_dir_all(source.join("C").join(T2).join("HD")).unwrap();
    fs::hard_link(
        source.join("C").join(T1).join("HD/same.txt"),
        source.join("C").join(T2).join("HD/same.txt"),
    )
    .unwrap();
    write(&source.join("C").join(T2).join("HD/changed.txt"), "version 2");

    let destination = Destination::parse(dest_root.to_str().unwrap());
    let rsync = Rsync::default();
    let (t1, t2) = (ts(T1), ts(T2));

    ensure_computer_dir(&SystemRunner, &rsync, &destination, "C").unwrap();
    Transfer {
        source_root: &source,
        computer: "C",
        timestamp: &t1,
        previous: None,
        destination: &destination,
    }
    .run(&SystemRunner, &rsync)
    .unwrap();
    Transfer {
        source_root: &source,
        computer: "C",
        timestamp: &t2,
        previous: Some(&t1),
        destination: &destination,
    }
    .run(&SystemRunner, &rsync)
    .unwrap();

    let first = dest_root.join("C").join(T1).join("HD");
    let second = dest_root.join("C").join(T2).join("HD");
    assert_eq!(fs::read_to_string(second.join("changed.txt")).unwrap(), "version 2");
    assert_eq!(fs::read_to_string(first.join("changed.txt")).unwrap(), "v1");
    assert_eq!(
        fs::metadata(first.join("same.txt")).unwrap().ino(),
        fs::metadata(second.join("same.txt")).unwrap().ino()
    );
    assert_ne!(
        fs::metadata(first.join("changed.txt")).unwrap().ino(),
        fs::metadata(second.join("changed.txt")).unwrap().ino()
    );

    let catalog = scan_local(&dest_root).unwrap();
    assert_eq!(names(&catalog["C"]), [T1, T2]);
}

#[test]
#[ignore = "needs the rsync binary; run with --ignored"]
fn prune_removes_only_the_named_snapshot() {
    require_rsync();
    let tmp = tempdir().unwrap();
    let dest_root = tmp.path().join("dest");
    for t in [T1, T2, T3] {
        write(&dest_root.join("C").join(t).join("HD/deep/file.txt"), t);
    }
    write(&dest_root.join("D").join(T2).join("HD/file.txt"), "other computer");

    let destination = Destination::parse(dest_root.to_str().unwrap());
    let rsync = Rsync::default();

    prune(&SystemRunner, &rsync, &destination, "C", &ts(T2)).unwrap();

    let listed = list_remote(&SystemRunner, &rsync, &destination, "C").unwrap();
    assert_eq!(names(&listed), [T1, T3]);
    let catalog = scan_local(&dest_root).unwrap();
    assert_eq!(names(&catalog["C"]), [T1, T3]);
    assert_eq!(names(&catalog["D"]), [T2]);
    for t in [T1, T3] {
        let file = dest_root.join("C").join(t).join("HD/deep/file.txt");
        assert_eq!(fs::read_to_string(file).unwrap(), t);
    }

    // Already gone: still succeeds and changes nothing.
    prune(&SystemRunner, &rsync, &destination, "C", &ts(T2)).unwrap();
    let listed = list_remote(&SystemRunner, &rsync, &destination, "C").unwrap();
    assert_eq!(names(&listed), [T1, T3]);
}

#[test]
#[ignore = "needs the rsync binary; run with --ignored"]
fn listing_a_computer_never_backed_up_is_empty() {
    require_rsync();
    let tmp = tempdir().unwrap();
    let destination = Destination::parse(tmp.path().to_str().unwrap());
    let listed = list_remote(&SystemRunner, &Rsync::default(), &destination, "Nobody").unwrap();
    assert!(listed.is_empty());
}

#[test]
#[ignore = "needs the rsync binary; run with --ignored"]
fn missing_source_snapshot_is_a_transfer_failure() {
    require_rsync();
    let tmp = tempdir().unwrap();
    let dest_root = tmp.path().join("dest");
    fs::create_dir_all(dest_root.join("C")).unwrap();
    let destination = Destination::parse(dest_root.to_str().unwrap());
    let t1 = ts(T1);

    let err = Transfer {
        source_root: &tmp.path().join("missing"),
        computer: "C",
        timestamp: &t1,
        previous: None,
        destination: &destination,
    }
    .run(&SystemRunner, &Rsync::default())
    .unwrap_err();
    assert!(matches!(
        err,
        BackupError::TransferFailure { ref computer, .. } if computer == "C"
    ));
}
