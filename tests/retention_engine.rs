//! Retention runs against real artifact directories.

mod common;

use std::fs;
use std::path::Path;

use mirror_warden::prelude::*;
use mirror_warden::retention::artifacts::ArtifactKind;
use mirror_warden::retention::engine::{self, plan};

use common::write_file;

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn keep(n: usize) -> RetentionOptions {
    RetentionOptions {
        keep: n,
        dry_run: false,
    }
}

#[test]
fn keep_three_deletes_only_the_oldest_wheel() {
    let dir = tempfile::tempdir().unwrap();
    for version in ["1.0.0", "1.1.0", "2.0.0", "0.9.0"] {
        write_file(
            dir.path(),
            &format!("pkg-{version}-cp311-win_amd64.whl"),
            version.as_bytes(),
        );
    }

    let planned = plan(dir.path()).unwrap();
    assert_eq!(planned.groups.len(), 1);
    let order: Vec<&str> = planned.groups[0]
        .artifacts
        .iter()
        .map(|a| a.version.as_str())
        .collect();
    assert_eq!(order, ["2.0.0", "1.1.0", "1.0.0", "0.9.0"]);

    let mut sink = MemorySink::new();
    let report = engine::run(dir.path(), keep(3), &mut sink).unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert!(report.deleted[0].ends_with("pkg-0.9.0-cp311-win_amd64.whl"));
    assert_eq!(report.kept, 3);
    assert_eq!(report.bytes_freed, 5);
    assert_eq!(
        names_in(dir.path()),
        [
            "pkg-1.0.0-cp311-win_amd64.whl",
            "pkg-1.1.0-cp311-win_amd64.whl",
            "pkg-2.0.0-cp311-win_amd64.whl",
        ]
    );
    assert_eq!(sink.of(EventType::ArtifactDeleted).len(), 1);
    assert_eq!(sink.of(EventType::RunStart).len(), 1);
    assert_eq!(sink.of(EventType::RunSummary).len(), 1);
}

#[test]
fn source_and_binary_partitions_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "pkg-1.0.0.tar.gz", b"old sdist");
    write_file(dir.path(), "pkg-1.0.0-cp311-win_amd64.whl", b"old wheel");
    write_file(dir.path(), "pkg-2.0.0-cp311-win_amd64.whl", b"new wheel");

    let planned = plan(dir.path()).unwrap();
    assert_eq!(planned.groups_of(ArtifactKind::Binary).count(), 1);
    assert_eq!(planned.groups_of(ArtifactKind::Source).count(), 1);

    let report = engine::run(dir.path(), keep(1), &mut NullSink).unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(
        names_in(dir.path()),
        ["pkg-1.0.0.tar.gz", "pkg-2.0.0-cp311-win_amd64.whl"]
    );
}

#[test]
fn interpreter_tags_form_separate_groups() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "pkg-1.0.0-cp310-win_amd64.whl", b"a");
    write_file(dir.path(), "pkg-2.0.0-cp311-win_amd64.whl", b"b");

    let report = engine::run(dir.path(), keep(1), &mut NullSink).unwrap();
    assert_eq!(report.groups_examined, 2);
    assert!(report.deleted.is_empty());
}

#[test]
fn numeric_components_beat_lexical_order() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "pkg-1.9.0.tar.gz", b"nine");
    write_file(dir.path(), "pkg-1.10.0.tar.gz", b"ten");

    let report = engine::run(dir.path(), keep(1), &mut NullSink).unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert!(report.deleted[0].ends_with("pkg-1.9.0.tar.gz"));
    assert_eq!(names_in(dir.path()), ["pkg-1.10.0.tar.gz"]);
}

#[test]
fn normalized_names_share_a_group() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "Typing_Extensions-4.9.0-py3-none-any.whl", b"old");
    write_file(dir.path(), "typing_extensions-4.12.2-py3-none-any.whl", b"new");

    let report = engine::run(dir.path(), keep(1), &mut NullSink).unwrap();
    assert_eq!(report.groups_examined, 1);
    assert_eq!(
        names_in(dir.path()),
        ["typing_extensions-4.12.2-py3-none-any.whl"]
    );
}

#[test]
fn dry_run_reports_without_deleting() {
    let dir = tempfile::tempdir().unwrap();
    for version in ["1.0", "2.0", "3.0"] {
        write_file(dir.path(), &format!("lib-{version}.zip"), b"x");
    }

    let mut sink = MemorySink::new();
    let options = RetentionOptions {
        keep: 1,
        dry_run: true,
    };
    let report = engine::run(dir.path(), options, &mut sink).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(names_in(dir.path()).len(), 3);
    assert!(
        sink.of(EventType::ArtifactDeleted)
            .iter()
            .all(|e| e.message.starts_with("dry-run"))
    );
}

#[test]
fn unmatched_files_and_subdirectories_are_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "README.txt", b"notes");
    write_file(dir.path(), "nested/pkg-0.1.0.tar.gz", b"deep");
    write_file(dir.path(), "pkg-0.2.0.tar.gz", b"a");
    write_file(dir.path(), "pkg-0.3.0.tar.gz", b"b");

    let report = engine::run(dir.path(), keep(1), &mut NullSink).unwrap();
    assert_eq!(report.unmatched, 1);
    assert!(dir.path().join("README.txt").exists());
    assert!(dir.path().join("nested/pkg-0.1.0.tar.gz").exists());
    assert!(!dir.path().join("pkg-0.2.0.tar.gz").exists());
}

#[test]
fn unparsable_versions_are_pruned_first_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "tool-1.0.0.tar.gz", b"a");
    write_file(dir.path(), "tool-2024_snapshot.tar.gz", b"b");

    let mut sink = MemorySink::new();
    let report = engine::run(dir.path(), keep(1), &mut sink).unwrap();
    assert_eq!(sink.of(EventType::VersionUnparsable).len(), 1);
    assert!(report.deleted[0].ends_with("tool-2024_snapshot.tar.gz"));
}

#[test]
fn unreadable_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = MemorySink::new();
    let err = engine::run(&dir.path().join("absent"), keep(3), &mut sink).unwrap_err();
    assert!(err.code().starts_with("MW-"));
    assert_eq!(sink.of(EventType::Error).len(), 1);
}
