mod common;

use foldermon::fs::mock::MockFileSystem;
use foldermon::source::RawChangeKind;
use foldermon::{ChangeFilter, MonitorOptions};

use common::{fake_monitor, fake_monitor_with, init_tracing, line, wait_for_handoff, FakeSource};

fn setup() -> (FakeSource, MockFileSystem) {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/w");
    (FakeSource::new(), fs)
}

#[test]
fn added_file_is_reported_on_second_update() {
    let (source, fs) = setup();
    fs.set_file("/w/a.txt", 10);
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    assert!(source.deliver_records("/w", &[(RawChangeKind::Added, "a.txt")]));
    wait_for_handoff(&monitor, 1);

    assert_eq!(monitor.update(), 0);
    assert!(events.take().is_empty());
    assert_eq!(monitor.pending_actions(), 1);

    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("added", "/w/a.txt")]);

    assert_eq!(monitor.update(), 0);
    assert!(events.take().is_empty());
}

#[test]
fn growing_file_is_reported_on_third_update() {
    let (source, fs) = setup();
    fs.set_file("/w/log.txt", 100);
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records("/w", &[(RawChangeKind::Modified, "log.txt")]);
    wait_for_handoff(&monitor, 1);

    assert_eq!(monitor.update(), 0);
    fs.append("/w/log.txt", 50);
    assert_eq!(monitor.update(), 0);
    assert!(events.take().is_empty());

    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("modified", "/w/log.txt")]);
}

#[test]
fn removed_file_is_reported_immediately() {
    let (source, fs) = setup();
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records("/w", &[(RawChangeKind::Removed, "gone.txt")]);
    wait_for_handoff(&monitor, 1);

    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("removed", "/w/gone.txt")]);
}

#[test]
fn rename_pair_is_one_callback() {
    let (source, fs) = setup();
    fs.set_file("/w/b.txt", 5);
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records(
        "/w",
        &[
            (RawChangeKind::RenamedOld, "a.txt"),
            (RawChangeKind::RenamedNew, "b.txt"),
        ],
    );
    wait_for_handoff(&monitor, 1);

    monitor.update();
    monitor.update();
    monitor.update();
    assert_eq!(events.take(), ["renamed /w/a.txt -> /w/b.txt"]);
}

#[test]
fn orphaned_new_name_is_reported_as_added() {
    let (source, fs) = setup();
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records("/w", &[(RawChangeKind::RenamedNew, "arrived.txt")]);
    wait_for_handoff(&monitor, 1);

    // Not on disk in the mock, so it is released at once.
    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("added", "/w/arrived.txt")]);
}

#[test]
fn hidden_files_follow_the_option() {
    let (source, fs) = setup();
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records(
        "/w",
        &[
            (RawChangeKind::Removed, ".lock"),
            (RawChangeKind::Removed, "plain"),
        ],
    );
    wait_for_handoff(&monitor, 1);
    monitor.update();
    assert_eq!(events.take(), [line("removed", "/w/plain")]);
    drop(monitor);

    let options = MonitorOptions {
        ignore_hidden: false,
        ..MonitorOptions::default()
    };
    let (mut monitor, events) = fake_monitor_with(&source, &fs, options);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();
    source.deliver_records("/w", &[(RawChangeKind::Removed, ".lock")]);
    wait_for_handoff(&monitor, 1);
    monitor.update();
    assert_eq!(events.take(), [line("removed", "/w/.lock")]);
}

#[test]
fn batches_keep_their_order() {
    let (source, fs) = setup();
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records(
        "/w",
        &[(RawChangeKind::Removed, "1"), (RawChangeKind::Removed, "2")],
    );
    wait_for_handoff(&monitor, 2);
    source.deliver_records("/w", &[(RawChangeKind::Removed, "3")]);
    wait_for_handoff(&monitor, 3);

    assert_eq!(monitor.update(), 3);
    assert_eq!(
        events.take(),
        [line("removed", "/w/1"), line("removed", "/w/2"), line("removed", "/w/3")]
    );
}

#[test]
fn stopping_discards_unemitted_actions() {
    let (source, fs) = setup();
    fs.set_file("/w/half.bin", 1);
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records("/w", &[(RawChangeKind::Added, "half.bin")]);
    wait_for_handoff(&monitor, 1);
    monitor.update();
    assert_eq!(monitor.pending_actions(), 1);

    monitor.stop_monitor("/w").unwrap();
    assert_eq!(monitor.update(), 0);
    assert_eq!(monitor.pending_actions(), 0);
    assert!(events.take().is_empty());
}

#[test]
fn lone_old_name_is_not_fused_with_a_later_new_name() {
    let (source, fs) = setup();
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records("/w", &[(RawChangeKind::RenamedOld, "left.txt")]);
    wait_for_handoff(&monitor, 1);
    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("removed", "/w/left.txt")]);

    source.deliver_records("/w", &[(RawChangeKind::RenamedNew, "arrived.txt")]);
    wait_for_handoff(&monitor, 1);
    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("added", "/w/arrived.txt")]);
}

#[test]
fn repeated_modification_is_reported_once() {
    let (source, fs) = setup();
    fs.set_file("/w/saved.txt", 8);
    let (mut monitor, events) = fake_monitor(&source, &fs);
    monitor.start_monitor("/w", true, ChangeFilter::DEFAULT).unwrap();

    source.deliver_records(
        "/w",
        &[
            (RawChangeKind::Modified, "saved.txt"),
            (RawChangeKind::Modified, "saved.txt"),
        ],
    );
    wait_for_handoff(&monitor, 2);

    assert_eq!(monitor.update(), 0);
    assert_eq!(monitor.pending_actions(), 1);
    assert_eq!(monitor.update(), 1);
    assert_eq!(events.take(), [line("modified", "/w/saved.txt")]);
}
