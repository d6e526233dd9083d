use koko_mailer::progress::{daily_lock_path, FileProgressStore, ProgressStore};
use std::path::PathBuf;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir()
        .join("koko-mailer-tests")
        .join(uuid::Uuid::new_v4().to_string())
}

#[test]
fn appended_emails_are_visible_on_reload() {
    // arrange
    let dir = scratch_dir();
    let mut store = FileProgressStore::open(&dir).expect("Failed to open the progress store.");

    // act
    store.append_sent("user1@example.com").unwrap();
    store.append_sent("user2@example.com").unwrap();

    // assert: a second handle on the same day sees everything appended so far.
    let reopened = FileProgressStore::open(&dir).unwrap();
    let sent = reopened.load_sent_today().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent.contains("user1@example.com"));
    assert!(sent.contains("user2@example.com"));
}

#[test]
fn a_fresh_store_is_empty() {
    let dir = scratch_dir();
    let store = FileProgressStore::open(&dir).unwrap();
    assert!(store.load_sent_today().unwrap().is_empty());
}

#[test]
fn the_progress_file_is_scoped_to_the_calendar_day() {
    let dir = scratch_dir();
    let store = FileProgressStore::open(&dir).unwrap();
    let today = chrono::Local::now().date_naive().to_string();
    let name = store.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(name, format!("sent_{}.log", today));
}

#[test]
fn the_daily_lock_lives_next_to_the_progress_file() {
    let dir = scratch_dir();
    let today = chrono::Local::now().date_naive().to_string();
    assert_eq!(
        daily_lock_path(&dir),
        dir.join(format!("sent_{}.lock", today))
    );
}

#[test]
fn blank_lines_are_ignored_when_loading() {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let today = chrono::Local::now().date_naive().to_string();
    std::fs::write(
        dir.join(format!("sent_{}.log", today)),
        "user1@example.com\n\nuser2@example.com\n",
    )
    .unwrap();

    let store = FileProgressStore::open(&dir).unwrap();
    assert_eq!(store.load_sent_today().unwrap().len(), 2);
}
