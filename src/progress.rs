use chrono::Local;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
#[error("failed to persist send progress: {0}")]
pub struct PersistError(#[from] std::io::Error);

/// Append-only record of the addresses already delivered to today. The send
/// loop appends after every confirmed delivery so a crash loses at most the
/// in-flight send.
pub trait ProgressStore: Send {
    fn load_sent_today(&self) -> Result<HashSet<String>, PersistError>;
    fn append_sent(&mut self, email: &str) -> Result<(), PersistError>;
}

/// One address per line in `<dir>/sent_<YYYY-MM-DD>.log`.
pub struct FileProgressStore {
    path: PathBuf,
    file: File,
}

impl FileProgressStore {
    pub fn open(dir: &Path) -> Result<Self, PersistError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("sent_{}.log", Local::now().date_naive()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStore for FileProgressStore {
    fn load_sent_today(&self) -> Result<HashSet<String>, PersistError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut sent = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let email = line.trim();
            if !email.is_empty() {
                sent.insert(email.to_string());
            }
        }
        Ok(sent)
    }

    fn append_sent(&mut self, email: &str) -> Result<(), PersistError> {
        writeln!(self.file, "{}", email)?;
        // The append must be durable before the next recipient is attempted.
        self.file.sync_all()?;
        Ok(())
    }
}

/// Marker written by the wrapper once a run has attempted every recipient;
/// its presence blocks a second full run on the same calendar day.
pub fn daily_lock_path(dir: &Path) -> PathBuf {
    dir.join(format!("sent_{}.lock", Local::now().date_naive()))
}
