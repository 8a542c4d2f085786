//! Blob store: the file-system side of the disk tier
//!
//! Out-of-line values live as named files in the data directory. Bulk
//! removal renames the whole data directory into a uniquely named subtree of
//! the trash directory and recreates an empty one, which makes `remove_all`
//! near-instantaneous; a dedicated serial sweeper thread deletes trash
//! subtrees in the background. The sweeper only ever consumes uniquely named
//! entries under the trash directory and never touches the live data
//! directory or the database.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::{debug, warn};
use uuid::Uuid;

use super::error::StoreResult;
use super::{DB_FILE_NAME, DB_SHM_FILE_NAME, DB_WAL_FILE_NAME};

pub(crate) struct BlobStore {
    root: PathBuf,
    data_dir: PathBuf,
    trash_dir: PathBuf,
    sweeper: TrashSweeper,
}

impl BlobStore {
    /// Create the data and trash directories under `root` and start the
    /// sweeper.
    pub(crate) fn new(root: &Path) -> io::Result<Self> {
        let data_dir = root.join(super::DATA_DIR_NAME);
        let trash_dir = root.join(super::TRASH_DIR_NAME);
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&trash_dir)?;
        Ok(Self {
            root: root.to_path_buf(),
            data_dir,
            trash_dir,
            sweeper: TrashSweeper::spawn(),
        })
    }

    pub(crate) fn file_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Write a value file. Not atomic: a crash between this write and the
    /// manifest commit leaves an orphan file, which is harmless.
    pub(crate) fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.file_path(name), bytes)
    }

    pub(crate) fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.file_path(name))
    }

    /// Delete a value file. A missing file counts as deleted.
    pub(crate) fn delete(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Rename the data directory to a fresh uniquely named path under the
    /// trash directory and recreate an empty data directory.
    pub(crate) fn move_all_to_trash(&self) -> io::Result<()> {
        let staged = self.trash_dir.join(Uuid::new_v4().to_string());
        fs::rename(&self.data_dir, &staged)?;
        fs::create_dir_all(&self.data_dir)
    }

    /// Schedule a background drain of everything under the trash directory.
    /// Never blocks the caller.
    pub(crate) fn empty_trash_async(&self) {
        self.sweeper.drain(self.trash_dir.clone());
    }

    /// Recovery primitive: remove the database files, trash the data
    /// directory, and schedule the drain. The caller must have closed the
    /// database first.
    pub(crate) fn reset(&self) -> StoreResult<()> {
        for name in [DB_FILE_NAME, DB_SHM_FILE_NAME, DB_WAL_FILE_NAME] {
            match fs::remove_file(self.root.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.move_all_to_trash()?;
        self.empty_trash_async();
        Ok(())
    }
}

/// Serial background worker that deletes trash subtrees.
///
/// Requests queue on a channel and run one at a time. Dropping the handle
/// disconnects the channel; the worker finishes its queue and exits.
struct TrashSweeper {
    tx: Option<Sender<PathBuf>>,
}

impl TrashSweeper {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<PathBuf>();
        let spawned = thread::Builder::new().name("strata-trash-sweep".into()).spawn(move || {
            while let Ok(dir) = rx.recv() {
                sweep(&dir);
            }
        });
        match spawned {
            Ok(_) => Self { tx: Some(tx) },
            Err(e) => {
                warn!("failed to spawn trash sweeper: {}", e);
                Self { tx: None }
            }
        }
    }

    fn drain(&self, trash_dir: PathBuf) {
        match &self.tx {
            Some(tx) => {
                if tx.send(trash_dir.clone()).is_err() {
                    sweep(&trash_dir);
                }
            }
            // No worker; sweep on the calling thread rather than leak trash.
            None => sweep(&trash_dir),
        }
    }
}

/// Delete every entry under the trash directory.
fn sweep(trash_dir: &Path) {
    let entries = match fs::read_dir(trash_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("trash sweep skipped: {}", e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
        if let Err(e) = result {
            warn!("failed to sweep {}: {}", path.display(), e);
        }
    }
}
