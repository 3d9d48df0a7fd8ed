use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::profile::DogProfile;

const STORE_FILE: &str = "profiles.bin";
const STORE_TMP: &str = "profiles.bin.tmp";

/// Persistence contract the core needs. Pull-based only: list refresh is
/// the caller's business.
pub trait ProfileStore: Send + Sync {
    /// Store a new profile and return its assigned id. Profiles without a
    /// nose print are rejected.
    fn insert(&self, profile: DogProfile) -> Result<i64>;
    /// Replace the profile with the same id.
    fn update(&self, profile: &DogProfile) -> Result<()>;
    fn get_all(&self) -> Result<Vec<DogProfile>>;
    fn get_by_id(&self, id: i64) -> Result<Option<DogProfile>>;
    /// Number of rows removed (0 or 1).
    fn delete_by_id(&self, id: i64) -> Result<usize>;
    fn count(&self) -> Result<usize>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: i64,
    profiles: Vec<DogProfile>,
}

/// Single-file postcard store.
///
/// Every mutation rewrites the whole file through a synced temp file and a
/// rename, so a crash leaves either the old or the new contents. Writers are
/// serialized by an in-process mutex.
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating store dir {}", dir.display()))?;
        let store = Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        };
        // Fail at startup rather than on first use if the file is corrupt
        let contents = store.read()?;
        log::info!(
            "opened profile store {} ({} profiles)",
            dir.display(),
            contents.profiles.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn read(&self) -> Result<StoreFile> {
        let file = self.path();
        if !file.exists() {
            return Ok(StoreFile {
                next_id: 1,
                profiles: vec![],
            });
        }
        let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        postcard::from_bytes(&data).with_context(|| format!("decoding {}", file.display()))
    }

    fn write(&self, contents: &StoreFile) -> Result<()> {
        let data = postcard::to_allocvec(contents)?;
        let tmp = self.dir.join(STORE_TMP);
        let mut file =
            File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(&data)
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing {}", tmp.display()))?;
        drop(file);
        std::fs::rename(&tmp, self.path())
            .with_context(|| format!("committing {}", self.path().display()))?;
        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut StoreFile) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut contents = self.read()?;
        let out = f(&mut contents)?;
        self.write(&contents)?;
        Ok(out)
    }

    fn snapshot(&self) -> Result<StoreFile> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read()
    }
}

impl ProfileStore for FileStore {
    fn insert(&self, mut profile: DogProfile) -> Result<i64> {
        anyhow::ensure!(
            profile.has_embedding(),
            "refusing to store {} without a nose print",
            profile.name()
        );
        let id = self.modify(|contents| {
            let id = contents.next_id.max(1);
            contents.next_id = id + 1;
            profile.id = id;
            contents.profiles.push(profile);
            Ok(id)
        })?;
        log::debug!("inserted profile {}", id);
        Ok(id)
    }

    fn update(&self, profile: &DogProfile) -> Result<()> {
        anyhow::ensure!(
            profile.has_embedding(),
            "refusing to store profile {} without a nose print",
            profile.id
        );
        self.modify(|contents| {
            let slot = contents
                .profiles
                .iter_mut()
                .find(|p| p.id == profile.id)
                .with_context(|| format!("no profile with id {}", profile.id))?;
            *slot = profile.clone();
            Ok(())
        })
    }

    fn get_all(&self) -> Result<Vec<DogProfile>> {
        Ok(self.snapshot()?.profiles)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<DogProfile>> {
        Ok(self
            .snapshot()?
            .profiles
            .into_iter()
            .find(|p| p.id == id))
    }

    fn delete_by_id(&self, id: i64) -> Result<usize> {
        self.modify(|contents| {
            let before = contents.profiles.len();
            contents.profiles.retain(|p| p.id != id);
            Ok(before - contents.profiles.len())
        })
    }

    fn count(&self) -> Result<usize> {
        Ok(self.snapshot()?.profiles.len())
    }
}
