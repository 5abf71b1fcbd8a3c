//! Filesystem helpers shared by the record repositories.
//!
//! Records live in a sharded layout:
//!
//! ```text
//! <base>/<s1>/<s2>/<uuid>/<record>.yaml
//! ```
//!
//! where `s1` and `s2` are the first four hex characters of the UUID.

use crate::error::{PortalError, PortalResult};
use portal_uuid::ShardableUuid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::{
    collections::HashMap,
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tempfile::NamedTempFile;

/// Per-record mutexes serialising read-modify-write cycles on one record's files.
///
/// Clones share the same set of locks.
#[derive(Clone, Debug, Default)]
pub struct RecordLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `record_id`. Other records are not blocked.
    ///
    /// The entry is dropped again once no caller holds or waits on it.
    pub fn with<T>(&self, record_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .table()
            .entry(record_id.to_owned())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut table = self.table();
        let idle = table
            .get(record_id)
            .is_some_and(|current| Arc::ptr_eq(current, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            table.remove(record_id);
        }
        result
    }

    /// Records with a lock currently in use.
    pub fn active(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Allocates a fresh record directory under `base_dir`.
///
/// Guards against UUID collisions and directories created by something else by retrying
/// with a new identifier, at most five times.
///
/// # Errors
///
/// Returns [`PortalError::StorageDirCreation`] if a parent directory cannot be created or
/// five attempts all collide.
pub(crate) fn create_unique_shared_dir(
    base_dir: &Path,
    mut uuid_source: impl FnMut() -> ShardableUuid,
) -> PortalResult<(ShardableUuid, PathBuf)> {
    for _attempt in 0..5 {
        let uuid = uuid_source();
        let candidate = uuid.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(PortalError::StorageDirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((uuid, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(PortalError::StorageDirCreation(e)),
        }
    }

    Err(PortalError::StorageDirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique record directory after 5 attempts",
    )))
}

/// Walks `<base>/<s1>/<s2>/<uuid>/` and returns every record id whose directory holds
/// `marker_file`, sorted.
///
/// A missing base directory is an empty store. Directory names that are not canonical
/// UUIDs are ignored.
pub(crate) fn list_sharded_ids(base_dir: &Path, marker_file: &str) -> PortalResult<Vec<String>> {
    let s1_iter = match fs::read_dir(base_dir) {
        Ok(it) => it,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PortalError::FileRead(e)),
    };

    let mut ids = Vec::new();
    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }

        let Ok(s2_iter) = fs::read_dir(&s1_path) else {
            continue;
        };
        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }

            let Ok(id_iter) = fs::read_dir(&s2_path) else {
                continue;
            };
            for id_ent in id_iter.flatten() {
                let id_path = id_ent.path();
                if !id_path.join(marker_file).is_file() {
                    continue;
                }
                if let Some(name) = id_path.file_name().and_then(|n| n.to_str()) {
                    if ShardableUuid::is_canonical(name) {
                        ids.push(name.to_owned());
                    }
                }
            }
        }
    }

    ids.sort();
    Ok(ids)
}

/// Reads and parses a YAML record.
///
/// Schema errors carry the path to the failing field (for example
/// `[2].urgency.level`) so a hand-edited file can be fixed.
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> PortalResult<T> {
    let raw = fs::read_to_string(path).map_err(PortalError::FileRead)?;
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(deserializer).map_err(|e| PortalError::YamlDeserialization {
        path: format!("{}: {}", path.display(), e.path()),
        message: e.inner().to_string(),
    })
}

/// Serialises `value` and replaces `path` with it.
///
/// The YAML is written to a uniquely named temporary file in the same directory and
/// renamed into place, so readers never observe a half-written record.
pub(crate) fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> PortalResult<()> {
    let yaml = serde_yaml::to_string(value).map_err(PortalError::YamlSerialization)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(PortalError::FileWrite)?;
    tmp.write_all(yaml.as_bytes()).map_err(PortalError::FileWrite)?;
    tmp.persist(path).map_err(|e| PortalError::FileWrite(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_create_unique_shared_dir_retries_on_collision() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let taken = ShardableUuid::new();
        fs::create_dir_all(taken.sharded_dir(temp_dir.path())).expect("pre-create dir");

        let fresh = ShardableUuid::new();
        let mut candidates = vec![fresh.clone(), taken.clone()];
        let (uuid, path) = create_unique_shared_dir(temp_dir.path(), || {
            candidates.pop().expect("ran out of candidates")
        })
        .expect("allocation should succeed");

        assert_eq!(uuid, fresh);
        assert!(path.is_dir());
    }

    #[test]
    fn test_create_unique_shared_dir_gives_up_after_five_attempts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let taken = ShardableUuid::new();
        fs::create_dir_all(taken.sharded_dir(temp_dir.path())).expect("pre-create dir");

        let result = create_unique_shared_dir(temp_dir.path(), || taken.clone());

        assert!(matches!(result, Err(PortalError::StorageDirCreation(_))));
    }

    #[test]
    fn test_list_sharded_ids_requires_marker_and_canonical_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let with_marker = ShardableUuid::new();
        let without_marker = ShardableUuid::new();

        let dir = with_marker.sharded_dir(temp_dir.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("record.yaml"), "x: 1").unwrap();
        fs::create_dir_all(without_marker.sharded_dir(temp_dir.path())).unwrap();
        fs::create_dir_all(temp_dir.path().join("ab/cd/not-a-uuid")).unwrap();
        fs::write(temp_dir.path().join("ab/cd/not-a-uuid/record.yaml"), "").unwrap();

        let ids = list_sharded_ids(temp_dir.path(), "record.yaml").unwrap();

        assert_eq!(ids, vec![with_marker.to_string()]);
    }

    #[test]
    fn test_list_sharded_ids_missing_base_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let ids = list_sharded_ids(&temp_dir.path().join("absent"), "record.yaml").unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_yaml_round_trip_and_error_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("sample.yaml");

        write_yaml(&path, &Sample { name: "a".into(), count: 2 }).unwrap();
        let back: Sample = read_yaml(&path).unwrap();
        assert_eq!(back.count, 2);
        assert!(!path.with_extension("yaml.tmp").exists());

        fs::write(&path, "name: a\ncount: lots\n").unwrap();
        let err = read_yaml::<Sample>(&path).unwrap_err();
        match err {
            PortalError::YamlDeserialization { path, .. } => assert!(path.ends_with("count")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_writes_to_one_file_all_succeed() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("sample.yaml");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|count| {
                    let path = &path;
                    scope.spawn(move || write_yaml(path, &Sample { name: "w".into(), count }))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().expect("every write should land");
            }
        });

        let back: Sample = read_yaml(&path).unwrap();
        assert!(back.count < 16);
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_record_locks_serialise_same_record() {
        let locks = RecordLocks::new();
        let counter = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for i in 0..8 {
                let locks = locks.clone();
                let counter = &counter;
                scope.spawn(move || {
                    locks.with("p1", || {
                        let before = counter.lock().unwrap().len();
                        std::thread::yield_now();
                        counter.lock().unwrap().push(i);
                        assert_eq!(counter.lock().unwrap().len(), before + 1);
                    })
                });
            }
        });

        assert_eq!(counter.lock().unwrap().len(), 8);
        assert_eq!(locks.active(), 0);
    }
}
