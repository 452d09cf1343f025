use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::config::{FileMapConfig, SyncMode};
use crate::error::{KeychainError, KeychainResult};
use crate::sector_key::{KeyState, SectorHeader, SectorKey, HEADER_SIZE};
use crate::traits::Keychain;

/// Position of a record within the keychain files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: u32,
    pub offset: u64,
}

struct FileMapState {
    /// Keys whose records are visible.
    live: HashMap<Vec<u8>, Location>,
    /// Erased keys; their records stay in place so they can be restored.
    tombstones: HashMap<Vec<u8>, Location>,
    current_file: u32,
    current_size: u64,
}

/// Append-only keychain backed by numbered record files.
///
/// On-disk layout: `<dir>/_filemap.00000`, `<dir>/_filemap.00001`, ... Each
/// file is a concatenation of [`SectorKey`] records (13-byte header plus key
/// bytes). A key is written once and afterwards updated in place; erase and
/// restore only rewrite the state byte.
///
/// The in-memory index is rebuilt at [`open`](Self::open) by replaying every
/// file in order. A record that runs past the end of its file is a torn
/// write and ends the scan of that file.
pub struct FileKeychain {
    dir: PathBuf,
    config: FileMapConfig,
    state: Mutex<FileMapState>,
}

impl FileKeychain {
    /// Open (or create) a keychain in `dir`, replaying existing files.
    pub fn open(dir: impl AsRef<Path>, config: FileMapConfig) -> KeychainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let state = Self::replay(&dir)?;
        info!(
            dir = %dir.display(),
            keys = state.live.len(),
            erased = state.tombstones.len(),
            current_file = state.current_file,
            current_size = state.current_size,
            "filemap keychain initialized"
        );
        Ok(Self {
            dir,
            config,
            state: Mutex::new(state),
        })
    }

    /// Path of record file `index` under `dir`.
    pub fn file_path(dir: &Path, index: u32) -> PathBuf {
        dir.join(format!("_filemap.{index:05}"))
    }

    /// Where the record for `key` lives, if the key is live.
    pub fn location(&self, key: &[u8]) -> Option<Location> {
        let state = self.state.lock().expect("lock poisoned");
        state.live.get(key).copied()
    }

    /// Index of the file receiving new keys.
    pub fn current_file(&self) -> u32 {
        self.state.lock().expect("lock poisoned").current_file
    }

    /// Bytes written to the current file.
    pub fn current_size(&self) -> u64 {
        self.state.lock().expect("lock poisoned").current_size
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("lock poisoned").live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn replay(dir: &Path) -> KeychainResult<FileMapState> {
        let mut state = FileMapState {
            live: HashMap::new(),
            tombstones: HashMap::new(),
            current_file: 0,
            current_size: 0,
        };

        let mut index = 0u32;
        let mut last = None;
        loop {
            let path = Self::file_path(dir, index);
            if !path.exists() {
                break;
            }
            let data = fs::read(&path)?;
            Self::scan_file(&path, index, &data, &mut state);
            last = Some((index, data.len() as u64));
            index += 1;
        }

        match last {
            Some((file, size)) => {
                state.current_file = file;
                state.current_size = size;
            }
            None => {
                File::create(Self::file_path(dir, 0))?;
            }
        }
        Ok(state)
    }

    fn scan_file(path: &Path, file: u32, data: &[u8], state: &mut FileMapState) {
        let mut offset = 0usize;
        while offset < data.len() {
            let remaining = &data[offset..];
            if remaining.len() < HEADER_SIZE {
                warn!(path = %path.display(), offset, "torn record header, ignoring tail");
                break;
            }
            let length = u16::from_le_bytes([remaining[1], remaining[2]]) as usize;
            let end = HEADER_SIZE + length;
            if remaining.len() < end {
                warn!(path = %path.display(), offset, length, "torn record body, ignoring tail");
                break;
            }
            let key = remaining[HEADER_SIZE..end].to_vec();
            let location = Location {
                file,
                offset: offset as u64,
            };
            // Same split as `put`: EMPTY is a tombstone, every other state is live.
            match KeyState::from_byte(remaining[0]) {
                Some(KeyState::Empty) => {
                    if !state.live.contains_key(&key) {
                        state.tombstones.insert(key, location);
                    }
                }
                Some(_) => {
                    state.tombstones.remove(&key);
                    state.live.insert(key, location);
                }
                None => {
                    warn!(path = %path.display(), offset, state = remaining[0], "unknown record state, skipping");
                }
            }
            offset += end;
        }
    }

    fn write_at(&self, location: Location, bytes: &[u8]) -> KeychainResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(Self::file_path(&self.dir, location.file))?;
        file.seek(SeekFrom::Start(location.offset))?;
        file.write_all(bytes)?;
        file.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            file.sync_data()?;
        }
        Ok(())
    }

    fn read_record(&self, location: Location, key: &[u8]) -> KeychainResult<Option<SectorKey>> {
        let path = Self::file_path(&self.dir, location.file);
        let corruption = |reason: String| KeychainError::Corruption {
            path: path.clone(),
            offset: location.offset,
            reason,
        };

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut header = [0u8; HEADER_SIZE];
        read_exact_or(&mut file, &mut header, || corruption("truncated header".into()))?;
        let header = SectorHeader::decode(&header).map_err(|e| corruption(e.to_string()))?;

        if !header.state.is_visible() {
            debug!(file = location.file, offset = location.offset, state = ?header.state, "record not visible");
            return Ok(None);
        }

        let mut stored = vec![0u8; header.length as usize];
        read_exact_or(&mut file, &mut stored, || corruption("truncated key".into()))?;
        if stored != key {
            return Err(corruption(format!(
                "key mismatch: expected {}, found {}",
                hex::encode(key),
                hex::encode(&stored)
            )));
        }
        Ok(Some(SectorKey::from_header(header, stored)))
    }
}

fn read_exact_or(
    file: &mut File,
    buf: &mut [u8],
    on_eof: impl FnOnce() -> KeychainError,
) -> KeychainResult<()> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(on_eof()),
        Err(e) => Err(e.into()),
    }
}

impl Keychain for FileKeychain {
    fn get(&self, key: &[u8]) -> KeychainResult<Option<SectorKey>> {
        let state = self.state.lock().expect("lock poisoned");
        let Some(location) = state.live.get(key).copied() else {
            return Ok(None);
        };
        let record = self.read_record(location, key)?;
        debug!(key = %hex::encode(key), file = location.file, offset = location.offset, found = record.is_some(), "filemap get");
        Ok(record)
    }

    fn put(&self, record: &SectorKey) -> KeychainResult<()> {
        let bytes = record.to_bytes()?;
        let mut state = self.state.lock().expect("lock poisoned");

        let existing = state
            .live
            .get(&record.key)
            .or_else(|| state.tombstones.get(&record.key))
            .copied();

        let location = match existing {
            Some(location) => location,
            None => {
                if state.current_size > self.config.max_file_size {
                    state.current_file += 1;
                    state.current_size = 0;
                    File::create(Self::file_path(&self.dir, state.current_file))?;
                    info!(file = state.current_file, "filemap rolled over to new file");
                }
                Location {
                    file: state.current_file,
                    offset: state.current_size,
                }
            }
        };

        self.write_at(location, &bytes)?;
        if existing.is_none() {
            state.current_size += bytes.len() as u64;
        }

        state.live.remove(&record.key);
        state.tombstones.remove(&record.key);
        if record.state == KeyState::Empty {
            state.tombstones.insert(record.key.clone(), location);
        } else {
            state.live.insert(record.key.clone(), location);
        }

        debug!(
            key = %hex::encode(&record.key),
            file = location.file,
            offset = location.offset,
            in_place = existing.is_some(),
            "filemap put"
        );
        Ok(())
    }

    fn erase(&self, key: &[u8]) -> KeychainResult<bool> {
        let mut state = self.state.lock().expect("lock poisoned");
        let Some(location) = state.live.get(key).copied() else {
            return Ok(false);
        };
        self.write_at(location, &[KeyState::Empty.as_byte()])?;
        state.live.remove(key);
        state.tombstones.insert(key.to_vec(), location);
        debug!(key = %hex::encode(key), file = location.file, offset = location.offset, "filemap erase");
        Ok(true)
    }

    fn restore(&self, key: &[u8]) -> KeychainResult<bool> {
        let mut state = self.state.lock().expect("lock poisoned");
        let Some(location) = state
            .tombstones
            .get(key)
            .or_else(|| state.live.get(key))
            .copied()
        else {
            return Ok(false);
        };
        self.write_at(location, &[KeyState::Ready.as_byte()])?;
        state.tombstones.remove(key);
        state.live.insert(key.to_vec(), location);
        debug!(key = %hex::encode(key), file = location.file, offset = location.offset, "filemap restore");
        Ok(true)
    }

    fn keys(&self) -> KeychainResult<Vec<Vec<u8>>> {
        let state = self.state.lock().expect("lock poisoned");
        let mut keys: Vec<Vec<u8>> = state.live.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn has_key(&self, key: &[u8]) -> KeychainResult<bool> {
        Ok(self.state.lock().expect("lock poisoned").live.contains_key(key))
    }
}

impl std::fmt::Debug for FileKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("FileKeychain")
            .field("dir", &self.dir)
            .field("keys", &state.live.len())
            .field("current_file", &state.current_file)
            .field("current_size", &state.current_size)
            .finish()
    }
}
