use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use regis_keychain::{FileMapConfig, Keychain, SectorKey, SyncMode};
use regis_register::State;
use regis_types::Address;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::traits::RegisterStore;

struct SectorWriter {
    file: u16,
    size: u64,
}

/// Register store that appends state bytes to numbered sector files and
/// locates them through a keychain.
///
/// On-disk layout: `<dir>/_sector.00000`, `<dir>/_sector.00001`, ... Every
/// write appends the serialized state to the current file and puts a ready
/// [`SectorKey`] under the address bytes pointing at it. Earlier versions
/// stay in the files unreferenced.
pub struct SectorRegisterStore<K: Keychain> {
    dir: PathBuf,
    keychain: K,
    max_file_size: u64,
    sync_mode: SyncMode,
    writer: Mutex<SectorWriter>,
}

impl<K: Keychain> SectorRegisterStore<K> {
    /// Open (or create) sector files in `dir`, indexed by `keychain`.
    ///
    /// Files roll over once appending would exceed `config.max_file_size`;
    /// sector offsets are 32-bit so the limit is capped at `u32::MAX`.
    pub fn open(dir: impl AsRef<Path>, keychain: K, config: &FileMapConfig) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut file = 0u16;
        while Self::file_path(&dir, file + 1).exists() {
            file += 1;
        }
        let path = Self::file_path(&dir, file);
        let size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            File::create(&path)?;
            0
        };
        info!(dir = %dir.display(), file, size, "sector store initialized");

        Ok(Self {
            dir,
            keychain,
            max_file_size: config.max_file_size.min(u64::from(u32::MAX)),
            sync_mode: config.sync_mode,
            writer: Mutex::new(SectorWriter { file, size }),
        })
    }

    /// Path of sector file `index` under `dir`.
    pub fn file_path(dir: &Path, index: u16) -> PathBuf {
        dir.join(format!("_sector.{index:05}"))
    }

    pub fn keychain(&self) -> &K {
        &self.keychain
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the file receiving new states.
    pub fn current_file(&self) -> u16 {
        self.writer.lock().expect("lock poisoned").file
    }

    fn append(&self, bytes: &[u8]) -> StoreResult<(u16, u32)> {
        let len = bytes.len() as u64;
        if len > self.max_file_size {
            return Err(StoreError::TooLarge(bytes.len()));
        }

        let mut writer = self.writer.lock().expect("lock poisoned");
        if writer.size > 0 && writer.size + len > self.max_file_size {
            let next = writer
                .file
                .checked_add(1)
                .ok_or_else(|| io::Error::other("sector file numbers exhausted"))?;
            File::create(Self::file_path(&self.dir, next))?;
            writer.file = next;
            writer.size = 0;
            info!(file = next, "sector store rolled over to new file");
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(Self::file_path(&self.dir, writer.file))?;
        file.write_all(bytes)?;
        file.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            file.sync_data()?;
        }

        // max_file_size fits in u32, so every start offset does too.
        let start = writer.size as u32;
        writer.size += len;
        Ok((writer.file, start))
    }

    fn read_sector(&self, address: &Address, record: &SectorKey) -> StoreResult<Vec<u8>> {
        let path = Self::file_path(&self.dir, record.sector_file);
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(u64::from(record.sector_start)))?;
        let mut bytes = vec![0u8; record.sector_size as usize];
        match file.read_exact(&mut bytes) {
            Ok(()) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(StoreError::CorruptState {
                address: *address,
                reason: format!(
                    "sector {}:{} shorter than {} bytes",
                    record.sector_file, record.sector_start, record.sector_size
                ),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl<K: Keychain> RegisterStore for SectorRegisterStore<K> {
    fn read_state(&self, address: &Address) -> StoreResult<Option<State>> {
        let Some(record) = self.keychain.get(address.as_bytes())? else {
            return Ok(None);
        };
        let bytes = self.read_sector(address, &record)?;
        let state = State::from_bytes(&bytes).map_err(|e| StoreError::CorruptState {
            address: *address,
            reason: e.to_string(),
        })?;
        debug!(
            address = %address.short_hex(),
            file = record.sector_file,
            start = record.sector_start,
            size = record.sector_size,
            "sector read"
        );
        Ok(Some(state))
    }

    fn write_state(&self, address: &Address, state: &State) -> StoreResult<()> {
        let bytes = state.to_bytes();
        let size = u32::try_from(bytes.len()).map_err(|_| StoreError::TooLarge(bytes.len()))?;
        let (file, start) = self.append(&bytes)?;
        self.keychain
            .put(&SectorKey::ready(address.as_bytes().to_vec(), file, start, size))?;
        debug!(address = %address.short_hex(), file, start, size, "sector write");
        Ok(())
    }

    fn has_state(&self, address: &Address) -> StoreResult<bool> {
        Ok(self.keychain.has_key(address.as_bytes())?)
    }
}

impl<K: Keychain> std::fmt::Debug for SectorRegisterStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let writer = self.writer.lock().expect("lock poisoned");
        f.debug_struct("SectorRegisterStore")
            .field("dir", &self.dir)
            .field("current_file", &writer.file)
            .field("current_size", &writer.size)
            .finish()
    }
}
