use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use regis_cache::TemplateLru;
use tracing::{debug, info, warn};

use crate::config::{HashmapConfig, SyncMode};
use crate::error::{KeychainError, KeychainResult};
use crate::sector_key::{KeyState, SectorHeader, SectorKey, HEADER_SIZE};
use crate::traits::Keychain;

/// Shrink a key longer than `max` bytes by repeated halving: each pass sets
/// `v[i] ^= v[2i]` over the first half, then truncates to half the length
/// (never below `max`). Shorter keys are returned unchanged. One way.
pub fn compress_key(key: &[u8], max: usize) -> Cow<'_, [u8]> {
    if key.len() <= max {
        return Cow::Borrowed(key);
    }
    let mut folded = key.to_vec();
    while folded.len() > max {
        let half = folded.len() / 2;
        for i in 0..half {
            let byte = folded[i * 2];
            folded[i] ^= byte;
        }
        folded.truncate(half.max(max));
    }
    Cow::Owned(folded)
}

struct IndexState {
    /// Per-bucket count of generations written.
    generations: Vec<u32>,
}

/// Writes the generation index to disk: temp file, then rename.
struct Checkpointer {
    path: PathBuf,
    index: Arc<Mutex<IndexState>>,
    write_lock: Mutex<()>,
}

impl Checkpointer {
    /// Persist a full snapshot of the index.
    fn run(&self) -> io::Result<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let snapshot = self.index.lock().expect("lock poisoned").generations.clone();

        let mut bytes = Vec::with_capacity(snapshot.len() * 4);
        for generation in &snapshot {
            bytes.extend_from_slice(&generation.to_le_bytes());
        }

        let tmp = self.path.with_extension("index.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), buckets = snapshot.len(), "index checkpoint written");
        Ok(())
    }
}

/// Keychain of pre-sized bucket files with per-bucket generations.
///
/// On-disk layout:
/// ```text
/// <dir>/_hashmap.index   total_buckets * u32 LE generation counters
/// <dir>/_hashmap.00000   generation 0: total_buckets slots of (max_key_size + 13) bytes
/// <dir>/_hashmap.00001   generation 1, created on first need
/// ```
///
/// A key's bucket is the first eight key bytes (zero padded, little-endian)
/// modulo `total_buckets`. A put writes into the bucket's slot of the next
/// generation file and bumps the bucket counter, so records are never
/// overwritten. A get scans generations newest first and returns the first
/// ready slot holding the key.
///
/// The generation index lives in memory and is checkpointed by a background
/// thread every `flush_interval_ms`, and once more on drop. A put reaches the
/// data file before the index, so `open` rescans generation files past each
/// bucket's indexed count and adopts any occupied slots it finds.
pub struct HashmapKeychain {
    dir: PathBuf,
    config: HashmapConfig,
    index: Arc<Mutex<IndexState>>,
    checkpointer: Arc<Checkpointer>,
    files: TemplateLru<u32, Arc<Mutex<File>>>,
    pages: TemplateLru<(u32, u32), Arc<Vec<u8>>>,
    shutdown: Arc<AtomicBool>,
    flusher: Option<JoinHandle<()>>,
}

impl HashmapKeychain {
    /// Open (or create) a keychain in `dir`.
    pub fn open(dir: impl AsRef<Path>, config: HashmapConfig) -> KeychainResult<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index_path = Self::index_path(&dir);
        let expected = config.total_buckets as usize * 4;
        let mut generations = if index_path.exists() {
            let data = fs::read(&index_path)?;
            if data.len() != expected {
                return Err(KeychainError::Corruption {
                    path: index_path,
                    offset: 0,
                    reason: format!("index holds {} bytes, expected {expected}", data.len()),
                });
            }
            data.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect::<Vec<_>>()
        } else {
            vec![0u32; config.total_buckets as usize]
        };
        let recovered = Self::recover_generations(&dir, &config, &mut generations)?;
        if recovered > 0 {
            warn!(dir = %dir.display(), recovered, "index lagged data files, adopted unindexed slots");
        }
        let records: u64 = generations.iter().map(|g| *g as u64).sum();

        let index = Arc::new(Mutex::new(IndexState { generations }));
        let checkpointer = Arc::new(Checkpointer {
            path: index_path,
            index: index.clone(),
            write_lock: Mutex::new(()),
        });
        checkpointer.run()?;

        let mut chain = Self {
            files: TemplateLru::new(config.max_open_files),
            pages: TemplateLru::new(config.page_cache_slots),
            dir,
            config,
            index,
            checkpointer,
            shutdown: Arc::new(AtomicBool::new(false)),
            flusher: None,
        };
        chain.open_data_file(0)?;

        if chain.config.flush_interval_ms > 0 {
            chain.flusher = Some(Self::spawn_flusher(
                chain.checkpointer.clone(),
                chain.shutdown.clone(),
                Duration::from_millis(chain.config.flush_interval_ms),
            )?);
        }

        info!(
            dir = %chain.dir.display(),
            buckets = chain.config.total_buckets,
            records,
            "hashmap keychain initialized"
        );
        Ok(chain)
    }

    pub fn index_path(dir: &Path) -> PathBuf {
        dir.join("_hashmap.index")
    }

    /// Path of generation file `generation` under `dir`.
    pub fn data_path(dir: &Path, generation: u32) -> PathBuf {
        dir.join(format!("_hashmap.{generation:05}"))
    }

    /// Bucket of `key`: its first eight bytes, zero padded, as a
    /// little-endian integer modulo the bucket count.
    pub fn bucket_of(&self, key: &[u8]) -> u32 {
        let mut prefix = [0u8; 8];
        let n = key.len().min(8);
        prefix[..n].copy_from_slice(&key[..n]);
        (u64::from_le_bytes(prefix) % self.config.total_buckets as u64) as u32
    }

    /// Generations written for `bucket`.
    pub fn generation_count(&self, bucket: u32) -> u32 {
        let index = self.index.lock().expect("lock poisoned");
        index.generations.get(bucket as usize).copied().unwrap_or(0)
    }

    pub fn slot_size(&self) -> usize {
        self.config.slot_size()
    }

    /// Size of every generation file.
    pub fn file_len(&self) -> u64 {
        self.config.total_buckets as u64 * self.slot_size() as u64
    }

    pub fn config(&self) -> &HashmapConfig {
        &self.config
    }

    /// Write the generation index now.
    pub fn flush(&self) -> KeychainResult<()> {
        self.checkpointer.run()?;
        Ok(())
    }

    /// Every ready version of `key`, newest first.
    pub fn get_versions(&self, key: &[u8]) -> KeychainResult<Vec<SectorKey>> {
        self.scan(key, false)
    }

    /// Advance each bucket's counter past occupied slots in generation files
    /// the index does not cover yet. Returns the number of slots adopted.
    fn recover_generations(
        dir: &Path,
        config: &HashmapConfig,
        generations: &mut [u32],
    ) -> KeychainResult<u64> {
        let slot_size = config.slot_size() as u64;
        let mut recovered = 0;
        let mut generation = 0u32;
        loop {
            let path = Self::data_path(dir, generation);
            if !path.exists() {
                break;
            }
            let mut file = File::open(&path)?;
            for (bucket, count) in generations.iter_mut().enumerate() {
                if *count != generation {
                    continue;
                }
                file.seek(SeekFrom::Start(bucket as u64 * slot_size))?;
                let mut state = [0u8; 1];
                match file.read_exact(&mut state) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => continue,
                    Err(e) => return Err(e.into()),
                }
                if state[0] != KeyState::Empty.as_byte() {
                    *count += 1;
                    recovered += 1;
                }
            }
            generation += 1;
        }
        Ok(recovered)
    }

    fn spawn_flusher(
        checkpointer: Arc<Checkpointer>,
        shutdown: Arc<AtomicBool>,
        interval: Duration,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("hashmap-flush".into())
            .spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    thread::park_timeout(interval);
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = checkpointer.run() {
                        warn!(error = %e, "index checkpoint failed");
                    }
                }
            })
    }

    fn slot_offset(&self, bucket: u32) -> u64 {
        bucket as u64 * self.slot_size() as u64
    }

    /// Handle for `generation`, creating and pre-sizing the file if needed.
    fn open_data_file(&self, generation: u32) -> KeychainResult<Arc<Mutex<File>>> {
        if let Some(handle) = self.files.get(&generation) {
            return Ok(handle);
        }
        let path = Self::data_path(&self.dir, generation);
        if !path.exists() {
            let file = File::create(&path)?;
            file.set_len(self.file_len())?;
            debug!(generation, len = self.file_len(), "created generation file");
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let handle = Arc::new(Mutex::new(file));
        if let Some((evicted, _)) = self.files.put(generation, handle.clone()) {
            debug!(generation = evicted, "closed generation file handle");
        }
        Ok(handle)
    }

    /// Handle for `generation` if its file exists.
    fn existing_data_file(&self, generation: u32) -> KeychainResult<Option<Arc<Mutex<File>>>> {
        if !self.files.contains(&generation) && !Self::data_path(&self.dir, generation).exists() {
            return Ok(None);
        }
        self.open_data_file(generation).map(Some)
    }

    fn read_slot(&self, generation: u32, bucket: u32) -> KeychainResult<Option<Arc<Vec<u8>>>> {
        if let Some(page) = self.pages.get(&(generation, bucket)) {
            return Ok(Some(page));
        }
        let Some(handle) = self.existing_data_file(generation)? else {
            warn!(generation, bucket, "generation file missing");
            return Ok(None);
        };

        let mut slot = vec![0u8; self.slot_size()];
        {
            let mut file = handle.lock().expect("lock poisoned");
            file.seek(SeekFrom::Start(self.slot_offset(bucket)))?;
            if let Err(e) = file.read_exact(&mut slot) {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    return Err(self.corruption(generation, bucket, "generation file truncated".into()));
                }
                return Err(e.into());
            }
        }
        let page = Arc::new(slot);
        self.pages.put((generation, bucket), page.clone());
        Ok(Some(page))
    }

    fn decode_slot(&self, slot: &[u8], generation: u32, bucket: u32) -> KeychainResult<SectorHeader> {
        SectorHeader::decode(slot).map_err(|e| self.corruption(generation, bucket, e.to_string()))
    }

    fn corruption(&self, generation: u32, bucket: u32, reason: String) -> KeychainError {
        KeychainError::Corruption {
            path: Self::data_path(&self.dir, generation),
            offset: self.slot_offset(bucket),
            reason,
        }
    }

    fn scan(&self, key: &[u8], first_only: bool) -> KeychainResult<Vec<SectorKey>> {
        let stored = compress_key(key, self.config.max_key_size);
        let bucket = self.bucket_of(key);
        let index = self.index.lock().expect("lock poisoned");
        let count = index.generations[bucket as usize];

        let mut found = Vec::new();
        for generation in (0..count).rev() {
            let Some(slot) = self.read_slot(generation, bucket)? else {
                continue;
            };
            let header = self.decode_slot(&slot, generation, bucket)?;
            if header.state != KeyState::Ready || header.length as usize != key.len() {
                continue;
            }
            if &slot[HEADER_SIZE..HEADER_SIZE + stored.len()] != stored.as_ref() {
                continue;
            }
            found.push(SectorKey::from_header(header, key.to_vec()));
            if first_only {
                break;
            }
        }
        debug!(key = %hex::encode(key), bucket, generations = count, found = found.len(), "hashmap scan");
        Ok(found)
    }
}

impl Keychain for HashmapKeychain {
    fn get(&self, key: &[u8]) -> KeychainResult<Option<SectorKey>> {
        Ok(self.scan(key, true)?.into_iter().next())
    }

    fn put(&self, record: &SectorKey) -> KeychainResult<()> {
        let header = record.header()?;
        let stored = compress_key(&record.key, self.config.max_key_size);
        let used = HEADER_SIZE + stored.len();
        let mut slot = vec![0u8; self.slot_size()];
        slot[..HEADER_SIZE].copy_from_slice(&header.encode());
        slot[HEADER_SIZE..used].copy_from_slice(&stored);

        let bucket = self.bucket_of(&record.key);
        let mut index = self.index.lock().expect("lock poisoned");
        let generation = index.generations[bucket as usize];
        let handle = self.open_data_file(generation)?;
        {
            let mut file = handle.lock().expect("lock poisoned");
            file.seek(SeekFrom::Start(self.slot_offset(bucket)))?;
            file.write_all(&slot[..used])?;
            file.flush()?;
            if self.config.sync_mode == SyncMode::EveryWrite {
                file.sync_data()?;
            }
        }
        index.generations[bucket as usize] += 1;
        self.pages.put((generation, bucket), Arc::new(slot));

        debug!(key = %hex::encode(&record.key), bucket, generation, "hashmap put");
        Ok(())
    }

    fn erase(&self, _key: &[u8]) -> KeychainResult<bool> {
        Err(KeychainError::NotImplemented("erase"))
    }

    fn restore(&self, _key: &[u8]) -> KeychainResult<bool> {
        Err(KeychainError::NotImplemented("restore"))
    }

    /// Distinct keys held in ready slots. Keys longer than `max_key_size`
    /// are stored folded and cannot be listed.
    fn keys(&self) -> KeychainResult<Vec<Vec<u8>>> {
        let index = self.index.lock().expect("lock poisoned");
        let mut keys = BTreeSet::new();
        for (bucket, &count) in index.generations.iter().enumerate() {
            let bucket = bucket as u32;
            for generation in 0..count {
                let Some(slot) = self.read_slot(generation, bucket)? else {
                    continue;
                };
                let header = self.decode_slot(&slot, generation, bucket)?;
                let len = header.length as usize;
                if header.state == KeyState::Ready && len <= self.config.max_key_size {
                    keys.insert(slot[HEADER_SIZE..HEADER_SIZE + len].to_vec());
                }
            }
        }
        Ok(keys.into_iter().collect())
    }
}

impl Drop for HashmapKeychain {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.flusher.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("index flush thread panicked");
            }
        }
        if let Err(e) = self.checkpointer.run() {
            warn!(error = %e, "final index checkpoint failed");
        }
    }
}

impl std::fmt::Debug for HashmapKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashmapKeychain")
            .field("dir", &self.dir)
            .field("total_buckets", &self.config.total_buckets)
            .field("open_files", &self.files.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn config() -> HashmapConfig {
        HashmapConfig {
            total_buckets: 16,
            max_key_size: 32,
            max_open_files: 8,
            page_cache_slots: 64,
            flush_interval_ms: 0,
            sync_mode: SyncMode::OsDefault,
        }
    }

    fn open(dir: &Path) -> HashmapKeychain {
        HashmapKeychain::open(dir, config()).unwrap()
    }

    fn record(key: &[u8], start: u32) -> SectorKey {
        SectorKey::ready(key.to_vec(), 0, start, 100)
    }

    fn read_index(dir: &Path) -> Vec<u32> {
        fs::read(HashmapKeychain::index_path(dir))
            .unwrap()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    #[test]
    fn open_creates_index_and_first_generation() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        assert_eq!(read_index(dir.path()), vec![0; 16]);
        let len = fs::metadata(HashmapKeychain::data_path(dir.path(), 0))
            .unwrap()
            .len();
        assert_eq!(len, 16 * 45);
        assert_eq!(chain.file_len(), len);
    }

    #[test]
    fn bucket_uses_zero_padded_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        assert_eq!(chain.bucket_of(b""), 0);
        assert_eq!(chain.bucket_of(&[5]), 5);
        assert_eq!(chain.bucket_of(&[17]), 1);
        assert_eq!(
            chain.bucket_of(b"prefix00-a"),
            chain.bucket_of(b"prefix00-b")
        );
    }

    #[test]
    fn compress_key_halves_until_it_fits() {
        assert_eq!(compress_key(b"short", 8).as_ref(), b"short");

        // One pass: v[i] ^= v[2i] for i < 4, then truncate to 4.
        let key = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(compress_key(&key, 4).as_ref(), &[0, 2 ^ 3, 3 ^ 5, 4 ^ 7]);

        // Truncation never goes below `max`.
        let key = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(compress_key(&key, 6).as_ref(), &[0, 2 ^ 3, 3 ^ 5, 4 ^ 7, 5, 6]);

        // Two passes: 16 -> 8 -> 4.
        assert_eq!(compress_key(&[0u8; 16], 4).len(), 4);
        assert_eq!(compress_key(&[7u8; 100], 32).len(), 32);
    }

    // -----------------------------------------------------------------------
    // Put / get
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(b"alpha", 7)).unwrap();
        assert_eq!(chain.get(b"alpha").unwrap(), Some(record(b"alpha", 7)));
        assert_eq!(chain.get(b"beta").unwrap(), None);
        assert!(chain.has_key(b"alpha").unwrap());
        assert!(!chain.has_key(b"alphabet").unwrap());
    }

    #[test]
    fn newer_generation_shadows_older() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(b"versioned", 1)).unwrap();
        chain.put(&record(b"versioned", 2)).unwrap();
        let bucket = chain.bucket_of(b"versioned");
        assert_eq!(chain.generation_count(bucket), 2);
        assert!(HashmapKeychain::data_path(dir.path(), 1).exists());

        assert_eq!(chain.get(b"versioned").unwrap().unwrap().sector_start, 2);
        let starts: Vec<u32> = chain
            .get_versions(b"versioned")
            .unwrap()
            .iter()
            .map(|k| k.sector_start)
            .collect();
        assert_eq!(starts, vec![2, 1]);
    }

    #[test]
    fn same_bucket_keys_chain_through_generations() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(b"prefix00-a", 1)).unwrap();
        chain.put(&record(b"prefix00-b", 2)).unwrap();
        assert_eq!(chain.get(b"prefix00-a").unwrap().unwrap().sector_start, 1);
        assert_eq!(chain.get(b"prefix00-b").unwrap().unwrap().sector_start, 2);
    }

    #[test]
    fn non_ready_slots_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(b"k", 1)).unwrap();
        chain
            .put(&SectorKey::new(KeyState::Write, b"k".to_vec(), 0, 2, 100))
            .unwrap();
        assert_eq!(chain.get(b"k").unwrap().unwrap().sector_start, 1);
    }

    #[test]
    fn long_keys_are_folded_and_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        let mut a = vec![b'x'; 40];
        let mut b = vec![b'x'; 40];
        a[2] = 1;
        b[2] = 2;
        chain.put(&record(&a, 1)).unwrap();
        chain.put(&record(&b, 2)).unwrap();
        let found = chain.get(&a).unwrap().unwrap();
        assert_eq!(found.key, a);
        assert_eq!(found.sector_start, 1);
        assert_eq!(chain.get(&b).unwrap().unwrap().sector_start, 2);
        assert!(chain.keys().unwrap().is_empty());
    }

    #[test]
    fn keys_lists_distinct_short_keys() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(b"one", 1)).unwrap();
        chain.put(&record(b"one", 2)).unwrap();
        chain.put(&record(b"two", 3)).unwrap();
        assert_eq!(chain.keys().unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn erase_and_restore_are_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(b"k", 1)).unwrap();
        assert!(matches!(
            chain.erase(b"k"),
            Err(KeychainError::NotImplemented("erase"))
        ));
        assert!(matches!(
            chain.restore(b"k"),
            Err(KeychainError::NotImplemented("restore"))
        ));
        assert!(chain.get(b"k").unwrap().is_some());
    }

    #[test]
    fn file_handle_cache_evicts_but_reads_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let chain = HashmapKeychain::open(
            dir.path(),
            HashmapConfig {
                max_open_files: 2,
                page_cache_slots: 1,
                ..config()
            },
        )
        .unwrap();
        for start in 0..5u32 {
            chain.put(&record(b"busy", start)).unwrap();
        }
        let starts: Vec<u32> = chain
            .get_versions(b"busy")
            .unwrap()
            .iter()
            .map(|k| k.sector_start)
            .collect();
        assert_eq!(starts, vec![4, 3, 2, 1, 0]);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn drop_checkpoints_and_reopen_restores() {
        let dir = tempfile::tempdir().unwrap();
        {
            let chain = open(dir.path());
            chain.put(&record(b"durable", 11)).unwrap();
            chain.put(&record(b"durable", 12)).unwrap();
        }
        let chain = open(dir.path());
        let bucket = chain.bucket_of(b"durable");
        assert_eq!(read_index(dir.path())[bucket as usize], 2);
        assert_eq!(chain.get(b"durable").unwrap().unwrap().sector_start, 12);
        assert!(!dir.path().join("_hashmap.index.tmp").exists());
    }

    #[test]
    fn reopen_after_crash_adopts_unindexed_slots() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(&[5], 1)).unwrap();
        chain.put(&record(&[5], 2)).unwrap();
        // No drop, so no final checkpoint.
        std::mem::forget(chain);
        assert_eq!(read_index(dir.path())[5], 0);

        let chain = open(dir.path());
        assert_eq!(chain.generation_count(5), 2);
        assert_eq!(read_index(dir.path())[5], 2);
        assert_eq!(chain.get(&[5]).unwrap().unwrap().sector_start, 2);

        // A sibling in the same bucket lands in a fresh generation.
        chain.put(&record(&[21], 3)).unwrap();
        assert_eq!(chain.generation_count(5), 3);
        let starts: Vec<u32> = chain
            .get_versions(&[5])
            .unwrap()
            .iter()
            .map(|k| k.sector_start)
            .collect();
        assert_eq!(starts, vec![2, 1]);
        assert_eq!(chain.get(&[21]).unwrap().unwrap().sector_start, 3);
    }

    #[test]
    fn missing_index_is_rebuilt_from_data_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let chain = open(dir.path());
            chain.put(&record(b"alpha", 1)).unwrap();
            chain.put(&record(&[3], 2)).unwrap();
        }
        fs::remove_file(HashmapKeychain::index_path(dir.path())).unwrap();

        let chain = open(dir.path());
        assert_eq!(chain.get(b"alpha").unwrap().unwrap().sector_start, 1);
        assert_eq!(chain.get(&[3]).unwrap().unwrap().sector_start, 2);
        assert_eq!(read_index(dir.path())[3], 1);
    }

    #[test]
    fn flush_rewrites_unchanged_index() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        fs::remove_file(HashmapKeychain::index_path(dir.path())).unwrap();
        chain.flush().unwrap();
        assert_eq!(read_index(dir.path()), vec![0; 16]);
    }

    #[test]
    fn explicit_flush_writes_index() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open(dir.path());
        chain.put(&record(&[3], 1)).unwrap();
        assert_eq!(read_index(dir.path())[3], 0);
        chain.flush().unwrap();
        assert_eq!(read_index(dir.path())[3], 1);
    }

    #[test]
    fn background_flusher_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let chain = HashmapKeychain::open(
            dir.path(),
            HashmapConfig {
                flush_interval_ms: 10,
                ..config()
            },
        )
        .unwrap();
        chain.put(&record(&[9], 1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while read_index(dir.path())[9] == 0 {
            assert!(Instant::now() < deadline, "flusher never wrote the index");
            thread::sleep(Duration::from_millis(10));
        }
        drop(chain);
        assert_eq!(read_index(dir.path())[9], 1);
    }

    #[test]
    fn wrong_index_size_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(HashmapKeychain::index_path(dir.path()), [0u8; 7]).unwrap();
        let err = HashmapKeychain::open(dir.path(), config()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = HashmapKeychain::open(
            dir.path(),
            HashmapConfig {
                total_buckets: 0,
                ..config()
            },
        )
        .unwrap_err();
        assert!(matches!(err, KeychainError::Config(_)));
    }

    #[test]
    fn concurrent_puts_and_gets() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(open(dir.path()));
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let chain = chain.clone();
                thread::spawn(move || {
                    for i in 0..10u32 {
                        let key = [t, i as u8, 0xaa];
                        chain.put(&record(&key, i)).unwrap();
                        assert_eq!(chain.get(&key).unwrap().unwrap().sector_start, i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(chain.keys().unwrap().len(), 40);
    }
}
