//! Disk-based WAL Implementation with Group Commit
//!
//! Frame layout: `[len: u32 LE][crc32: u32 LE][bincode(WalEntry)]`.
//! A torn or corrupt tail frame ends replay.

use super::{Lsn, WalEntry, WriteAheadLog};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Configuration for DiskWal
#[derive(Debug, Clone)]
pub struct DiskWalConfig {
    /// Group commit interval in milliseconds
    pub group_commit_ms: u64,
    /// Pending entries that force an early flush
    pub max_batch: usize,
    /// Buffer size for file I/O
    pub buffer_size: usize,
    /// fsync before a commit returns
    pub sync_on_commit: bool,
}

impl Default for DiskWalConfig {
    fn default() -> Self {
        Self {
            group_commit_ms: 10,
            max_batch: 10_000,
            buffer_size: 64 * 1024,
            sync_on_commit: true,
        }
    }
}

struct Shared {
    file: Mutex<BufWriter<File>>,
    pending: Mutex<VecDeque<WalEntry>>,
    signal: Condvar,
    shutdown: AtomicBool,
}

/// Disk-based Write-Ahead Log with group commit
pub struct DiskWal {
    shared: Arc<Shared>,
    path: PathBuf,
    lsn: AtomicU64,
    flush_thread: Option<JoinHandle<()>>,
    config: DiskWalConfig,
}

impl DiskWal {
    pub fn new(dir: &Path) -> Result<Self> {
        Self::with_config(dir, DiskWalConfig::default())
    }

    pub fn with_config(dir: &Path, config: DiskWalConfig) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("wal.log");
        let (existing, valid_len) = Self::read_entries(&path)?;
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        if file.metadata()?.len() > valid_len {
            // Drop a torn tail so new frames are not appended after garbage.
            file.set_len(valid_len)?;
        }

        // Next LSN continues after the last intact entry.
        let next_lsn = existing.last().map(|e| e.lsn + 1).unwrap_or(0);

        let shared = Arc::new(Shared {
            file: Mutex::new(BufWriter::with_capacity(config.buffer_size, file)),
            pending: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let flush_thread = Self::start_flush_thread(Arc::clone(&shared), &config)?;

        Ok(Self {
            shared,
            path,
            lsn: AtomicU64::new(next_lsn),
            flush_thread: Some(flush_thread),
            config,
        })
    }

    fn start_flush_thread(shared: Arc<Shared>, config: &DiskWalConfig) -> Result<JoinHandle<()>> {
        let interval = Duration::from_millis(config.group_commit_ms.max(1));
        let max_batch = config.max_batch;
        let handle = thread::Builder::new()
            .name("sheetgrid-wal".into())
            .spawn(move || loop {
                let mut pending = shared.pending.lock();
                if pending.len() < max_batch && !shared.shutdown.load(Ordering::Acquire) {
                    shared.signal.wait_for(&mut pending, interval);
                }
                if let Err(e) = Self::flush_pending(&shared, pending) {
                    tracing::warn!(error = %e, "wal group commit failed");
                }
                if shared.shutdown.load(Ordering::Acquire) && shared.pending.lock().is_empty() {
                    break;
                }
            })?;
        Ok(handle)
    }

    /// Drain `pending` and write it out. The file lock is taken before the
    /// pending lock is released, so a concurrent `sync` cannot fsync ahead of
    /// entries this call already drained.
    fn flush_pending(shared: &Shared, mut pending: MutexGuard<'_, VecDeque<WalEntry>>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let entries: Vec<WalEntry> = pending.drain(..).collect();
        let mut file = shared.file.lock();
        drop(pending);

        let mut encoded = Vec::new();
        for entry in &entries {
            encoded.extend_from_slice(&Self::encode_entry(entry)?);
        }
        file.write_all(&encoded)?;
        file.flush()?;
        Ok(())
    }

    fn encode_entry(entry: &WalEntry) -> Result<Vec<u8>> {
        let payload = bincode::serialize(entry)?;
        let mut buf = Vec::with_capacity(payload.len() + 8);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode intact frames; also returns the byte length they cover.
    fn read_entries(path: &Path) -> Result<(Vec<WalEntry>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((vec![], 0)),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        let mut header = [0u8; 8];

        loop {
            if reader.read_exact(&mut header).is_err() {
                break;
            }
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if len == 0 || len > MAX_FRAME {
                break;
            }
            let mut payload = vec![0u8; len];
            if reader.read_exact(&mut payload).is_err() {
                break;
            }
            if crc32fast::hash(&payload) != crc {
                tracing::warn!(offset_entries = entries.len(), "wal checksum mismatch, truncating replay");
                break;
            }
            match bincode::deserialize::<WalEntry>(&payload) {
                Ok(entry) => entries.push(entry),
                Err(_) => break,
            }
            valid_len += 8 + len as u64;
        }
        Ok((entries, valid_len))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DiskWal {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal.notify_all();
        if let Some(handle) = self.flush_thread.take() {
            let _ = handle.join();
        }
    }
}

impl WriteAheadLog for DiskWal {
    fn append(&self, entry: &WalEntry) -> Result<Lsn> {
        self.append_batch(std::slice::from_ref(entry))
    }

    fn append_batch(&self, entries: &[WalEntry]) -> Result<Lsn> {
        if entries.is_empty() {
            return Ok(self.current_lsn());
        }
        let start = self.lsn.fetch_add(entries.len() as u64, Ordering::SeqCst);
        let mut pending = self.shared.pending.lock();
        for (i, entry) in entries.iter().enumerate() {
            pending.push_back(WalEntry { lsn: start + i as u64, ..entry.clone() });
        }
        if pending.len() >= self.config.max_batch {
            self.shared.signal.notify_one();
        }
        Ok(start + entries.len() as u64 - 1)
    }

    fn sync(&self) -> Result<()> {
        Self::flush_pending(&self.shared, self.shared.pending.lock())?;
        let file = self.shared.file.lock();
        file.get_ref().sync_all().map_err(Error::from)
    }

    fn sync_on_commit(&self) -> bool {
        self.config.sync_on_commit
    }

    fn replay_from(&self, from: Lsn) -> Result<Vec<WalEntry>> {
        self.sync()?;
        let (mut entries, _) = Self::read_entries(&self.path)?;
        entries.retain(|e| e.lsn >= from);
        Ok(entries)
    }

    fn current_lsn(&self) -> Lsn {
        self.lsn.load(Ordering::Relaxed)
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalOp;
    use tempfile::tempdir;

    fn put(row_id: u64) -> WalEntry {
        WalEntry::new(WalOp::PutRow {
            table: "people".into(),
            row_id,
            data: format!(r#"{{"age":{}}}"#, row_id),
            created_at_us: 0,
            updated_at_us: 0,
        })
    }

    #[test]
    fn test_disk_wal_append_and_replay() {
        let dir = tempdir().unwrap();
        let wal = DiskWal::new(dir.path()).unwrap();

        assert_eq!(wal.append(&put(1)).unwrap(), 0);
        wal.sync().unwrap();

        let entries = wal.replay_from(0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op, put(1).op);
    }

    #[test]
    fn test_group_commit_flushes_in_background() {
        let dir = tempdir().unwrap();
        let config = DiskWalConfig {
            group_commit_ms: 5,
            max_batch: 100,
            sync_on_commit: false,
            ..Default::default()
        };
        let wal = DiskWal::with_config(dir.path(), config).unwrap();
        let batch: Vec<WalEntry> = (0..250).map(put).collect();
        wal.append_batch(&batch).unwrap();

        std::thread::sleep(Duration::from_millis(100));
        let on_disk = std::fs::metadata(dir.path().join("wal.log")).unwrap().len();
        assert!(on_disk > 0);
    }

    #[test]
    fn test_lsn_continues_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let wal = DiskWal::new(dir.path()).unwrap();
            wal.append_batch(&[put(1), put(2), put(3)]).unwrap();
            wal.sync().unwrap();
        }
        let wal = DiskWal::new(dir.path()).unwrap();
        assert_eq!(wal.current_lsn(), 3);
        assert_eq!(wal.replay_from(1).unwrap().len(), 2);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let dir = tempdir().unwrap();
        {
            let wal = DiskWal::new(dir.path()).unwrap();
            wal.append_batch(&[put(1), put(2)]).unwrap();
            wal.sync().unwrap();
        }
        let log = dir.path().join("wal.log");
        let mut f = OpenOptions::new().append(true).open(&log).unwrap();
        f.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        drop(f);

        let wal = DiskWal::new(dir.path()).unwrap();
        assert_eq!(wal.replay_from(0).unwrap().len(), 2);
    }
}
