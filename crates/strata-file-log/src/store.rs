use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{
    error::{Result, StrataError},
    traits::{Backend, EntryStore},
    types::{Entry, EntryId, Fields},
};

/// Record header: [ms: u64][seq: u64][size: u32]
const HEADER_LEN: u64 = 8 + 8 + 4;

/// Configuration for file-based logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLogConfig {
    /// Base directory; each log gets its own subdirectory
    pub base_dir: PathBuf,

    /// Maximum size of a single segment file before rotation (bytes)
    #[serde(default = "default_max_segment_size")]
    pub max_segment_size: u64,

    /// Buffer size for writes
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Maximum size of a single encoded entry (bytes)
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// Whether to flush the write buffer after each append (default: true).
    ///
    /// When `false`, entries still in the buffer are lost on a process crash;
    /// the segment file itself stays readable.
    #[serde(default = "default_true")]
    pub flush_on_append: bool,
}

fn default_max_segment_size() -> u64 {
    64 * 1024 * 1024
}

fn default_write_buffer_size() -> usize {
    64 * 1024
}

fn default_max_record_size() -> usize {
    4 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self::new("./data/strata")
    }
}

impl FileLogConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_segment_size: default_max_segment_size(),
            write_buffer_size: default_write_buffer_size(),
            max_record_size: default_max_record_size(),
            flush_on_append: true,
        }
    }

    pub fn with_max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    pub fn with_flush_on_append(mut self, flush: bool) -> Self {
        self.flush_on_append = flush;
        self
    }
}

/// Per-segment bookkeeping kept in meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentMeta {
    num: u64,
    last_id: Option<EntryId>,
}

/// Metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LogMeta {
    /// Log name (the directory name is an encoding of it)
    name: String,

    /// Highest ID ever appended
    last_assigned: EntryId,

    /// Entries with an ID below this were trimmed
    trimmed_before: EntryId,

    /// Segments still on disk, oldest first
    segments: Vec<SegmentMeta>,

    /// Engine metadata documents (group state and the like)
    kv: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
struct Location {
    segment: u64,
    offset: u64,
}

struct StoreState {
    meta: LogMeta,
    index: BTreeMap<EntryId, Location>,
}

struct SegmentWriter {
    segment: u64,
    offset: u64,
    writer: BufWriter<File>,
}

/// A single log stored as a sequence of segment files.
///
/// Entries are indexed in memory by ID and read back from disk on demand.
/// Trimming drops index entries immediately and deletes whole segments once
/// every entry in them is below the trim boundary.
pub struct FileEntryStore {
    dir: PathBuf,
    config: FileLogConfig,
    state: RwLock<StoreState>,
    writer: Mutex<SegmentWriter>,
    /// Serializes meta.json rewrites
    meta_io: Mutex<()>,
}

impl FileEntryStore {
    /// Open or create the log stored in `dir`
    pub fn open(dir: impl Into<PathBuf>, name: &str, config: FileLogConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join("meta.json");
        let mut meta: LogMeta = if meta_path.exists() {
            let data = std::fs::read(&meta_path)?;
            serde_json::from_slice(&data)
                .map_err(|e| StrataError::Corrupt(format!("Failed to parse meta.json: {}", e)))?
        } else {
            LogMeta {
                name: name.to_string(),
                segments: vec![SegmentMeta {
                    num: 0,
                    last_id: None,
                }],
                ..LogMeta::default()
            }
        };
        if meta.segments.is_empty() {
            meta.segments.push(SegmentMeta {
                num: 0,
                last_id: None,
            });
        }

        let mut index = BTreeMap::new();
        let mut tail_offset = 0;
        let segment_nums: Vec<u64> = meta.segments.iter().map(|s| s.num).collect();
        for (pos, num) in segment_nums.iter().enumerate() {
            let is_tail = pos + 1 == segment_nums.len();
            let (last_id, end_offset) =
                Self::recover_segment(&dir, *num, is_tail, &meta, &mut index, &config)?;
            if let Some(last) = last_id {
                if last > meta.last_assigned {
                    meta.last_assigned = last;
                }
            }
            meta.segments[pos].last_id = last_id.or(meta.segments[pos].last_id);
            if is_tail {
                tail_offset = end_offset;
            }
        }

        let current = *segment_nums.last().unwrap_or(&0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::segment_path(&dir, current))?;
        let writer = SegmentWriter {
            segment: current,
            offset: tail_offset,
            writer: BufWriter::with_capacity(config.write_buffer_size, file),
        };

        tracing::debug!(
            log = %meta.name,
            entries = index.len(),
            last_assigned = %meta.last_assigned,
            "Opened file log"
        );

        let store = Self {
            dir,
            config,
            state: RwLock::new(StoreState { meta, index }),
            writer: Mutex::new(writer),
            meta_io: Mutex::new(()),
        };
        store.save_meta()?;
        Ok(store)
    }

    fn segment_path(dir: &Path, num: u64) -> PathBuf {
        dir.join(format!("segment-{:08}.log", num))
    }

    /// Scan one segment into the index.
    ///
    /// A torn record at the end of the tail segment (crash mid-write) is cut
    /// off; anywhere else it means the log is corrupt.
    fn recover_segment(
        dir: &Path,
        num: u64,
        is_tail: bool,
        meta: &LogMeta,
        index: &mut BTreeMap<EntryId, Location>,
        config: &FileLogConfig,
    ) -> Result<(Option<EntryId>, u64)> {
        let path = Self::segment_path(dir, num);
        if !path.exists() {
            return Ok((None, 0));
        }

        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut offset = 0u64;
        let mut last_id = None;

        loop {
            if offset == file_len {
                break;
            }
            match Self::read_record_at(&mut file, offset, config.max_record_size) {
                Ok((id, len)) => {
                    if id >= meta.trimmed_before {
                        index.insert(
                            id,
                            Location {
                                segment: num,
                                offset,
                            },
                        );
                    }
                    last_id = Some(id);
                    offset += HEADER_LEN + len as u64;
                }
                Err(StrataError::Io(e))
                    if is_tail && e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    tracing::warn!(
                        segment = %path.display(),
                        offset,
                        "Truncating torn record at end of segment"
                    );
                    drop(file);
                    let f = OpenOptions::new().write(true).open(&path)?;
                    f.set_len(offset)?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((last_id, offset))
    }

    /// Read the header at `offset` and skip over the payload.
    fn read_record_at(file: &mut File, offset: u64, max_size: usize) -> Result<(EntryId, u32)> {
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        let (id, size) = Self::decode_header(&header);
        if size as usize > max_size {
            return Err(StrataError::Corrupt(format!(
                "Entry {} size {} exceeds max_record_size {}",
                id, size, max_size
            )));
        }
        let end = offset + HEADER_LEN + size as u64;
        if end > file.metadata()?.len() {
            return Err(StrataError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "record extends past end of segment",
            )));
        }
        Ok((id, size))
    }

    fn decode_header(header: &[u8; HEADER_LEN as usize]) -> (EntryId, u32) {
        let mut ms = [0u8; 8];
        let mut seq = [0u8; 8];
        let mut size = [0u8; 4];
        ms.copy_from_slice(&header[0..8]);
        seq.copy_from_slice(&header[8..16]);
        size.copy_from_slice(&header[16..20]);
        (
            EntryId::new(u64::from_be_bytes(ms), u64::from_be_bytes(seq)),
            u32::from_be_bytes(size),
        )
    }

    /// Read the full entry stored at a location
    fn read_entry(&self, file: &mut File, loc: Location) -> Result<Entry> {
        let (id, size) = Self::read_record_at(file, loc.offset, self.config.max_record_size)?;
        let mut data = vec![0u8; size as usize];
        file.read_exact(&mut data)?;
        let fields: Fields = serde_json::from_slice(&data)
            .map_err(|e| StrataError::Corrupt(format!("Entry {} is not decodable: {}", id, e)))?;
        Ok(Entry::new(id, fields))
    }

    fn read_locations(&self, locations: Vec<Location>) -> Result<Vec<Entry>> {
        // Buffered appends must be visible to the reader
        self.writer.lock().writer.flush()?;

        let mut entries = Vec::with_capacity(locations.len());
        let mut open: Option<(u64, Option<File>)> = None;
        for loc in locations {
            let reusable = matches!(&open, Some((num, _)) if *num == loc.segment);
            if !reusable {
                // A segment deleted since the index was read held only
                // trimmed entries
                let file = match File::open(Self::segment_path(&self.dir, loc.segment)) {
                    Ok(file) => Some(file),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => return Err(e.into()),
                };
                open = Some((loc.segment, file));
            }
            if let Some((_, Some(file))) = open.as_mut() {
                entries.push(self.read_entry(file, loc)?);
            }
        }
        Ok(entries)
    }

    /// Save metadata to disk (write-then-rename)
    fn save_meta(&self) -> Result<()> {
        let _io = self.meta_io.lock();
        let data = serde_json::to_vec(&self.state.read().meta)?;
        let tmp = self.dir.join("meta.json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, self.dir.join("meta.json"))?;
        Ok(())
    }

    /// Close the current segment and start a new one
    fn rotate(&self, writer: &mut SegmentWriter) -> Result<()> {
        writer.writer.flush()?;
        let old = writer.segment;
        let next = old + 1;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::segment_path(&self.dir, next))?;
        writer.writer = BufWriter::with_capacity(self.config.write_buffer_size, file);
        writer.segment = next;
        writer.offset = 0;

        self.state.write().meta.segments.push(SegmentMeta {
            num: next,
            last_id: None,
        });
        self.save_meta()?;

        tracing::info!(
            dir = %self.dir.display(),
            from = old,
            to = next,
            "Rotated log segment"
        );
        Ok(())
    }

    /// Number of segment files currently on disk
    pub fn segment_count(&self) -> usize {
        self.state.read().meta.segments.len()
    }

    /// Directory holding this log's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EntryStore for FileEntryStore {
    fn append(&self, entry: &Entry) -> Result<()> {
        let payload = serde_json::to_vec(&entry.fields)?;
        if payload.len() > self.config.max_record_size || payload.len() > u32::MAX as usize {
            return Err(StrataError::InvalidEntry(format!(
                "Encoded entry size {} exceeds max_record_size {}",
                payload.len(),
                self.config.max_record_size
            )));
        }

        let mut writer = self.writer.lock();
        if writer.offset > 0 && writer.offset >= self.config.max_segment_size {
            self.rotate(&mut writer)?;
        }

        let mut record = Vec::with_capacity(HEADER_LEN as usize + payload.len());
        record.extend_from_slice(&entry.id.ms.to_be_bytes());
        record.extend_from_slice(&entry.id.seq.to_be_bytes());
        record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        record.extend_from_slice(&payload);
        writer.writer.write_all(&record)?;
        if self.config.flush_on_append {
            writer.writer.flush()?;
        }

        let loc = Location {
            segment: writer.segment,
            offset: writer.offset,
        };
        writer.offset += record.len() as u64;

        let mut state = self.state.write();
        state.index.insert(entry.id, loc);
        if entry.id > state.meta.last_assigned {
            state.meta.last_assigned = entry.id;
        }
        if let Some(seg) = state.meta.segments.last_mut() {
            seg.last_id = Some(entry.id);
        }
        Ok(())
    }

    fn range(&self, start: EntryId, end: EntryId, limit: Option<usize>) -> Result<Vec<Entry>> {
        if start > end {
            return Ok(Vec::new());
        }
        let locations: Vec<Location> = {
            let state = self.state.read();
            let iter = state.index.range(start..=end).map(|(_, loc)| *loc);
            match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        };
        self.read_locations(locations)
    }

    fn count_range(&self, start: EntryId, end: EntryId) -> Result<u64> {
        if start > end {
            return Ok(0);
        }
        Ok(self.state.read().index.range(start..=end).count() as u64)
    }

    fn get(&self, id: EntryId) -> Result<Option<Entry>> {
        let loc = self.state.read().index.get(&id).copied();
        match loc {
            Some(loc) => Ok(self.read_locations(vec![loc])?.pop()),
            None => Ok(None),
        }
    }

    fn len(&self) -> Result<u64> {
        Ok(self.state.read().index.len() as u64)
    }

    fn first_id(&self) -> Result<Option<EntryId>> {
        Ok(self.state.read().index.keys().next().copied())
    }

    fn last_retained_id(&self) -> Result<Option<EntryId>> {
        Ok(self.state.read().index.keys().next_back().copied())
    }

    fn last_assigned_id(&self) -> Result<EntryId> {
        Ok(self.state.read().meta.last_assigned)
    }

    fn nth_id(&self, n: u64) -> Result<Option<EntryId>> {
        Ok(self.state.read().index.keys().nth(n as usize).copied())
    }

    fn remove_before(&self, boundary: EntryId) -> Result<u64> {
        // Held throughout so a rotation cannot slip a fresh segment in
        // between picking the doomed segments and deleting them
        let writer = self.writer.lock();
        let current_segment = writer.segment;

        let (removed, doomed) = {
            let mut state = self.state.write();
            let kept = state.index.split_off(&boundary);
            let removed = state.index.len() as u64;
            state.index = kept;
            if boundary > state.meta.trimmed_before {
                state.meta.trimmed_before = boundary;
            }

            let mut doomed = Vec::new();
            state.meta.segments.retain(|seg| {
                let fully_trimmed = seg.num != current_segment
                    && seg.last_id.map_or(true, |last| last < boundary);
                if fully_trimmed {
                    doomed.push(seg.num);
                }
                !fully_trimmed
            });
            (removed, doomed)
        };

        self.save_meta()?;
        for num in &doomed {
            let path = Self::segment_path(&self.dir, *num);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        if !doomed.is_empty() {
            tracing::info!(
                dir = %self.dir.display(),
                segments = doomed.len(),
                "Deleted fully trimmed segments"
            );
        }
        drop(writer);

        Ok(removed)
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.state.read().meta.kv.get(key) {
            Some(value) => Ok(Some(serde_json::to_vec(value)?)),
            None => Ok(None),
        }
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        let value: serde_json::Value = serde_json::from_slice(value)?;
        self.state
            .write()
            .meta
            .kv
            .insert(key.to_string(), value);
        self.save_meta()
    }

    fn sync(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.writer.flush()?;
            writer.writer.get_ref().sync_all()?;
        }
        self.save_meta()
    }
}

/// Ensure buffered entries and metadata reach disk on drop
impl Drop for FileEntryStore {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to sync log on drop");
        }
    }
}

/// Backend that keeps one directory per log under `base_dir`
pub struct FileBackend {
    config: FileLogConfig,
    open: Mutex<HashMap<String, Arc<FileEntryStore>>>,
}

impl FileBackend {
    pub fn open(config: FileLogConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        Ok(Self {
            config,
            open: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &FileLogConfig {
        &self.config
    }

    /// Log names may hold any character, so directories use a hex encoding
    fn log_dir(&self, name: &str) -> PathBuf {
        let encoded: String = name.bytes().map(|b| format!("{:02x}", b)).collect();
        self.config.base_dir.join(format!("log-{}", encoded))
    }

    fn decode_dir_name(dir_name: &str) -> Option<String> {
        let hex = dir_name.strip_prefix("log-")?;
        if hex.len() % 2 != 0 {
            return None;
        }
        let bytes: Option<Vec<u8>> = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect();
        String::from_utf8(bytes?).ok()
    }
}

impl Backend for FileBackend {
    fn open_log(&self, name: &str, create: bool) -> Result<Option<Arc<dyn EntryStore>>> {
        let mut open = self.open.lock();
        if let Some(store) = open.get(name) {
            return Ok(Some(store.clone() as Arc<dyn EntryStore>));
        }

        let dir = self.log_dir(name);
        if !create && !dir.join("meta.json").exists() {
            return Ok(None);
        }

        let store = Arc::new(FileEntryStore::open(dir, name, self.config.clone())?);
        open.insert(name.to_string(), store.clone());
        Ok(Some(store as Arc<dyn EntryStore>))
    }

    fn list_logs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dir_entry in std::fs::read_dir(&self.config.base_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = dir_entry.file_name();
            if let Some(name) = file_name.to_str().and_then(Self::decode_dir_name) {
                if dir_entry.path().join("meta.json").exists() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn sync_all(&self) -> Result<()> {
        let stores: Vec<Arc<FileEntryStore>> = self.open.lock().values().cloned().collect();
        for store in stores {
            store.sync()?;
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
