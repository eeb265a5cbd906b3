//! Paired, atomic persistence of a polygon store and its spatial index.
//!
//! Each half is written to a `.tmp` sibling, fsynced, then renamed into
//! place; the parent directory is fsynced last. Both files carry the same
//! generation id in their header. A crash between the two renames leaves
//! halves with different ids, which [`GenerationFiles::load`] rejects, so
//! an inconsistent pair is never served.

use crate::error::{Result, TzError};
use crate::storage::{PolygonStore, SpatialIndex};
use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const ARTIFACT_VERSION: u8 = 1;

/// Version byte, generation id, creation secs and nanos, entry count.
const HEADER_LEN: u64 = 1 + 16 + 8 + 4 + 8;

pub(crate) const STORE_FILE: &str = "zones.store";
pub(crate) const INDEX_FILE: &str = "zones.idx";

/// Header written in front of each persisted half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArtifactHeader {
    pub(crate) generation: Uuid,
    pub(crate) created_at: SystemTime,
    pub(crate) entry_count: u64,
}

impl ArtifactHeader {
    pub(crate) fn new(generation: Uuid, entry_count: u64) -> Self {
        Self {
            generation,
            created_at: SystemTime::now(),
            entry_count,
        }
    }
}

/// Identity of a loaded or freshly built generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationInfo {
    pub id: Uuid,
    pub created_at: SystemTime,
}

/// A store/index pair read back from disk.
#[derive(Debug)]
pub(crate) struct LoadedGeneration {
    pub(crate) info: GenerationInfo,
    pub(crate) store: PolygonStore,
    pub(crate) index: SpatialIndex,
}

/// The artifact files of one cache directory.
#[derive(Debug, Clone)]
pub(crate) struct GenerationFiles {
    dir: PathBuf,
}

impl GenerationFiles {
    pub(crate) fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn artifact_paths(&self) -> [PathBuf; 4] {
        let store = self.store_path();
        let index = self.index_path();
        [temp_path(&store), temp_path(&index), store, index]
    }

    /// All artifact files present. This is the load-versus-build signal.
    pub(crate) fn exists(&self) -> bool {
        self.store_path().is_file() && self.index_path().is_file()
    }

    /// Creates the cache directory if needed.
    pub(crate) fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Deletes both halves and any leftover temp files. Missing files are
    /// not an error; every path is attempted even if one fails.
    pub(crate) fn remove(&self) -> Result<()> {
        let mut first_error = None;
        for path in self.artifact_paths() {
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("Failed to remove {}: {}", path.display(), e);
                    first_error.get_or_insert(TzError::persistence(
                        &format!("removing {}", path.display()),
                        e,
                    ));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Persists a new generation. On failure every artifact of this cache
    /// directory is removed before the error is returned.
    pub(crate) fn save(
        &self,
        store: &PolygonStore,
        index: &SpatialIndex,
    ) -> Result<GenerationInfo> {
        let result = self.write_pair(store, index);
        if result.is_err()
            && let Err(cleanup) = self.remove()
        {
            log::warn!("Failed to clean up partial generation: {}", cleanup);
        }
        result
    }

    fn write_pair(&self, store: &PolygonStore, index: &SpatialIndex) -> Result<GenerationInfo> {
        self.ensure_dir()?;

        let generation = Uuid::new_v4();
        let store_header = ArtifactHeader::new(generation, store.len() as u64);
        let index_header = ArtifactHeader {
            entry_count: index.len() as u64,
            ..store_header
        };

        let store_path = self.store_path();
        let index_path = self.index_path();
        let store_tmp = temp_path(&store_path);
        let index_tmp = temp_path(&index_path);

        store.persist(&store_tmp, &store_header)?;
        index.persist(&index_tmp, &index_header)?;

        rename(&store_tmp, &store_path)?;
        rename(&index_tmp, &index_path)?;
        self.sync_dir()?;

        log::info!(
            "Persisted generation {} ({} zones) to {}",
            generation,
            store.len(),
            self.dir.display()
        );

        Ok(GenerationInfo {
            id: generation,
            created_at: store_header.created_at,
        })
    }

    /// Loads both halves and checks that they belong together.
    pub(crate) fn load(&self) -> Result<LoadedGeneration> {
        if !self.exists() {
            return Err(TzError::GenerationMissing(self.dir.display().to_string()));
        }

        let (store_header, store) = PolygonStore::load(&self.store_path())?;
        let (index_header, index) = SpatialIndex::load(&self.index_path())?;

        if store_header.generation != index_header.generation {
            return Err(TzError::Persistence(format!(
                "store generation {} does not match index generation {}",
                store_header.generation, index_header.generation
            )));
        }

        if let Some(max_id) = index.max_id()
            && !store.contains(max_id)
        {
            return Err(TzError::Persistence(format!(
                "index references zone {} but the store holds {} zones",
                max_id,
                store.len()
            )));
        }

        log::info!(
            "Loaded generation {} ({} zones, {} index entries) from {}",
            store_header.generation,
            store.len(),
            index.len(),
            self.dir.display()
        );

        Ok(LoadedGeneration {
            info: GenerationInfo {
                id: store_header.generation,
                created_at: store_header.created_at,
            },
            store,
            index,
        })
    }

    fn sync_dir(&self) -> Result<()> {
        // Directories cannot be opened for syncing on every platform.
        #[cfg(unix)]
        {
            let dir = File::open(&self.dir)
                .map_err(|e| TzError::persistence("opening cache directory", e))?;
            dir.sync_all()
                .map_err(|e| TzError::persistence("syncing cache directory", e))?;
        }
        Ok(())
    }
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    if let Some(name) = temp.file_name() {
        let mut new_name = name.to_string_lossy().into_owned();
        new_name.push_str(".tmp");
        temp.set_file_name(new_name);
    }
    temp
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| {
        TzError::persistence(
            &format!("renaming {} to {}", from.display(), to.display()),
            e,
        )
    })
}

/// Writes `magic`, the header and the bincode payload to `path`, then fsyncs.
pub(crate) fn write_artifact<T: Serialize + ?Sized>(
    path: &Path,
    magic: &[u8],
    header: &ArtifactHeader,
    payload: &T,
) -> Result<()> {
    let context = format!("writing {}", path.display());
    let err = |e: io::Error| TzError::persistence(&context, e);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(err)?;

    let mut writer = BufWriter::new(file);

    writer.write_all(magic).map_err(err)?;
    writer.write_all(&[ARTIFACT_VERSION]).map_err(err)?;
    writer
        .write_all(header.generation.as_bytes())
        .map_err(err)?;

    let created = header
        .created_at
        .duration_since(UNIX_EPOCH)
        .map_err(|e| TzError::persistence(&context, e))?;
    write_u64(&mut writer, created.as_secs()).map_err(err)?;
    write_u32(&mut writer, created.subsec_nanos()).map_err(err)?;
    write_u64(&mut writer, header.entry_count).map_err(err)?;

    bincode::serialize_into(&mut writer, payload)
        .map_err(|e| TzError::persistence(&context, e))?;

    writer.flush().map_err(err)?;
    let file = writer.into_inner().map_err(|e| err(e.into_error()))?;
    file.sync_all().map_err(err)?;

    Ok(())
}

/// Reads back what [`write_artifact`] wrote, checking magic and version.
pub(crate) fn read_artifact<T: DeserializeOwned>(
    path: &Path,
    magic: &[u8],
) -> Result<(ArtifactHeader, T)> {
    let context = format!("reading {}", path.display());
    let err = |e: io::Error| TzError::persistence(&context, e);

    let file = File::open(path).map_err(err)?;
    let file_len = file.metadata().map_err(err)?.len();
    let mut reader = BufReader::new(file);

    let mut found = vec![0u8; magic.len()];
    reader.read_exact(&mut found).map_err(err)?;
    if found != magic {
        return Err(TzError::Persistence(format!(
            "{}: not a geotz artifact (bad magic)",
            path.display()
        )));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version).map_err(err)?;
    if version[0] != ARTIFACT_VERSION {
        return Err(TzError::Persistence(format!(
            "{}: unsupported artifact version {}",
            path.display(),
            version[0]
        )));
    }

    let mut uuid_bytes = [0u8; 16];
    reader.read_exact(&mut uuid_bytes).map_err(err)?;

    let created_secs = read_u64(&mut reader).map_err(err)?;
    let created_nanos = read_u32(&mut reader).map_err(err)?;
    if created_nanos >= 1_000_000_000 {
        return Err(TzError::Persistence(format!(
            "{}: corrupt creation timestamp",
            path.display()
        )));
    }
    let entry_count = read_u64(&mut reader).map_err(err)?;

    // Length prefixes in a damaged payload must not exceed what the file holds.
    let payload_len = file_len.saturating_sub(magic.len() as u64 + HEADER_LEN);
    let payload: T = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(payload_len)
        .deserialize_from(&mut reader)
        .map_err(|e| TzError::persistence(&context, e))?;

    let created_at = UNIX_EPOCH
        .checked_add(Duration::new(created_secs, created_nanos))
        .ok_or_else(|| {
            TzError::Persistence(format!("{}: corrupt creation timestamp", path.display()))
        })?;

    let header = ArtifactHeader {
        generation: Uuid::from_bytes(uuid_bytes),
        created_at,
        entry_count,
    };

    Ok((header, payload))
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
