//! Sources of the raw timezone boundary dataset.
//!
//! A [`DatasetSource`] produces a file on disk holding the dataset, either
//! plain GeoJSON, a gzip-compressed GeoJSON or a ZIP archive containing a
//! `.geojson`/`.json` member. [`open_dataset`] sniffs the format and returns
//! a reader over the GeoJSON text.

use crate::error::{Result, TzError};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "download")]
pub use http::HttpSource;

/// Name of the downloaded archive inside the cache directory.
pub const DOWNLOAD_FILE: &str = "dataset.download";

/// Cooperative cancellation flag shared between a build and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(TzError::Cancelled)` once [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TzError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A fetched dataset file.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub path: PathBuf,
    /// The file was created by the fetch and may be deleted after the build.
    pub temporary: bool,
}

/// Something that can hand the build pipeline a dataset file.
pub trait DatasetSource: Send + Sync {
    /// Fetches the dataset. `workdir` is the cache directory; sources that
    /// download place their file there. Long-running fetches must honour
    /// `cancel` and leave no partial file behind when they fail.
    fn fetch(&self, workdir: &Path, cancel: &CancelToken) -> Result<RawDataset>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// A dataset already present on the local filesystem. Never deleted.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSource for FileSource {
    fn fetch(&self, _workdir: &Path, cancel: &CancelToken) -> Result<RawDataset> {
        cancel.check()?;
        if !self.path.is_file() {
            return Err(TzError::Download(format!(
                "dataset file {} does not exist",
                self.path.display()
            )));
        }
        Ok(RawDataset {
            path: self.path.clone(),
            temporary: false,
        })
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Gzip,
    Plain,
}

fn sniff(file: &mut File) -> Result<ArchiveKind> {
    let mut magic = [0u8; 4];
    let mut read = 0;
    while read < magic.len() {
        let n = file.read(&mut magic[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    file.seek(SeekFrom::Start(0))?;

    Ok(match &magic[..read] {
        [0x50, 0x4b, 0x03, 0x04] => ArchiveKind::Zip,
        [0x1f, 0x8b, ..] => ArchiveKind::Gzip,
        _ => ArchiveKind::Plain,
    })
}

/// Opens a dataset file and returns a reader over its GeoJSON text.
pub fn open_dataset(path: &Path) -> Result<Box<dyn Read>> {
    let mut file = File::open(path).map_err(|e| {
        TzError::Download(format!("cannot open dataset {}: {}", path.display(), e))
    })?;

    match sniff(&mut file)? {
        ArchiveKind::Plain => Ok(Box::new(BufReader::new(file))),
        #[cfg(feature = "download")]
        ArchiveKind::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(BufReader::new(
            file,
        )))),
        #[cfg(feature = "download")]
        ArchiveKind::Zip => http::open_zip_member(file, path),
        #[cfg(not(feature = "download"))]
        kind => Err(TzError::DatasetFormat(format!(
            "{} is a {:?} archive; enable the 'download' feature to unpack it",
            path.display(),
            kind
        ))),
    }
}

#[cfg(feature = "download")]
mod http {
    use super::{CancelToken, DOWNLOAD_FILE, DatasetSource, RawDataset};
    use crate::config::Config;
    use crate::error::{Result, TzError};
    use reqwest::blocking::Client;
    use std::fs::{self, File};
    use std::io::{BufWriter, Cursor, Read, Write};
    use std::path::Path;
    use std::time::Duration;

    const CHUNK_SIZE: usize = 64 * 1024;
    const MAX_SIZE_HINT: u64 = 64 * 1024 * 1024;

    /// Downloads the dataset over HTTP(S) into the cache directory.
    #[derive(Clone)]
    pub struct HttpSource {
        client: Client,
        url: String,
        timeout: Duration,
    }

    impl std::fmt::Debug for HttpSource {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HttpSource")
                .field("url", &self.url)
                .field("timeout", &self.timeout)
                .finish()
        }
    }

    impl HttpSource {
        pub fn new(config: &Config) -> Result<Self> {
            let client = Client::builder()
                .timeout(config.download_timeout())
                .connect_timeout(config.connect_timeout())
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| TzError::Download(format!("failed to create HTTP client: {}", e)))?;

            Ok(Self {
                client,
                url: config.dataset_url.clone(),
                timeout: config.download_timeout(),
            })
        }

        pub fn url(&self) -> &str {
            &self.url
        }

        fn download(&self, target: &Path, cancel: &CancelToken) -> Result<u64> {
            let mut response = self.client.get(&self.url).send().map_err(|e| {
                if e.is_timeout() {
                    TzError::Download(format!(
                        "timed out after {}s fetching {}",
                        self.timeout.as_secs(),
                        self.url
                    ))
                } else {
                    TzError::Download(format!("request to {} failed: {}", self.url, e))
                }
            })?;

            if !response.status().is_success() {
                return Err(TzError::Download(format!(
                    "HTTP {} for {}",
                    response.status(),
                    self.url
                )));
            }

            let file = File::create(target)?;
            let mut writer = BufWriter::new(file);
            let mut buf = vec![0u8; CHUNK_SIZE];
            let mut total = 0u64;

            loop {
                cancel.check()?;
                let n = response.read(&mut buf).map_err(|e| {
                    TzError::Download(format!("reading body of {} failed: {}", self.url, e))
                })?;
                if n == 0 {
                    break;
                }
                writer.write_all(&buf[..n])?;
                total += n as u64;
            }

            writer.flush()?;
            Ok(total)
        }
    }

    impl DatasetSource for HttpSource {
        fn fetch(&self, workdir: &Path, cancel: &CancelToken) -> Result<RawDataset> {
            let target = workdir.join(DOWNLOAD_FILE);
            log::info!("Downloading timezone boundaries from {}", self.url);

            match self.download(&target, cancel) {
                Ok(bytes) => {
                    log::info!("Downloaded {} bytes to {}", bytes, target.display());
                    Ok(RawDataset {
                        path: target,
                        temporary: true,
                    })
                }
                Err(e) => {
                    if let Err(rm) = fs::remove_file(&target)
                        && rm.kind() != std::io::ErrorKind::NotFound
                    {
                        log::warn!("Failed to remove partial download: {}", rm);
                    }
                    Err(e)
                }
            }
        }

        fn describe(&self) -> String {
            self.url.clone()
        }
    }

    /// Reads the first `.geojson` (or `.json`) member of a ZIP archive.
    pub(super) fn open_zip_member(file: File, path: &Path) -> Result<Box<dyn Read>> {
        let zip_err =
            |e: zip::result::ZipError| TzError::DatasetFormat(format!("{}: {}", path.display(), e));

        let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

        let mut member = None;
        for i in 0..archive.len() {
            let name = archive.by_index(i).map_err(zip_err)?.name().to_string();
            if name.ends_with(".geojson") {
                member = Some(i);
                break;
            }
            if member.is_none() && name.ends_with(".json") {
                member = Some(i);
            }
        }

        let index = member.ok_or_else(|| {
            TzError::DatasetFormat(format!(
                "{} contains no .geojson or .json member",
                path.display()
            ))
        })?;

        let mut entry = archive.by_index(index).map_err(zip_err)?;
        log::debug!("Reading {} from {}", entry.name(), path.display());

        // The declared size is only a hint; a damaged header can claim anything.
        let mut contents = Vec::with_capacity(entry.size().min(MAX_SIZE_HINT) as usize);
        entry.read_to_end(&mut contents).map_err(|e| {
            TzError::DatasetFormat(format!("{}: failed to inflate: {}", path.display(), e))
        })?;

        Ok(Box::new(Cursor::new(contents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"type":"FeatureCollection","features":[]}"#;

    fn read_all(mut reader: Box<dyn Read>) -> String {
        let mut s = String::new();
        reader.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(token.check().is_ok());
        shared.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(TzError::Cancelled)));
    }

    #[test]
    fn test_file_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tz.geojson");
        std::fs::write(&path, SAMPLE).unwrap();

        let raw = FileSource::new(&path)
            .fetch(dir.path(), &CancelToken::new())
            .unwrap();
        assert_eq!(raw.path, path);
        assert!(!raw.temporary);

        let missing = FileSource::new(dir.path().join("missing.geojson"));
        assert!(matches!(
            missing.fetch(dir.path(), &CancelToken::new()),
            Err(TzError::Download(_))
        ));
    }

    #[test]
    fn test_file_source_honours_cancel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tz.geojson");
        std::fs::write(&path, SAMPLE).unwrap();

        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            FileSource::new(&path).fetch(dir.path(), &token),
            Err(TzError::Cancelled)
        ));
    }

    #[test]
    fn test_open_plain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tz.geojson");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(read_all(open_dataset(&path).unwrap()), SAMPLE);
    }

    #[test]
    fn test_open_tiny_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(read_all(open_dataset(&path).unwrap()), "{}");
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_open_gzip() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tz.geojson.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        assert_eq!(read_all(open_dataset(&path).unwrap()), SAMPLE);
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_open_zip_prefers_geojson_member() {
        use zip::write::SimpleFileOptions;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timezones.geojson.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("README.json", options).unwrap();
        zip.write_all(b"{\"readme\":true}").unwrap();
        zip.start_file("dist/combined.geojson", options).unwrap();
        zip.write_all(SAMPLE.as_bytes()).unwrap();
        zip.finish().unwrap();

        assert_eq!(read_all(open_dataset(&path).unwrap()), SAMPLE);
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_open_zip_without_geojson() {
        use zip::write::SimpleFileOptions;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("notes.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"nothing here").unwrap();
        zip.finish().unwrap();

        assert!(matches!(
            open_dataset(&path),
            Err(TzError::DatasetFormat(_))
        ));
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_open_zip_with_inflated_size_header() {
        use zip::CompressionMethod;
        use zip::write::SimpleFileOptions;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lying.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("timezones.geojson", options).unwrap();
        zip.write_all(SAMPLE.as_bytes()).unwrap();
        zip.finish().unwrap();

        // Claim an uncompressed size near 4 GiB in both local and central headers.
        let mut bytes = std::fs::read(&path).unwrap();
        let claimed = 0xFFFF_FFF0u32.to_le_bytes();
        for (signature, offset) in [(b"PK\x03\x04", 22), (b"PK\x01\x02", 24)] {
            let at = bytes
                .windows(4)
                .position(|w| w == signature)
                .unwrap();
            bytes[at + offset..at + offset + 4].copy_from_slice(&claimed);
        }
        std::fs::write(&path, &bytes).unwrap();

        match open_dataset(&path) {
            Ok(reader) => assert_eq!(read_all(reader), SAMPLE),
            Err(e) => assert!(matches!(e, TzError::DatasetFormat(_)), "{}", e),
        }
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_http_source_unreachable_host() {
        use crate::config::Config;
        use std::time::Duration;

        let dir = TempDir::new().unwrap();
        let config = Config::default()
            .with_dataset_url("http://127.0.0.1:9/timezones.geojson.zip")
            .with_connect_timeout(Duration::from_secs(1));
        let source = HttpSource::new(&config).unwrap();

        assert!(matches!(
            source.fetch(dir.path(), &CancelToken::new()),
            Err(TzError::Download(_))
        ));
        assert!(!dir.path().join(DOWNLOAD_FILE).exists());
    }
}
