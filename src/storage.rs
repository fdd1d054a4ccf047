use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rkyv::Deserialize;
use tracing::info;

use crate::model::{QuantityDescriptor, SampledPoint};
use crate::Result;

const CATALOG_FILE: &str = "catalog.json";
const LOG_FILE: &str = "points.log";

/// Durable backend for the decimated history: a quantity catalog plus an
/// append-only point log. Append-only by contract; nothing is ever
/// updated or deleted.
pub struct HistoryStore {
    dir: PathBuf,
    log: PointLog,
}

impl HistoryStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let log = PointLog::open(&dir.join(LOG_FILE))?;
        info!(dir = %dir.display(), "history store opened");
        Ok(Self { dir: dir.to_path_buf(), log })
    }

    /// Idempotent upsert of the quantity catalog, keyed by name. The
    /// catalog is tiny and fixed, so a full atomic rewrite is the upsert.
    pub fn register_quantities(&self, descriptors: &[QuantityDescriptor]) -> Result<()> {
        let path = self.dir.join(CATALOG_FILE);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(descriptors)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn append_points(&mut self, points: &[SampledPoint]) -> Result<()> {
        for point in points {
            self.log.append(point)?;
        }
        self.log.flush()?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<Vec<QuantityDescriptor>> {
        let bytes = fs::read(self.dir.join(CATALOG_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replay the full log in append order.
    pub fn scan_points(&self) -> Result<Vec<SampledPoint>> {
        Ok(self.log.scan()?)
    }
}

/// Append-only log of length-prefixed rkyv records:
/// [Length (4b LE)][SampledPoint (N bytes)]
struct PointLog {
    file: File,
    current_offset: u64,
}

impl PointLog {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let current_offset = file.metadata()?.len();
        Ok(Self { file, current_offset })
    }

    fn append(&mut self, point: &SampledPoint) -> io::Result<u64> {
        let bytes = rkyv::to_bytes::<_, 64>(point)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let start = self.current_offset;
        let len = bytes.len() as u32;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&bytes)?;
        self.current_offset += 4 + bytes.len() as u64;
        Ok(start)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn scan(&self) -> io::Result<Vec<SampledPoint>> {
        // Clone the handle so scanning never moves the append cursor.
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;

        let mut points = Vec::new();
        let mut len_buf = [0u8; 4];
        let mut remaining = self.current_offset;
        while remaining > 0 {
            file.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut bytes = vec![0u8; len];
            file.read_exact(&mut bytes)?;
            remaining = remaining.saturating_sub(4 + len as u64);

            // rkyv validation needs the archive at its natural alignment.
            let mut aligned = rkyv::AlignedVec::with_capacity(len);
            aligned.extend_from_slice(&bytes);
            let archived = rkyv::check_archived_root::<SampledPoint>(&aligned)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let point: SampledPoint = archived
                .deserialize(&mut rkyv::Infallible)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "corrupt point record"))?;
            points.push(point);
        }
        Ok(points)
    }
}
