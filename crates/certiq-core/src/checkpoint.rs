//! On-disk checkpoints for in-flight sampling runs.
//!
//! A checkpoint records everything needed to rebuild a
//! [`GeneratorJob`](crate::job::GeneratorJob) after the process that
//! submitted it has gone away: the WSR triples, the shot count and the ids
//! of the submitted jobs. It is a single JSON file named
//! `certiq_<backend>_<num_raw_bits>_<tag>` where `tag` is four hex digits
//! taken from a fresh v4 UUID.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::circuit::Label;
use crate::error::{Result, RngError};

pub const CHECKPOINT_VERSION: u32 = 1;
const FILE_PREFIX: &str = "certiq";

/// Contents of a checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub backend: String,
    pub num_raw_bits: usize,
    pub wsr: Vec<Label>,
    pub shots: usize,
    pub job_set_id: String,
    pub job_ids: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

impl Checkpoint {
    pub fn new(
        backend: impl Into<String>,
        num_raw_bits: usize,
        wsr: Vec<Label>,
        shots: usize,
        job_set_id: impl Into<String>,
        job_ids: Vec<String>,
    ) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            version: CHECKPOINT_VERSION,
            backend: backend.into(),
            num_raw_bits,
            wsr,
            shots,
            job_set_id: job_set_id.into(),
            job_ids,
            created_at: format_timestamp(now),
        }
    }

    /// Write the checkpoint into `dir` under a fresh file name.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        loop {
            let path = dir.join(file_name(&self.backend, self.num_raw_bits));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(json.as_bytes())?;
            log::info!("Checkpoint written to {}", path.display());
            return Ok(path);
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let checkpoint: Self = serde_json::from_str(&text)?;
        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(RngError::invalid_argument(format!(
                "checkpoint {} has unsupported version {}",
                path.display(),
                checkpoint.version
            )));
        }
        if checkpoint.shots == 0 || checkpoint.wsr.is_empty() {
            return Err(RngError::invalid_argument(format!(
                "checkpoint {} records no circuits",
                path.display()
            )));
        }
        if checkpoint.wsr.iter().flatten().any(|&b| b > 1) {
            return Err(RngError::invalid_argument(format!(
                "checkpoint {} holds a WSR label that is not binary",
                path.display()
            )));
        }
        Ok(checkpoint)
    }
}

fn file_name(backend: &str, num_raw_bits: usize) -> String {
    let tag = Uuid::new_v4().simple().to_string();
    format!("{FILE_PREFIX}_{backend}_{num_raw_bits}_{}", &tag[..4])
}

/// `2026-02-15T01:30:00Z` style UTC timestamp.
fn format_timestamp(since_epoch: Duration) -> String {
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    let rem = secs % 86_400;
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        (rem / 60) % 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint::new(
            "ibmq_valencia",
            30,
            vec![[0, 1, 1], [1, 1, 1]],
            5,
            "set-1",
            vec!["job-a".to_string()],
        )
    }

    #[test]
    fn test_timestamp_epoch() {
        assert_eq!(format_timestamp(Duration::ZERO), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_timestamp_known_date() {
        // 2000-03-01 is the first day after a leap-day February.
        assert_eq!(
            format_timestamp(Duration::from_secs(951_868_800 + 3_661)),
            "2000-03-01T01:01:01Z"
        );
        assert_eq!(
            format_timestamp(Duration::from_secs(1_709_164_800)),
            "2024-02-29T00:00:00Z"
        );
    }

    #[test]
    fn test_file_name_shape() {
        let name = file_name("ibmq_ourense", 100);
        assert!(name.starts_with("certiq_ibmq_ourense_100_"));
        let tag = name.rsplit('_').next().unwrap();
        assert_eq!(tag.len(), 4);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let cp = sample();
        let path = cp.save(tmp.path()).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(tmp.path()));
        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, cp);
    }

    #[test]
    fn test_save_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let cp = sample();
        let a = cp.save(tmp.path()).unwrap();
        let b = cp.save(tmp.path()).unwrap();
        assert_ne!(a, b);

        // Enough saves that four-hex tags collide; none may clobber another.
        let paths: std::collections::HashSet<_> =
            (0..600).map(|_| cp.save(tmp.path()).unwrap()).collect();
        assert_eq!(paths.len(), 600);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 602);
    }

    #[test]
    fn test_load_rejects_empty_wsr() {
        let tmp = tempfile::tempdir().unwrap();
        let cp = Checkpoint {
            wsr: Vec::new(),
            ..sample()
        };
        let path = cp.save(tmp.path()).unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(RngError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_load_rejects_non_binary_label() {
        let tmp = tempfile::tempdir().unwrap();
        let cp = Checkpoint {
            wsr: vec![[0, 2, 1]],
            ..sample()
        };
        let path = cp.save(tmp.path()).unwrap();
        assert!(Checkpoint::load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Checkpoint::load(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, RngError::Io(_)));
    }
}
