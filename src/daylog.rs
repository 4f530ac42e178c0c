//! Plain-text daily mirror of every stored snapshot.
//!
//! One file per site date, `VITB_<yyyy-MM-dd>.txt`, one comma-separated line
//! per poll: the local timestamp followed by the five raw fields of meters
//! 70, 40, 69 and 41. Purely diagnostic output for people who grab the files
//! off the box; the database is the source of truth.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::models::SensorSnapshot;

// ---

#[derive(Debug, Clone)]
pub struct DayLog {
    dir: PathBuf,
}

impl DayLog {
    // ---
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DayLog { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("VITB_{}.txt", date.format("%Y-%m-%d")))
    }

    /// Append one line for `snapshot`, creating the directory and file if needed.
    pub async fn append(
        &self,
        local_time: NaiveDateTime,
        snapshot: &SensorSnapshot,
    ) -> std::io::Result<PathBuf> {
        // ---
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(local_time.date());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        file.write_all(format_line(local_time, snapshot).as_bytes())
            .await?;
        file.flush().await?;
        Ok(path)
    }
}

/// `yyyy-MM-dd HH:mm:ss,KW70,KWH70,KVA70,PF70,KVAH70,KW40,...,KVAH41\n`
pub fn format_line(local_time: NaiveDateTime, snapshot: &SensorSnapshot) -> String {
    // ---
    let mut line = local_time.format("%Y-%m-%d %H:%M:%S").to_string();
    for meter in &snapshot.meters {
        for value in meter.as_columns() {
            line.push(',');
            line.push_str(&value.to_string());
        }
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::MeterValues;

    fn sample_snapshot() -> SensorSnapshot {
        let mut meters = [MeterValues::default(); 4];
        for (i, m) in meters.iter_mut().enumerate() {
            let base = (i as f64 + 1.0) * 10.0;
            *m = MeterValues {
                power_kw: base + 0.5,
                cumulative_energy_kwh: base * 100.0,
                apparent_power_kva: base + 1.0,
                avg_power_factor: 0.9,
                cumulative_apparent_energy_kvah: base * 110.0,
            };
        }
        SensorSnapshot { meters }
    }

    fn local(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_format_line_field_order() {
        // ---
        let line = format_line(local("2025-03-26 08:05:09"), &sample_snapshot());

        assert!(line.ends_with('\n'));
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        assert_eq!(fields.len(), 1 + 4 * 5);
        assert_eq!(fields[0], "2025-03-26 08:05:09");
        // meter 70
        assert_eq!(&fields[1..6], &["10.5", "1000", "11", "0.9", "1100"]);
        // meter 41 is last
        assert_eq!(&fields[16..21], &["40.5", "4000", "41", "0.9", "4400"]);
    }

    #[test]
    fn test_path_for_date() {
        // ---
        let log = DayLog::new("VIT-Data");
        let date = NaiveDate::from_ymd_opt(2025, 3, 6).unwrap();
        assert_eq!(log.path_for(date), Path::new("VIT-Data/VITB_2025-03-06.txt"));
    }

    #[tokio::test]
    async fn test_append_creates_and_extends_file() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let log = DayLog::new(tmp.path().join("nested"));
        let snap = sample_snapshot();

        let path = log.append(local("2025-03-26 08:00:00"), &snap).await.unwrap();
        log.append(local("2025-03-26 08:10:00"), &snap).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("2025-03-26 08:00:00,"));
        assert!(lines[1].starts_with("2025-03-26 08:10:00,"));
        assert_eq!(path.file_name().unwrap(), "VITB_2025-03-26.txt");
    }
}
