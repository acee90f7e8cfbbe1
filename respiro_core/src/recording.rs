//! CSV sensor recordings.
//!
//! Format: header `timestamp_ms,sensor,x,y,z`, one sample per row, `sensor`
//! being `accel` or `gyro`. Rows are replayed in file order; the session
//! itself drops anything out of order.

use crate::types::{ImuSample, SensorKind};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A row in a recording file
#[derive(Debug, Serialize, Deserialize)]
struct RecordingRow {
    timestamp_ms: u64,
    sensor: SensorKind,
    x: f32,
    y: f32,
    z: f32,
}

impl From<&ImuSample> for RecordingRow {
    fn from(sample: &ImuSample) -> Self {
        RecordingRow {
            timestamp_ms: sample.timestamp_ms,
            sensor: sample.kind,
            x: sample.x,
            y: sample.y,
            z: sample.z,
        }
    }
}

impl From<RecordingRow> for ImuSample {
    fn from(row: RecordingRow) -> Self {
        ImuSample::new(row.sensor, row.x, row.y, row.z, row.timestamp_ms)
    }
}

/// Read every parseable sample from a recording.
///
/// Malformed rows are skipped with a warning rather than failing the load.
pub fn load_recording(path: &Path) -> Result<Vec<ImuSample>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for (row_num, record) in reader.deserialize::<RecordingRow>().enumerate() {
        match record {
            Ok(row) => samples.push(ImuSample::from(row)),
            Err(e) => {
                // +2: header line, 1-based
                tracing::warn!("Skipping row {} of {:?}: {}", row_num + 2, path, e);
                skipped += 1;
            }
        }
    }

    tracing::info!(
        "Loaded {} samples from {:?} ({} rows skipped)",
        samples.len(),
        path,
        skipped
    );
    Ok(samples)
}

/// Write samples as a recording, replacing any existing file.
pub fn write_recording(path: &Path, samples: &[ImuSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for sample in samples {
        writer.serialize(RecordingRow::from(sample))?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} samples to {:?}", samples.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("night").join("rec.csv");

        let samples = vec![
            ImuSample::accel(0.3, 0.2, 9.81, 0),
            ImuSample::gyro(0.02, 0.01, 0.0, 0),
            ImuSample::accel(0.3, 0.2, 9.86, 20),
        ];
        write_recording(&path, &samples).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("timestamp_ms,sensor,x,y,z"));
        assert!(contents.contains(",gyro,"));

        let loaded = load_recording(&path).unwrap();
        assert_eq!(loaded, samples);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rec.csv");
        std::fs::write(
            &path,
            "timestamp_ms,sensor,x,y,z\n\
             0,accel,0.0,0.0,9.81\n\
             20,magnetometer,1,2,3\n\
             not-a-number,gyro,0,0,0\n\
             40, gyro , 0.1, 0.0, 0.0\n",
        )
        .unwrap();

        let loaded = load_recording(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].kind, SensorKind::Gyro);
        assert_eq!(loaded[1].timestamp_ms, 40);
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_recording(&temp_dir.path().join("absent.csv"));
        assert!(matches!(result, Err(Error::Csv(_))));
    }
}
