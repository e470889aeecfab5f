//! Host (SoC) temperature from the kernel thermal zone.

use std::path::{Path, PathBuf};

use crate::error::DeviceTempError;

/// Raspberry Pi SoC thermal zone.
pub const DEFAULT_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Clone)]
pub struct DeviceTemperatureReader {
    path: PathBuf,
}

impl DeviceTemperatureReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current temperature in °C.
    pub async fn read(&self) -> Result<f64, DeviceTempError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DeviceTempError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_millidegrees(&contents).ok_or_else(|| DeviceTempError::Malformed {
            path: self.path.clone(),
            contents: contents.trim().to_string(),
        })
    }
}

impl Default for DeviceTemperatureReader {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

/// `"48312\n"` → `48.312`
fn parse_millidegrees(s: &str) -> Option<f64> {
    s.trim().parse::<i64>().ok().map(|m| m as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "growbox-device-temp-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parse_trims_newline() {
        assert_eq!(parse_millidegrees("48312\n"), Some(48.312));
    }

    #[test]
    fn parse_negative() {
        assert_eq!(parse_millidegrees("-5000"), Some(-5.0));
    }

    #[test]
    fn parse_garbage() {
        assert_eq!(parse_millidegrees("hot"), None);
        assert_eq!(parse_millidegrees(""), None);
    }

    #[tokio::test]
    async fn read_from_file() {
        let path = temp_file("ok", "51000\n");
        let reader = DeviceTemperatureReader::new(&path);
        assert_eq!(reader.read().await.unwrap(), 51.0);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_error_not_panic() {
        let reader = DeviceTemperatureReader::new("/nonexistent/thermal_zone/temp");
        assert!(matches!(
            reader.read().await,
            Err(DeviceTempError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_file_is_error() {
        let path = temp_file("bad", "n/a\n");
        let reader = DeviceTemperatureReader::new(&path);
        assert!(matches!(
            reader.read().await,
            Err(DeviceTempError::Malformed { .. })
        ));
        std::fs::remove_file(path).ok();
    }
}
