//! Touch line read through the Linux sysfs GPIO interface.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::sampler::LineReader;
use crate::{Result, TouchError};

const SYSFS_GPIO: &str = "/sys/class/gpio";

/// A GPIO input line exported through sysfs.
#[derive(Debug)]
pub struct SysfsGpioLine {
    value_path: PathBuf,
    active_high: bool,
}

impl SysfsGpioLine {
    /// Export `pin` (if needed) and configure it as an input.
    pub fn open(pin: u32, active_high: bool) -> Result<Self> {
        Self::open_in(Path::new(SYSFS_GPIO), pin, active_high)
    }

    fn open_in(root: &Path, pin: u32, active_high: bool) -> Result<Self> {
        let line_dir = root.join(format!("gpio{pin}"));

        if !line_dir.exists() {
            info!(pin, "exporting gpio line");
            fs::write(root.join("export"), pin.to_string()).map_err(|e| {
                TouchError::LineUnavailable(format!("failed to export gpio {pin}: {e}"))
            })?;
        }

        // Some kernels keep direction read-only for already claimed lines.
        if let Err(e) = fs::write(line_dir.join("direction"), "in") {
            debug!(pin, error = %e, "could not set gpio direction");
        }

        let value_path = line_dir.join("value");
        if !value_path.exists() {
            return Err(TouchError::LineUnavailable(format!(
                "{} does not exist",
                value_path.display()
            )));
        }

        Ok(Self {
            value_path,
            active_high,
        })
    }
}

impl LineReader for SysfsGpioLine {
    fn read_level(&mut self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path)?;
        let high = match raw.trim() {
            "1" => true,
            "0" => false,
            other => return Err(TouchError::InvalidLevel(other.to_string())),
        };
        Ok(high == self.active_high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_line(root: &Path, pin: u32, value: &str) {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    #[test]
    fn test_reads_level() {
        let root = tempfile::tempdir().unwrap();
        fake_line(root.path(), 17, "1\n");

        let mut line = SysfsGpioLine::open_in(root.path(), 17, true).unwrap();
        assert!(line.read_level().unwrap());

        fs::write(root.path().join("gpio17/value"), "0\n").unwrap();
        assert!(!line.read_level().unwrap());
    }

    #[test]
    fn test_active_low_inverts() {
        let root = tempfile::tempdir().unwrap();
        fake_line(root.path(), 4, "0\n");

        let mut line = SysfsGpioLine::open_in(root.path(), 4, false).unwrap();
        assert!(line.read_level().unwrap());
    }

    #[test]
    fn test_garbage_value_is_transient_error() {
        let root = tempfile::tempdir().unwrap();
        fake_line(root.path(), 5, "x");

        let mut line = SysfsGpioLine::open_in(root.path(), 5, true).unwrap();
        let err = line.read_level().unwrap_err();
        assert!(matches!(err, TouchError::InvalidLevel(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_line_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let err = SysfsGpioLine::open_in(root.path(), 9, true).unwrap_err();
        assert!(!err.is_transient());
    }
}
