//! JSON settings file bundling tracking, projection and loading options.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use voxel5d_render::ProjectionConfig;
use voxel5d_tracking::TrackingConfig;

use crate::loader::LoadConfig;
use crate::Result;

/// Everything a viewing session can persist between runs.
///
/// Missing sections fall back to their defaults, so older files stay readable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub tracking: TrackingConfig,
    pub projection: ProjectionConfig,
    pub load: LoadConfig,
}

impl SettingsFile {
    /// Reads settings from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let settings = serde_json::from_reader(BufReader::new(file))?;
        log::debug!("loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Writes settings as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_use_defaults() {
        let settings: SettingsFile =
            serde_json::from_str(r#"{"load": {"memory_budget_bytes": 4096}}"#).unwrap();
        assert_eq!(settings.load.memory_budget_bytes, Some(4096));
        assert_eq!(settings.tracking, TrackingConfig::default());
        assert_eq!(settings.projection, ProjectionConfig::default());
    }
}
