use super::{ConfigError, Settings};
use crate::runtime::StatePaths;

/// Loads `<state_root>/config.yaml`; a missing file yields default settings.
pub fn load_settings(paths: &StatePaths) -> Result<Settings, ConfigError> {
    let path = paths.settings_file();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let settings = Settings::from_path(&path)?;
    settings.validate()?;
    Ok(settings)
}
