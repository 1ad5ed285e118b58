//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level meshing pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Scheduler and compute-unit settings.
    pub meshing: MeshingConfig,
    /// Coarse geometry settings.
    pub lod: LodConfig,
    /// Telemetry collector settings.
    pub telemetry: TelemetryConfig,
    /// Observer focus / reprioritization settings.
    pub focus: FocusConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Scheduler and compute-unit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshingConfig {
    /// Edge length of a chunk in voxels.
    pub chunk_size: usize,
    /// Maximum number of jobs outstanding on the compute units.
    pub max_in_flight: usize,
    /// Maximum number of chunks waiting in the dirty set.
    pub max_queue_size: usize,
    /// Total attempts per chunk revision before giving up.
    pub max_retries: u32,
    /// Worker threads for the thread-pool compute unit (0 = derive from CPU count).
    pub worker_count: usize,
    /// World height of the water surface, used for vertex coloring.
    pub water_level: f32,
}

/// Coarse geometry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Emit a coarse geometry alongside every full-resolution result.
    pub enabled: bool,
    /// Edge length of the fine-voxel block collapsed into one coarse voxel.
    pub downsample_factor: usize,
}

/// Telemetry collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Start with telemetry collection enabled.
    pub enabled: bool,
    /// Number of timing samples retained for averages.
    pub history_size: usize,
}

/// Observer focus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FocusConfig {
    /// Minimum time between two queue rebuilds when the focus moves.
    pub reprioritize_interval_ms: u64,
    /// Radius, in chunks, of the region meshed around the focus.
    pub view_radius: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            max_in_flight: 4,
            max_queue_size: 512,
            max_retries: 3,
            worker_count: 0,
            water_level: -12.0,
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            downsample_factor: 2,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            history_size: 100,
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            reprioritize_interval_ms: 150,
            view_radius: 4,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl MeshingConfig {
    /// Rejects values the scheduler cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.chunk_size",
                reason: "must be at least 1",
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.max_in_flight",
                reason: "must be at least 1",
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.max_queue_size",
                reason: "must be at least 1",
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.max_retries",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl LodConfig {
    /// Rejects a downsample factor that cannot coarsen anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.downsample_factor < 2 {
            return Err(ConfigError::Invalid {
                field: "lod.downsample_factor",
                reason: "must be at least 2",
            });
        }
        Ok(())
    }
}

impl Config {
    /// Validates every section the pipeline consumes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.meshing.validate()?;
        self.lod.validate()
    }
}

/// Default per-user configuration directory, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("voxmesh"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("chunk_size: 16"));
        assert!(ron_str.contains("max_in_flight: 4"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(meshing: (chunk_size: 32))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.meshing.chunk_size, 32);
        assert_eq!(config.meshing.max_retries, 3);
        assert_eq!(config.lod, LodConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.meshing.max_in_flight = 8;
        config.focus.view_radius = 6;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.meshing.max_queue_size = 64;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.meshing.max_queue_size), Some(64));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(MeshingConfig::default().validate().is_ok());

        let zero_size = MeshingConfig {
            chunk_size: 0,
            ..MeshingConfig::default()
        };
        assert!(matches!(
            zero_size.validate(),
            Err(ConfigError::Invalid {
                field: "meshing.chunk_size",
                ..
            })
        ));

        let zero_retries = MeshingConfig {
            max_retries: 0,
            ..MeshingConfig::default()
        };
        assert!(zero_retries.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_lod_factor_below_two() {
        assert!(Config::default().validate().is_ok());

        for factor in [0, 1] {
            let mut config = Config::default();
            config.lod.downsample_factor = factor;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid {
                    field: "lod.downsample_factor",
                    ..
                })
            ));
        }

        let mut disabled = Config::default();
        disabled.lod.enabled = false;
        disabled.lod.downsample_factor = 1;
        assert!(disabled.validate().is_ok(), "factor unused while LOD is off");
    }
}
