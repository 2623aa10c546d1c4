//! Render configuration
//!
//! [`RenderConfig`] is the serializable, user-facing part. [`PassSetup`] is what
//! pass construction actually consumes: the config values combined with the
//! formats only the device and swapchain can tell us.

use ash::vk;
use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Default texture used when a requested texture file is missing
pub const DEFAULT_TEXTURE_PATH: &str = "Assets/Shared/Textures/White.png";

/// Render settings shared by the pass graph, command recording and resource pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Far plane maps to depth 0 instead of 1
    pub reverse_depth: bool,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Sample count for the scene color and depth attachments
    pub msaa_samples: u32,
    /// Install the bloom pass set at startup
    pub bloom_enabled: bool,
    /// Texture used when a requested texture file does not exist
    pub default_texture_path: String,
    /// Read and write `<model>.cache` files next to imported models
    pub model_cache_enabled: bool,
}

impl RenderConfig {
    /// Set reverse depth
    pub fn with_reverse_depth(mut self, reverse_depth: bool) -> Self {
        self.reverse_depth = reverse_depth;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Set MSAA sample count
    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    /// Enable or disable the bloom pass set
    pub fn with_bloom(mut self, enabled: bool) -> Self {
        self.bloom_enabled = enabled;
        self
    }

    /// Set the fallback texture path
    pub fn with_default_texture_path(mut self, path: impl Into<String>) -> Self {
        self.default_texture_path = path.into();
        self
    }

    /// Enable or disable the model cache
    pub fn with_model_cache(mut self, enabled: bool) -> Self {
        self.model_cache_enabled = enabled;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > 8 {
            return Err(format!(
                "max_frames_in_flight must be between 1 and 8, got {}",
                self.max_frames_in_flight
            ));
        }
        // Scene passes always resolve their color, which needs a multisampled source
        if !self.msaa_samples.is_power_of_two() || !(2..=64).contains(&self.msaa_samples) {
            return Err(format!(
                "msaa_samples must be a power of two between 2 and 64, got {}",
                self.msaa_samples
            ));
        }
        if self.default_texture_path.is_empty() {
            return Err("default_texture_path must not be empty".to_string());
        }
        Ok(())
    }

    /// Load from a TOML or RON file and validate the result
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Sample count flag matching `msaa_samples`
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        match self.msaa_samples {
            2 => vk::SampleCountFlags::TYPE_2,
            4 => vk::SampleCountFlags::TYPE_4,
            8 => vk::SampleCountFlags::TYPE_8,
            16 => vk::SampleCountFlags::TYPE_16,
            32 => vk::SampleCountFlags::TYPE_32,
            64 => vk::SampleCountFlags::TYPE_64,
            _ => vk::SampleCountFlags::TYPE_1,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            reverse_depth: true,
            max_frames_in_flight: 2,
            msaa_samples: 4,
            bloom_enabled: true,
            default_texture_path: DEFAULT_TEXTURE_PATH.to_string(),
            model_cache_enabled: true,
        }
    }
}

impl Config for RenderConfig {}

/// Inputs for building the fixed passes and custom pass sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSetup {
    /// Depth clears to 0 instead of 1
    pub reverse_depth: bool,
    /// Sample count of the multisampled scene attachments
    pub msaa_samples: vk::SampleCountFlags,
    /// Depth format supported by the physical device
    pub depth_format: vk::Format,
    /// Swapchain surface format
    pub present_format: vk::Format,
}

impl PassSetup {
    /// Combine render config with device-provided formats
    pub fn new(config: &RenderConfig, depth_format: vk::Format, present_format: vk::Format) -> Self {
        Self {
            reverse_depth: config.reverse_depth,
            msaa_samples: config.sample_count(),
            depth_format,
            present_format,
        }
    }
}

impl Default for PassSetup {
    fn default() -> Self {
        Self::new(
            &RenderConfig::default(),
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::B8G8R8A8_SRGB,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    #[test]
    fn test_default_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_count(), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RenderConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(RenderConfig::default().with_max_frames_in_flight(9).validate().is_err());
        assert!(RenderConfig::default().with_msaa_samples(3).validate().is_err());
        assert!(RenderConfig::default().with_msaa_samples(1).validate().is_err());
        assert!(RenderConfig::default().with_default_texture_path("").validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let file = Builder::new().suffix(".toml").tempfile().unwrap();
        let config = RenderConfig::default().with_reverse_depth(false).with_msaa_samples(8);
        config.save_to_file(file.path()).unwrap();

        let loaded = RenderConfig::load_validated(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let file = Builder::new().suffix(".ron").tempfile().unwrap();
        let config = RenderConfig::default().with_bloom(false);
        config.save_to_file(file.path()).unwrap();

        let loaded = RenderConfig::load_from_file(file.path()).unwrap();
        assert!(!loaded.bloom_enabled);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(file.path(), "msaa_samples = 1\n").unwrap();

        let loaded = RenderConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.sample_count(), vk::SampleCountFlags::TYPE_1);
        assert_eq!(loaded.max_frames_in_flight, 2);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = Builder::new().suffix(".json").tempfile().unwrap();
        let result = RenderConfig::default().save_to_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
