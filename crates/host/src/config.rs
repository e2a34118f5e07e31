//! Host configuration management

use crate::compress::ChromaSubsampling;
use anyhow::{Context, Result, anyhow};
use common::DeviceIdentity;
use protocol::{AccessoryIdentity, HANDSHAKE_FRAME_LEN, MAX_CHUNK_LEN, ORIENTATION_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: HostSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// Strings announced during accessory negotiation
    #[serde(default)]
    pub accessory: AccessoryIdentity,
    /// Timeouts and frame sizes of the two streams
    #[serde(default)]
    pub stream: StreamSettings,
    /// Video compression
    #[serde(default)]
    pub jpeg: JpegSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Plain (pre-accessory) identities tried in order, as `0xVID:0xPID`
    #[serde(default = "UsbSettings::default_candidates")]
    pub candidates: Vec<String>,
    /// Extra devices listed as Android phones (`0xVID:0xPID`, `0xVID:*`, `*:*`)
    #[serde(default)]
    pub filters: Vec<String>,
    /// Wait after START before looking for the re-enumerated device
    #[serde(default = "UsbSettings::default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl UsbSettings {
    fn default_candidates() -> Vec<String> {
        vec!["0x18d1:0x4ee2".to_string()] // Nexus 4/5 with MTP + ADB
    }

    fn default_settle_delay() -> u64 {
        1000
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Parse the candidate list
    pub fn candidate_identities(&self) -> Result<Vec<DeviceIdentity>> {
        self.candidates
            .iter()
            .map(|c| c.parse::<DeviceIdentity>().map_err(|e| anyhow!(e)))
            .collect()
    }
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            candidates: Self::default_candidates(),
            filters: Vec::new(),
            settle_delay_ms: Self::default_settle_delay(),
        }
    }
}

/// Stream timing and framing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Bulk transfer timeout; also the cancellation check interval
    #[serde(default = "StreamSettings::default_poll_timeout")]
    pub poll_timeout_ms: u64,
    /// Read timeout while discarding stale input before the handshake
    #[serde(default = "StreamSettings::default_flush_timeout")]
    pub flush_timeout_ms: u64,
    /// Largest single bulk write of video payload
    #[serde(default = "StreamSettings::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "StreamSettings::default_handshake_frame_len")]
    pub handshake_frame_len: usize,
    #[serde(default = "StreamSettings::default_orientation_frame_len")]
    pub orientation_frame_len: usize,
    /// Largest raw image accepted by `submit_frame`
    #[serde(default = "StreamSettings::default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: Self::default_poll_timeout(),
            flush_timeout_ms: Self::default_flush_timeout(),
            chunk_size: Self::default_chunk_size(),
            handshake_frame_len: Self::default_handshake_frame_len(),
            orientation_frame_len: Self::default_orientation_frame_len(),
            max_image_bytes: Self::default_max_image_bytes(),
        }
    }
}

impl StreamSettings {
    fn default_poll_timeout() -> u64 {
        500
    }

    fn default_flush_timeout() -> u64 {
        10
    }

    fn default_chunk_size() -> usize {
        MAX_CHUNK_LEN
    }

    fn default_handshake_frame_len() -> usize {
        HANDSHAKE_FRAME_LEN
    }

    fn default_orientation_frame_len() -> usize {
        ORIENTATION_FRAME_LEN
    }

    fn default_max_image_bytes() -> usize {
        4096 * 4096 * 4 // 4K x 4K BGRX
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// How long teardown waits for workers to acknowledge cancellation
    pub fn teardown_window(&self) -> Duration {
        self.poll_timeout() * 2 + self.flush_timeout()
    }

    fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(anyhow!("stream.poll_timeout_ms must be greater than 0"));
        }
        if self.flush_timeout_ms == 0 {
            return Err(anyhow!("stream.flush_timeout_ms must be greater than 0"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_LEN {
            return Err(anyhow!(
                "stream.chunk_size {} out of range, must be 1-{}",
                self.chunk_size,
                MAX_CHUNK_LEN
            ));
        }
        if self.handshake_frame_len < HANDSHAKE_FRAME_LEN {
            return Err(anyhow!(
                "stream.handshake_frame_len {} is below the minimum of {}",
                self.handshake_frame_len,
                HANDSHAKE_FRAME_LEN
            ));
        }
        if self.orientation_frame_len < ORIENTATION_FRAME_LEN {
            return Err(anyhow!(
                "stream.orientation_frame_len {} is below the minimum of {}",
                self.orientation_frame_len,
                ORIENTATION_FRAME_LEN
            ));
        }
        if self.max_image_bytes == 0 {
            return Err(anyhow!("stream.max_image_bytes must be greater than 0"));
        }
        Ok(())
    }
}

/// JPEG encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JpegSettings {
    /// 1 (smallest) to 100 (best)
    #[serde(default = "JpegSettings::default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub subsampling: ChromaSubsampling,
}

impl Default for JpegSettings {
    fn default() -> Self {
        Self {
            quality: Self::default_quality(),
            subsampling: ChromaSubsampling::default(),
        }
    }
}

impl JpegSettings {
    fn default_quality() -> u8 {
        50
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: HostSettings {
                log_level: "info".to_string(),
            },
            usb: UsbSettings::default(),
            accessory: AccessoryIdentity::default(),
            stream: StreamSettings::default(),
            jpeg: JpegSettings::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/hmd-tether/host.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("hmd-tether").join("host.toml")
        } else {
            PathBuf::from(".config/hmd-tether/host.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.host.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.host.log_level,
                valid_levels.join(", ")
            ));
        }

        for candidate in &self.usb.candidates {
            Self::validate_candidate(candidate)?;
        }

        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        self.stream.validate()?;

        if !(1..=100).contains(&self.jpeg.quality) {
            return Err(anyhow!(
                "Invalid jpeg.quality {}, must be 1-100",
                self.jpeg.quality
            ));
        }

        Ok(())
    }

    /// Validate a candidate device (VID:PID, no wildcards)
    fn validate_candidate(candidate: &str) -> Result<()> {
        let (vid, pid) = candidate.split_once(':').ok_or_else(|| {
            anyhow!(
                "Invalid candidate '{}', expected VID:PID (e.g., '0x18d1:0x4ee2')",
                candidate
            )
        })?;
        Self::validate_hex_id(vid, "VID")?;
        Self::validate_hex_id(pid, "PID")
    }

    /// Validate a USB device filter pattern (VID:PID)
    fn validate_filter(filter: &str) -> Result<()> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
                filter
            ));
        }

        let (vid, pid) = (parts[0], parts[1]);

        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }

        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        if !id.starts_with("0x") && !id.starts_with("0X") {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            ));
        }

        common::usb_types::parse_hex_id(id, name).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

/// Load a configuration file from a user-supplied path (`~` is expanded)
pub fn load_config(path: &str) -> Result<HostConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    HostConfig::load(Some(path_buf))
}
