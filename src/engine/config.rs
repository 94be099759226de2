//! # Engine Configuration
//!
//! [`EngineConfig`] selects the backend, adapter preference and device label
//! used when a [`ComputeEngine`](crate::ComputeEngine) acquires its device.
//!
//! ## Environment
//!
//! [`EngineConfig::from_env`] starts from [`EngineConfig::default`] and applies:
//!
//! | variable                       | values                                         |
//! |--------------------------------|------------------------------------------------|
//! | `BATCH_COMPUTE_BACKENDS`       | comma list of `vulkan,metal,dx12,gl`, or `primary`, `all` |
//! | `BATCH_COMPUTE_POWER`          | `low`, `high`, `none`                          |
//! | `BATCH_COMPUTE_FORCE_FALLBACK` | `1`, `true`, `yes` (anything else is false)    |
//!
//! Unrecognised values are logged at `warn` and the default is kept.

use std::env;

/// Backend selection variable.
pub const ENV_BACKENDS: &str = "BATCH_COMPUTE_BACKENDS";

/// Adapter power preference variable.
pub const ENV_POWER: &str = "BATCH_COMPUTE_POWER";

/// Software-adapter fallback variable.
pub const ENV_FORCE_FALLBACK: &str = "BATCH_COMPUTE_FORCE_FALLBACK";

/// Device acquisition settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Backends the instance may enumerate.
    pub backends: wgpu::Backends,

    /// Adapter power preference.
    pub power_preference: wgpu::PowerPreference,

    /// Request a software adapter.
    pub force_fallback_adapter: bool,

    /// Debug label attached to the device.
    pub label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            label: String::from("batch_compute_device"),
        }
    }
}

impl EngineConfig {
    /// Default configuration overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var(ENV_BACKENDS) {
            match parse_backends(&raw) {
                Some(backends) => config.backends = backends,
                None => log::warn!("{ENV_BACKENDS}='{raw}' not recognised; using all backends"),
            }
        }

        if let Ok(raw) = env::var(ENV_POWER) {
            match parse_power_preference(&raw) {
                Some(power) => config.power_preference = power,
                None => log::warn!("{ENV_POWER}='{raw}' not recognised (expected low|high|none)"),
            }
        }

        if let Ok(raw) = env::var(ENV_FORCE_FALLBACK) {
            config.force_fallback_adapter = parse_flag(&raw);
        }

        config
    }

    /// Sets the backend mask.
    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Sets the adapter power preference.
    pub fn with_power_preference(mut self, power: wgpu::PowerPreference) -> Self {
        self.power_preference = power;
        self
    }

    /// Requests a software adapter.
    pub fn with_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    /// Sets the device label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Parses a comma separated backend list. Returns `None` if any entry is unknown.
pub fn parse_backends(raw: &str) -> Option<wgpu::Backends> {
    let mut out = wgpu::Backends::empty();
    for token in raw.split(',').map(|t| t.trim().to_ascii_lowercase()) {
        let backend = match token.as_str() {
            "" => continue,
            "vulkan" | "vk" => wgpu::Backends::VULKAN,
            "metal" | "mtl" => wgpu::Backends::METAL,
            "dx12" | "d3d12" => wgpu::Backends::DX12,
            "gl" | "gles" | "opengl" => wgpu::Backends::GL,
            "primary" => wgpu::Backends::PRIMARY,
            "all" => wgpu::Backends::all(),
            _ => return None,
        };
        out |= backend;
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Parses `low`, `high` or `none`.
pub fn parse_power_preference(raw: &str) -> Option<wgpu::PowerPreference> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" | "low_power" => Some(wgpu::PowerPreference::LowPower),
        "high" | "high_performance" => Some(wgpu::PowerPreference::HighPerformance),
        "none" => Some(wgpu::PowerPreference::None),
        _ => None,
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
