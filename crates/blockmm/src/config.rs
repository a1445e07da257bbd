//! Engine configuration from defaults and `BLOCKMM_*` environment variables.

use std::path::PathBuf;
use std::{env, fmt};

use blockmm_core::TilePolicy;
use blockmm_types::Precision;

use crate::error::ConfigError;

/// Environment lookup, injectable for tests.
pub(crate) type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tile_policy: TilePolicy,
    /// Verification tolerance; `None` uses the per-precision default.
    pub tolerance: Option<f64>,
    pub verify: bool,
    /// Turn a failed verification into [`EngineError::Validation`](crate::EngineError::Validation).
    pub fail_on_mismatch: bool,
    /// Lowers the probed work-group limit. Never raises it.
    pub workgroup_size_override: Option<usize>,
    /// Kernel source to use instead of the built-in one.
    pub kernel_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_policy: TilePolicy::RoundUp,
            tolerance: None,
            verify: true,
            fail_on_mismatch: false,
            workgroup_size_override: None,
            kernel_path: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `BLOCKMM_*` variables that are set.
    ///
    /// | variable | field |
    /// |----------|-------|
    /// | `BLOCKMM_TILE_POLICY` | `tile_policy` (`round-up`, `exact-divisor`) |
    /// | `BLOCKMM_TOLERANCE` | `tolerance` |
    /// | `BLOCKMM_VERIFY` | `verify` |
    /// | `BLOCKMM_STRICT` | `fail_on_mismatch` |
    /// | `BLOCKMM_WORKGROUP_SIZE` | `workgroup_size_override` |
    /// | `BLOCKMM_KERNEL_PATH` | `kernel_path` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("BLOCKMM_TILE_POLICY") {
            cfg.tile_policy = parse_tile_policy(&v)?;
        }
        if let Some(v) = lookup("BLOCKMM_TOLERANCE") {
            cfg.tolerance = Some(parse_env_f64("BLOCKMM_TOLERANCE", &v)?);
        }
        if let Some(v) = lookup("BLOCKMM_VERIFY") {
            cfg.verify = parse_env_bool("BLOCKMM_VERIFY", &v)?;
        }
        if let Some(v) = lookup("BLOCKMM_STRICT") {
            cfg.fail_on_mismatch = parse_env_bool("BLOCKMM_STRICT", &v)?;
        }
        if let Some(v) = lookup("BLOCKMM_WORKGROUP_SIZE") {
            cfg.workgroup_size_override = Some(parse_env_usize("BLOCKMM_WORKGROUP_SIZE", &v)?);
        }
        if let Some(v) = lookup("BLOCKMM_KERNEL_PATH") {
            if !v.is_empty() {
                cfg.kernel_path = Some(PathBuf::from(v));
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(tol) = self.tolerance {
            if !tol.is_finite() || tol < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "tolerance must be finite and >= 0, got {}",
                    tol
                )));
            }
        }
        if self.workgroup_size_override == Some(0) {
            return Err(ConfigError::Validation(
                "workgroup_size_override must be > 0 when set".into(),
            ));
        }
        if self.fail_on_mismatch && !self.verify {
            return Err(ConfigError::Validation(
                "fail_on_mismatch requires verification to be enabled".into(),
            ));
        }
        Ok(())
    }

    /// Tolerance for results computed in `precision`.
    pub fn tolerance_for(&self, precision: Precision) -> f64 {
        self.tolerance.unwrap_or_else(|| precision.default_tolerance())
    }

    #[must_use]
    pub fn with_tile_policy(mut self, policy: TilePolicy) -> Self {
        self.tile_policy = policy;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_fail_on_mismatch(mut self, strict: bool) -> Self {
        self.fail_on_mismatch = strict;
        self
    }

    #[must_use]
    pub fn with_workgroup_size_override(mut self, items: usize) -> Self {
        self.workgroup_size_override = Some(items);
        self
    }

    #[must_use]
    pub fn with_kernel_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_path = Some(path.into());
        self
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy {:?}, verify {}", self.tile_policy, self.verify)?;
        if let Some(tol) = self.tolerance {
            write!(f, ", tolerance {:e}", tol)?;
        }
        if let Some(items) = self.workgroup_size_override {
            write!(f, ", work-group <= {}", items)?;
        }
        if let Some(path) = &self.kernel_path {
            write!(f, ", kernel {}", path.display())?;
        }
        Ok(())
    }
}

fn parse_tile_policy(val: &str) -> Result<TilePolicy, ConfigError> {
    match val.to_ascii_lowercase().as_str() {
        "round-up" | "roundup" => Ok(TilePolicy::RoundUp),
        "exact-divisor" | "exact" => Ok(TilePolicy::ExactDivisor),
        other => Err(ConfigError::UnknownTilePolicy(other.to_string())),
    }
}

pub(crate) fn parse_env_usize(key: &str, val: &str) -> Result<usize, ConfigError> {
    val.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvVar {
        key: key.to_string(),
        value: val.to_string(),
    })
}

fn parse_env_f64(key: &str, val: &str) -> Result<f64, ConfigError> {
    val.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvVar {
        key: key.to_string(),
        value: val.to_string(),
    })
}

pub(crate) fn parse_env_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvVar {
            key: key.to_string(),
            value: val.to_string(),
        }),
    }
}
