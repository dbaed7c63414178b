use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::av::Fraction;
use crate::error::{DecodeError, Result};

/// Settings file read by [`DecoderSettings::load`] when present.
pub const DEFAULT_CONFIG_PATH: &str = "./h265dec.toml";

const ENV_MODE: &str = "H265DEC_MODE";
const ENV_FRAMERATE: &str = "H265DEC_FRAMERATE";
const ENV_MAX_THREADS: &str = "H265DEC_MAX_THREADS";
const ENV_CHECK_HASH: &str = "H265DEC_CHECK_HASH";

/// How input buffers are framed when the stream configuration does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Length-prefixed NAL units.
    #[default]
    Packetized,
    /// Annex-B byte stream.
    Raw,
}

impl FromStr for InputMode {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "packetized" => Ok(InputMode::Packetized),
            "raw" => Ok(InputMode::Raw),
            other => Err(DecodeError::Config(format!("unknown input mode '{}'", other))),
        }
    }
}

/// Decoder configuration knobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecoderSettings {
    pub mode: InputMode,
    /// Output framerate override.
    framerate: Option<Fraction>,
    /// Worker threads; 0 picks a count from the number of CPU cores.
    pub max_threads: u32,
    /// Verify SEI decoded-picture hashes.
    pub check_hash: bool,
}

impl DecoderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn framerate(&self) -> Option<Fraction> {
        self.framerate
    }

    /// Sets the framerate override. Accepts 0/1 up to 100/1; a zero
    /// numerator removes the override.
    pub fn set_framerate(&mut self, framerate: Fraction) -> Result<()> {
        if framerate.den <= 0 || framerate.num < 0 {
            return Err(DecodeError::Config(format!("invalid framerate {}", framerate)));
        }
        if framerate.num as i64 > 100 * framerate.den as i64 {
            return Err(DecodeError::Config(format!(
                "framerate {} exceeds 100/1",
                framerate
            )));
        }
        self.framerate = if framerate.num == 0 {
            None
        } else {
            Some(framerate)
        };
        log::debug!("Framerate set to {}", framerate);
        Ok(())
    }

    pub fn set_max_threads(&mut self, max_threads: u32) {
        self.max_threads = max_threads;
        if max_threads == 0 {
            log::debug!("Max. threads set to auto");
        } else {
            log::debug!("Max. threads set to {}", max_threads);
        }
    }

    /// Applies one `key = value` setting.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "mode" => self.mode = value.parse()?,
            "framerate" => self.set_framerate(value.parse()?)?,
            "max_threads" => self.set_max_threads(value.parse()?),
            "check_hash" => self.check_hash = parse_bool(value)?,
            other => {
                return Err(DecodeError::Config(format!("unknown setting '{}'", other)));
            }
        }
        Ok(())
    }

    /// Defaults overlaid with the `H265DEC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    /// Defaults overlaid with the settings in `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_file(path)?;
        Ok(settings)
    }

    /// Defaults, then [`DEFAULT_CONFIG_PATH`] if it exists, then the environment.
    pub fn load() -> Result<Self> {
        let mut settings = Self::default();
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            settings.apply_file(DEFAULT_CONFIG_PATH)?;
        }
        settings.apply_env()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        let keys = [
            (ENV_MODE, "mode"),
            (ENV_FRAMERATE, "framerate"),
            (ENV_MAX_THREADS, "max_threads"),
            (ENV_CHECK_HASH, "check_hash"),
        ];
        for (var, key) in keys {
            if let Ok(value) = env::var(var) {
                self.apply(key, &value)?;
            }
        }
        Ok(())
    }

    fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut content = String::new();
        File::open(path)?.read_to_string(&mut content)?;
        self.apply_str(&content)
    }

    /// Applies every `key = value` line of `content`, skipping blanks and
    /// `#` comments.
    pub fn apply_str(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| DecodeError::Config(format!("malformed line '{}'", line)))?;
            self.apply(key, value)?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DecodeError::Config(format!("invalid boolean '{}'", other))),
    }
}
