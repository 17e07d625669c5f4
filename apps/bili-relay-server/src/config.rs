//! Configuration management for Bili Relay Server

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::PlatformAuth;

/// Upper bound for the session TTL
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub bilibili: BilibiliConfig,
    pub upload: UploadConfig,
    pub transcode: TranscodeConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct BilibiliConfig {
    pub base_url: String,
    pub auth: PlatformAuth,
    pub profile: String,
    pub upcdn: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Sessions older than this are reaped
    pub session_ttl_secs: u64,
    /// How often the reaper sweeps
    pub sweep_interval_secs: u64,
    /// Reset a session's age on every successful chunk
    pub renew_on_chunk: bool,
    /// Request body limit for chunk and cover uploads
    pub max_body_bytes: usize,
    /// Where one-click uploads are spooled before relaying
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    pub ffmpeg_bin: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("BILIBILI_SESSDATA is set but BILIBILI_BILI_JCT is missing")]
    IncompleteCookie,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            bilibili: BilibiliConfig::default(),
            upload: UploadConfig::default(),
            transcode: TranscodeConfig {
                ffmpeg_bin: "ffmpeg".to_string(),
                input_dir: PathBuf::from("./uploads"),
                output_dir: PathBuf::from("./processed"),
            },
        }
    }
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        BilibiliConfig {
            base_url: "https://member.bilibili.com".to_string(),
            auth: PlatformAuth::Anonymous,
            profile: "ugcfx/bup".to_string(),
            upcdn: "txa".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            session_ttl_secs: 60 * 60,
            sweep_interval_secs: 10 * 60,
            renew_on_chunk: false,
            max_body_bytes: 64 * 1024 * 1024,
            temp_dir: PathBuf::from("./temp"),
        }
    }
}

impl UploadConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject values the reaper cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_secs == 0 || self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "UPLOAD_SESSION_TTL_SECS",
                value: self.session_ttl_secs.to_string(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "UPLOAD_SWEEP_INTERVAL_SECS",
                value: self.sweep_interval_secs.to_string(),
            });
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            bilibili: BilibiliConfig {
                base_url: env::var("BILIBILI_BASE_URL").unwrap_or(defaults.bilibili.base_url),
                auth: auth_from_env()?,
                profile: env::var("BILIBILI_PROFILE").unwrap_or(defaults.bilibili.profile),
                upcdn: env::var("BILIBILI_UPCDN").unwrap_or(defaults.bilibili.upcdn),
                timeout_secs: parse_var("BILIBILI_TIMEOUT_SECS", defaults.bilibili.timeout_secs)?,
            },
            upload: UploadConfig {
                session_ttl_secs: parse_var("UPLOAD_SESSION_TTL_SECS", defaults.upload.session_ttl_secs)?,
                sweep_interval_secs: parse_var(
                    "UPLOAD_SWEEP_INTERVAL_SECS",
                    defaults.upload.sweep_interval_secs,
                )?,
                renew_on_chunk: parse_var("UPLOAD_RENEW_ON_CHUNK", defaults.upload.renew_on_chunk)?,
                max_body_bytes: parse_var("UPLOAD_MAX_BODY_BYTES", defaults.upload.max_body_bytes)?,
                temp_dir: env::var("UPLOAD_TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.temp_dir),
            },
            transcode: TranscodeConfig {
                ffmpeg_bin: env::var("FFMPEG_BIN").unwrap_or(defaults.transcode.ffmpeg_bin),
                input_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.transcode.input_dir),
                output_dir: env::var("PROCESSED_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.transcode.output_dir),
            },
        };

        config.upload.validate()?;
        Ok(config)
    }
}

/// Cookie auth wins over a bearer token when both are present
fn auth_from_env() -> Result<PlatformAuth, ConfigError> {
    let sessdata = env::var("BILIBILI_SESSDATA").ok().filter(|v| !v.is_empty());
    let bili_jct = env::var("BILIBILI_BILI_JCT").ok().filter(|v| !v.is_empty());
    let token = env::var("BILIBILI_ACCESS_TOKEN").ok().filter(|v| !v.is_empty());

    match (sessdata, bili_jct, token) {
        (Some(sessdata), Some(bili_jct), _) => Ok(PlatformAuth::Cookie { sessdata, bili_jct }),
        (Some(_), None, _) => Err(ConfigError::IncompleteCookie),
        (None, _, Some(token)) => Ok(PlatformAuth::Bearer { token }),
        _ => Ok(PlatformAuth::Anonymous),
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}
