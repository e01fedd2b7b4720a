//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
    /// Gameplay tuning applied to every new match
    pub match_settings: MatchSettings,
}

/// Gameplay tuning for a match
#[derive(Clone, Debug, PartialEq)]
pub struct MatchSettings {
    /// Lower bound of the random enemy spawn delay (seconds)
    pub spawn_min_delay: f32,
    /// Upper bound of the random enemy spawn delay (seconds)
    pub spawn_max_delay: f32,
    /// Seconds between shots while attacking
    pub fire_rate: f32,
    /// Speed above which an overlapping body knocks a character down
    pub knockdown_speed: f32,
    /// Seconds between stand-up attempts of a downed player
    pub recovery_interval: f32,
    /// Radius of the pawn-switch sensor
    pub sensor_radius: f32,
    /// How far enemies can see the player
    pub sight_radius: f32,
    /// Arm the recovery timer for downed enemies too
    pub recover_ai_characters: bool,
    /// How long a finished match keeps simulating before shutting down
    pub post_match_linger_secs: f32,
    /// Fixed RNG seed; random per match when unset
    pub seed: Option<u64>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            spawn_min_delay: 2.5,
            spawn_max_delay: 5.0,
            fire_rate: 0.3,
            knockdown_speed: 30.0,
            recovery_interval: 4.0,
            sensor_radius: 250.0,
            sight_radius: 2000.0,
            recover_ai_characters: false,
            post_match_linger_secs: 10.0,
            seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Some(port) = lookup("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
        };

        let defaults = MatchSettings::default();
        let match_settings = MatchSettings {
            spawn_min_delay: parse_tuning_or(&lookup, "SPAWN_MIN_DELAY", defaults.spawn_min_delay)?,
            spawn_max_delay: parse_tuning_or(&lookup, "SPAWN_MAX_DELAY", defaults.spawn_max_delay)?,
            fire_rate: parse_tuning_or(&lookup, "FIRE_RATE", defaults.fire_rate)?,
            knockdown_speed: parse_tuning_or(&lookup, "KNOCKDOWN_SPEED", defaults.knockdown_speed)?,
            recovery_interval: parse_tuning_or(&lookup, "RECOVERY_INTERVAL", defaults.recovery_interval)?,
            sensor_radius: parse_tuning_or(&lookup, "SENSOR_RADIUS", defaults.sensor_radius)?,
            sight_radius: parse_tuning_or(&lookup, "SIGHT_RADIUS", defaults.sight_radius)?,
            recover_ai_characters: parse_or(
                &lookup,
                "RECOVER_AI_CHARACTERS",
                defaults.recover_ai_characters,
            )?,
            post_match_linger_secs: parse_tuning_or(
                &lookup,
                "POST_MATCH_LINGER_SECS",
                defaults.post_match_linger_secs,
            )?,
            seed: match lookup("MATCH_SEED") {
                Some(raw) => Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::Invalid("MATCH_SEED"))?,
                ),
                None => None,
            },
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            match_settings,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Like [`parse_or`] for tuning values, which must be finite and not negative
fn parse_tuning_or<F>(lookup: &F, key: &'static str, default: f32) -> Result<f32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f32 = parse_or(lookup, key, default)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(key))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
