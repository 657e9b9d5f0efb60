use std::env;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_GEOFENCE_RADIUS_METERS: f64 = 100.0;
pub const DEFAULT_CUSTOMER_DELAY_MINUTES: u64 = 30;
pub const DEFAULT_ROOM_PREFIX: &str = "delivery:";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub geofence_radius_meters: f64,
    pub customer_delay_minutes: u64,
    pub room_prefix: String,
    pub delivery_retention_days: i64,
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            geofence_radius_meters: parse_or_default(
                "GEOFENCE_RADIUS_METERS",
                DEFAULT_GEOFENCE_RADIUS_METERS,
            )?,
            customer_delay_minutes: parse_or_default(
                "CUSTOMER_DELAY_MINUTES",
                DEFAULT_CUSTOMER_DELAY_MINUTES,
            )?,
            room_prefix: env::var("TRACKING_ROOM_PREFIX")
                .unwrap_or_else(|_| DEFAULT_ROOM_PREFIX.to_string()),
            delivery_retention_days: parse_or_default("DELIVERY_RETENTION_DAYS", 30)?,
            cleanup_interval_secs: parse_or_default("CLEANUP_INTERVAL_SECS", 86_400)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn customer_delay(&self) -> Duration {
        Duration::from_secs(self.customer_delay_minutes * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    fn validate(&self) -> Result<(), AppError> {
        if !(self.geofence_radius_meters.is_finite() && self.geofence_radius_meters > 0.0) {
            return Err(AppError::Internal(
                "invalid GEOFENCE_RADIUS_METERS: must be a positive number".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            geofence_radius_meters: DEFAULT_GEOFENCE_RADIUS_METERS,
            customer_delay_minutes: DEFAULT_CUSTOMER_DELAY_MINUTES,
            room_prefix: DEFAULT_ROOM_PREFIX.to_string(),
            delivery_retention_days: 30,
            cleanup_interval_secs: 86_400,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.geofence_radius_meters, 100.0);
        assert_eq!(config.customer_delay(), Duration::from_secs(30 * 60));
        assert_eq!(config.room_prefix, "delivery:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let config = Config {
            geofence_radius_meters: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let value: u16 = parse_or_default("DELIVERY_TRACKER_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
