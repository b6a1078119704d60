use std::env;

use chrono::NaiveTime;

/// Booking window bounds, inclusive on both ends.
#[derive(Debug, Clone, Copy)]
pub struct BusinessHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        BusinessHours {
            open: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        }
    }
}

impl BusinessHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.open && time <= self.close
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_lifetime_secs: i64,
    pub refresh_token_lifetime_secs: i64,
    pub business_hours: BusinessHours,
}

impl AppConfig {
    /// Read configuration from the environment, with development defaults.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/reservas.db".to_string());

        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                log::warn!(
                    "JWT_SECRET not set. Using an insecure default. Set JWT_SECRET in production."
                );
                "insecure-dev-secret".to_string()
            }
        };

        let business_hours = BusinessHours {
            open: parse_time_env("BUSINESS_OPEN", "08:00:00")?,
            close: parse_time_env("BUSINESS_CLOSE", "18:00:00")?,
        };
        if business_hours.open > business_hours.close {
            return Err("BUSINESS_OPEN must not be later than BUSINESS_CLOSE".into());
        }

        Ok(AppConfig {
            database_url,
            port,
            jwt_secret,
            access_token_lifetime_secs: 60 * 60,
            refresh_token_lifetime_secs: 24 * 60 * 60,
            business_hours,
        })
    }
}

fn parse_time_env(key: &str, default: &str) -> Result<NaiveTime, Box<dyn std::error::Error>> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .map_err(|err| format!("{key} must be HH:MM:SS: {err}").into())
}
