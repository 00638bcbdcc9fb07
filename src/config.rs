use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// Base URL of the frontend serving the join form; QR contents point
    /// here. Set via ROLLCALL_FRONTEND_URL. Default: http://localhost:3000.
    pub frontend_url: String,
    /// Join-code validity in days. Set via ROLLCALL_JOIN_VALIDITY_DAYS.
    /// Default: 30.
    pub join_validity_days: i64,
    /// Default attendance-session window in minutes when the teacher does
    /// not pick one. Set via ROLLCALL_ATTENDANCE_MINUTES. Default: 10.
    pub default_attendance_minutes: u32,
    /// Personal QR token validity in minutes.
    /// Set via ROLLCALL_PERSONAL_MINUTES. Default: 10.
    pub personal_validity_minutes: i64,
    /// Re-read attempts when a redemption races a concurrent update.
    /// Set via ROLLCALL_REDEEM_RETRIES. Default: 3.
    pub redeem_retries: u32,
    /// Rendered QR edge length in pixels. Set via ROLLCALL_QR_SIZE.
    /// Default: 250.
    pub qr_size: u32,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    Ok(Config {
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/rollcall".into()),
        frontend_url: std::env::var("ROLLCALL_FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        join_validity_days: env_or("ROLLCALL_JOIN_VALIDITY_DAYS", 30),
        default_attendance_minutes: env_or("ROLLCALL_ATTENDANCE_MINUTES", 10),
        personal_validity_minutes: env_or("ROLLCALL_PERSONAL_MINUTES", 10),
        redeem_retries: env_or("ROLLCALL_REDEEM_RETRIES", 3),
        qr_size: env_or("ROLLCALL_QR_SIZE", 250),
    })
}
