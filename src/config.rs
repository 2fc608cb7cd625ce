use std::time::Duration;

/// Process configuration loaded from the environment, following the
/// `env::var(..).unwrap_or_else(|_| default)` idiom the teacher's
/// `main.rs` uses for `LOG_LEVEL`/`BIND_ADDR`.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub otp_retention: Duration,
    pub otp_sweep_period: Duration,
    pub eviction_threshold: u32,
    pub eviction_retention: Duration,
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub max_message_size: usize,
    pub client_inbox_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT").unwrap_or_else(|_| "7331".to_owned());
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| format!("0.0.0.0:{port}"));
        Self {
            bind_addr,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            bind_addr: "0.0.0.0:7331".to_owned(),
            otp_retention: Duration::from_secs(5),
            otp_sweep_period: Duration::from_millis(400),
            eviction_threshold: 10,
            eviction_retention: Duration::from_secs(10),
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: (pong_wait * 9) / 10,
            max_message_size: 512,
            client_inbox_capacity: 16,
        }
    }
}
