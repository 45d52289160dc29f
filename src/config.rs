use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Directory holding `services.txt` and `problems.txt`.
    pub data_dir: String,
    /// Base URL of the registration/booking endpoints.
    pub backend_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_url: String,
    pub http_timeout_secs: u64,
    pub session_ttl_minutes: i64,
    pub service_match_threshold: f64,
    pub problem_match_threshold: f64,
    pub secret_key: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        Self {
            port,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "tallerbot.db".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{port}")),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            openai_url: env::var("OPENAI_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 10),
            session_ttl_minutes: parse_or("SESSION_TTL_MINUTES", 30),
            service_match_threshold: parse_or("SERVICE_MATCH_THRESHOLD", 0.2),
            problem_match_threshold: parse_or("PROBLEM_MATCH_THRESHOLD", 0.2),
            secret_key: env::var("SECRET_KEY").unwrap_or_else(|_| "changeme".to_string()),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
