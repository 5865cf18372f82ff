use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8000")]
    pub port: u16,

    #[envconfig(default = "botwatch")]
    pub project_name: String,

    /// Prefix the externally supplied API router is nested under.
    #[envconfig(default = "/api/v1")]
    pub api_prefix: String,

    pub cors_origins: Option<String>, // Comma-delimited origins

    #[envconfig(default = "false")]
    pub debug: bool,

    #[envconfig(default = "development")]
    pub environment: String,

    pub sentry_dsn: Option<String>,

    #[envconfig(default = "1.0")]
    pub sentry_traces_sample_rate: f32,

    #[envconfig(default = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(default = "30")]
    pub heartbeat_interval_secs: u64,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_joins_host_and_port() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8000,
            project_name: "botwatch".to_string(),
            api_prefix: "/api/v1".to_string(),
            cors_origins: None,
            debug: false,
            environment: "test".to_string(),
            sentry_dsn: None,
            sentry_traces_sample_rate: 1.0,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            export_prometheus: false,
            heartbeat_interval_secs: 30,
        };

        assert_eq!(config.bind(), "127.0.0.1:8000");
    }
}
