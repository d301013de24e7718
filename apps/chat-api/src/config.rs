/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Broker address, either `host:port` or a full `redis://` URL.
    pub redis_addr: String,
    pub redis_password: Option<String>,
    /// Shared secret required on upgrade requests when set.
    pub ws_secret: Option<String>,
    /// HS256 secret for access tokens issued by the auth service.
    pub jwt_secret: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            redis_addr: optional_var("REDIS_ADDR").unwrap_or_else(|| "localhost:6379".to_string()),
            redis_password: optional_var("REDIS_PASSWORD"),
            ws_secret: optional_var("WS_SECRET"),
            jwt_secret: optional_var("JWT_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }

    /// Connection URL for the broker, with the password spliced in if set.
    pub fn redis_url(&self) -> String {
        let addr = self
            .redis_addr
            .strip_prefix("redis://")
            .unwrap_or(&self.redis_addr);
        match &self.redis_password {
            Some(password) if !addr.contains('@') => format!("redis://:{password}@{addr}"),
            _ => format!("redis://{addr}"),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(addr: &str, password: Option<&str>) -> Config {
        Config {
            database_url: "postgres://localhost/chat".to_string(),
            redis_addr: addr.to_string(),
            redis_password: password.map(str::to_string),
            ws_secret: None,
            jwt_secret: None,
            port: 8080,
        }
    }

    #[test]
    fn redis_url_from_host_port() {
        assert_eq!(config("localhost:6379", None).redis_url(), "redis://localhost:6379");
    }

    #[test]
    fn redis_url_keeps_full_url() {
        assert_eq!(
            config("redis://cache:6380/2", None).redis_url(),
            "redis://cache:6380/2"
        );
    }

    #[test]
    fn redis_url_includes_password() {
        assert_eq!(
            config("cache:6379", Some("s3cret")).redis_url(),
            "redis://:s3cret@cache:6379"
        );
        assert_eq!(
            config("redis://:inline@cache:6379", Some("ignored")).redis_url(),
            "redis://:inline@cache:6379"
        );
    }
}
