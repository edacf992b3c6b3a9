use std::net::SocketAddr;

/// Settings for the server binary, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            base_path: unifetch_core::options::DEFAULT_BASE_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    /// `PORT` and `BASE_PATH`; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.port),
            base_path: lookup("BASE_PATH").unwrap_or(defaults.base_path),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_use_defaults() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.base_path, "/api");
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "PORT" => Some("8080".to_string()),
            "BASE_PATH" => Some("/data".to_string()),
            _ => None,
        });
        assert_eq!(config.port, 8080);
        assert_eq!(config.base_path, "/data");
        assert_eq!(config.addr().port(), 8080);
    }

    #[test]
    fn bad_port_falls_back() {
        let config = ServerConfig::from_lookup(|key| (key == "PORT").then(|| "nope".to_string()));
        assert_eq!(config.port, 3000);
    }
}
