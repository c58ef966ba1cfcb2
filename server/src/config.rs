use serde_derive::{Deserialize, Serialize};
use serdeconv;
use std::path::Path;

pub const DEFAULT_PORT: u16 = 1234;

#[derive(Serialize, Deserialize)]
pub struct Server {
    pub address: Option<String>,
    pub max_clients: u16,
}

#[derive(Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: Server,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            server: Server {
                address: Some(format!("0.0.0.0:{}", DEFAULT_PORT)),
                max_clients: 1024,
            },
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ServerConfig {
        serdeconv::from_toml_file(path).expect("Error loading server configuration file")
    }

    /// The effective listen address.
    pub fn address(&self) -> String {
        self.server
            .address
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT))
    }
}
