// Server configuration

use std::path::PathBuf;

#[derive(Clone)]
pub struct ServerConfig {
    /// Directory the served field files live under
    pub data_dir: PathBuf,
    pub version: String,
}
