#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_dir: std::path::PathBuf,
    pub db_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dir: directories::ProjectDirs::from("dtn", "Satnet", env!("CARGO_PKG_NAME"))
                .map_or_else(
                    || {
                        #[cfg(unix)]
                        return std::path::Path::new("/var/spool").join(env!("CARGO_PKG_NAME"));

                        #[cfg(windows)]
                        return std::env::temp_dir().join(env!("CARGO_PKG_NAME"));

                        #[cfg(not(any(unix, windows)))]
                        compile_error!("No idea how to determine default sqlite store directory for target platform");
                    },
                    |project_dirs| project_dirs.data_local_dir().into(),
                ),
            db_name: String::from("bundles.db"),
        }
    }
}
