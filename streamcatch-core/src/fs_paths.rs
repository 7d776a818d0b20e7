use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "STREAMCATCH_DATA_DIR";

pub trait AppPaths: Send + Sync {
    fn downloads_dir(&self) -> PathBuf;
    fn data_dir(&self) -> PathBuf;

    fn settings_file(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }

    fn store_file(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }
}

#[cfg(feature = "desktop")]
pub struct DesktopPaths;

#[cfg(feature = "desktop")]
impl AppPaths for DesktopPaths {
    fn downloads_dir(&self) -> PathBuf {
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("streamcatch"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
