//! 标定档案的 TOML 持久化

use reach_driver::{CalibrationProfile, ProfileStore, StoreError};
use std::path::PathBuf;
use tracing::info;

pub struct TomlProfileStore {
    path: PathBuf,
}

impl TomlProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 启动时加载档案；文件不存在时返回出厂缺省
    pub fn load_or_default(&self) -> Result<CalibrationProfile, StoreError> {
        match self.load() {
            Ok(profile) => Ok(profile),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No calibration profile, using factory defaults");
                Ok(CalibrationProfile::default())
            },
            Err(e) => Err(e),
        }
    }
}

impl ProfileStore for TomlProfileStore {
    fn load(&self) -> Result<CalibrationProfile, StoreError> {
        let text = std::fs::read_to_string(&self.path)?;
        toml::from_str(&text).map_err(|e| StoreError::Format(e.to_string()))
    }

    fn save(&self, profile: &CalibrationProfile) -> Result<(), StoreError> {
        let text = toml::to_string_pretty(profile).map_err(|e| StoreError::Format(e.to_string()))?;
        // 先写临时文件再改名，避免写入中断留下半截档案
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
