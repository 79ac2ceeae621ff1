//! 守护进程配置
//!
//! TOML 文件反序列化，缺省即可运行（监听 0.0.0.0:5000，
//! 档案存放在工作目录）。命令行参数覆盖文件取值。

use anyhow::Context;
use reach_driver::DriverConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind: String,
    /// 监听端口
    pub port: u16,
    /// 标定档案文件
    pub profile_path: PathBuf,
    /// 单行命令的最大字节数（超出则拒绝并重新对齐到下一换行）
    pub max_line_bytes: usize,
    /// 驱动层配置
    pub driver: DriverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            profile_path: PathBuf::from("reach-profile.toml"),
            max_line_bytes: 1024,
            driver: DriverConfig::default(),
        }
    }
}

impl ServerConfig {
    /// 从 TOML 文件加载；文件不存在时返回缺省配置
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
