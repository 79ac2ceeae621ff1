//! 驱动层配置
//!
//! 由守护进程从 TOML 文件反序列化后传入；所有字段带默认值，
//! 缺省配置即可在仿真执行器上运行。

use crate::kinematics::ArmGeometry;
use crate::safety::SafetyLimits;

/// 队列满时的入队策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullPolicy {
    /// 阻塞发送方直到有空位
    Block,
    /// 立即拒绝（产生 Rejected 反馈，绝不静默丢弃）
    Reject,
}

/// 运动插值参数
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// 单个插值段的最大关节角变化（度）——取消标志的轮询粒度
    pub step_deg: f64,
    /// 相邻插值段之间的间隔（微秒）
    pub segment_interval_us: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_deg: 1.0,
            segment_interval_us: 2_000,
        }
    }
}

/// 驱动层配置
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 每条命令队列的容量
    pub queue_capacity: usize,
    /// 队列满策略
    pub full_policy: FullPolicy,
    /// 机械几何
    pub geometry: ArmGeometry,
    /// 安全限值
    pub limits: SafetyLimits,
    /// 运动插值
    pub motion: MotionConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            full_policy: FullPolicy::Reject,
            geometry: ArmGeometry::default(),
            limits: SafetyLimits::default(),
            motion: MotionConfig::default(),
        }
    }
}
