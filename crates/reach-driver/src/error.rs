//! 驱动层错误类型定义

use crate::actuator::ActuationError;
use crate::calibration::{CalibrationError, StoreError};
use crate::kinematics::KinematicsError;
use crate::safety::SafetyError;
use reach_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
///
/// 故障在检测到它的组件边界处转换为反馈事件；
/// 任何错误都不允许越过工作线程的上报步骤静默传播。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 协议解析错误（拒绝，不入队）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 运动学换算失败（拒绝，不触碰硬件）
    #[error("Kinematics error: {0}")]
    Kinematics(#[from] KinematicsError),

    /// 安全校验失败（拒绝，不触碰硬件）
    #[error("Safety error: {0}")]
    Safety(#[from] SafetyError),

    /// 标定数据非法（拒绝，保留原档案）
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// 档案持久化失败（标定不生效，保留原档案）
    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),

    /// 硬件执行故障（工作线程上报后恢复到 Idle）
    #[error("Actuation fault: {0}")]
    Actuation(#[from] ActuationError),

    /// 命令队列已满（Reject 策略下的显式拒绝）
    #[error("Command queue full")]
    QueueFull,

    /// 命令队列已关闭（工作线程退出）
    #[error("Command queue closed")]
    QueueClosed,
}
