//! 硬件执行能力（外部协作者边界）
//!
//! 原始 GPIO/PWM/步进脉冲驱动不在核心范围内；域工作线程通过
//! 这些 trait 调用硬件，把失败当作硬件故障处理（上报 `Error`
//! 反馈后恢复到 Idle，不终止线程）。

use reach_protocol::{LedCommand, ToneSpec};
use thiserror::Error;

/// 硬件执行故障
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuationError {
    #[error("Hardware fault: {0}")]
    Hardware(String),
}

/// 机械臂执行能力
///
/// `drive_segment` 按细粒度插值段调用，调用间隙由 Arm 工作线程
/// 轮询取消标志——这是 stop 命令能中断在途运动的前提。
pub trait ArmActuator: Send {
    /// 驱动关节到一组中间角度（一个插值段）
    fn drive_segment(&mut self, angles: &[f64; 3]) -> Result<(), ActuationError>;

    /// 使能/释放电机
    fn set_enabled(&mut self, enabled: bool) -> Result<(), ActuationError>;

    /// 立即停住当前运动（取消或故障后调用，尽力而为）
    fn halt(&mut self) -> Result<(), ActuationError> {
        Ok(())
    }
}

/// LED 执行能力
pub trait LedActuator: Send {
    fn set_led(&mut self, command: &LedCommand) -> Result<(), ActuationError>;
}

/// 蜂鸣器执行能力
///
/// `play_tone` 在音调持续期间阻塞（工作线程唯一允许阻塞在
/// 真实世界计时上的状态就是 Executing）。
pub trait BuzzerActuator: Send {
    fn play_tone(&mut self, tone: &ToneSpec) -> Result<(), ActuationError>;
}
