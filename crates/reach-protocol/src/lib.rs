//! 协议层模块
//!
//! 本模块提供 Reach 机械臂控制器的线协议定义，包括：
//! - 入站命令语法（固定前缀 token 集合，单一解析入口）
//! - 出站反馈行编码（每个命令恰好一行反馈）
//! - 类型化解析错误（`ProtocolError`）
//!
//! # 设计说明
//!
//! 协议是换行分隔的文本协议。解析只负责语法有效性（数字能否解析、
//! token 是否齐全）；语义范围检查（关节限位、工作空间）属于上层的
//! 安全校验器，不在本 crate 职责内。

pub mod command;
pub mod feedback;

pub use command::{
    CalibrateRequest, CartesianPoint, Command, CommandClass, CommandKind, LedCommand, LedMode,
    MoveTarget, PlaneKind, PlaneSample, SystemCommand, ToneSpec,
};
pub use feedback::{FeedbackEvent, FeedbackStatus};

use thiserror::Error;

/// 协议解析错误类型
///
/// 解析失败统一映射为 `Rejected` 反馈，不入队。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 空行（跳过，不产生反馈）
    #[error("Empty command line")]
    EmptyLine,

    /// 未识别的命令前缀
    #[error("Unknown command prefix: {prefix}")]
    UnknownCommand { prefix: String },

    /// 缺少必需参数
    #[error("Missing argument: {what}")]
    MissingArgument { what: &'static str },

    /// 参数无法解析为数字
    #[error("Bad numeric argument: {token}")]
    BadArgument { token: String },

    /// 字段取值非法（如 LED 模式超出 0-6）
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
