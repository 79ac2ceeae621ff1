//! 出站反馈行编码
//!
//! 每个被接收的命令（含被拒绝的）恰好产生一行反馈：
//!
//! ```text
//! OK <seq> <detail>
//! REJ <seq> <detail>
//! ERR <seq> <detail>
//! ```
//!
//! **固定策略**：反馈按完成顺序交付（as-available），以序列号标记，
//! 由客户端按序列号重组意图顺序。跨域命令的完成顺序本就无保证。

use crate::command::CommandClass;

/// 反馈状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackStatus {
    /// 命令执行成功
    Ok,
    /// 命令被拒绝（语法错误或安全校验失败），未触碰硬件
    Rejected,
    /// 执行中发生硬件故障，工作线程已恢复
    Error,
}

impl FeedbackStatus {
    /// 线上状态标记
    pub fn wire_tag(self) -> &'static str {
        match self {
            FeedbackStatus::Ok => "OK",
            FeedbackStatus::Rejected => "REJ",
            FeedbackStatus::Error => "ERR",
        }
    }
}

/// 反馈事件
///
/// 由域工作线程（或解析层，对于拒绝）创建，经共享汇聚通道交给
/// 连接管理器的串行写出点。
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackEvent {
    /// 对应命令的序列号
    pub seq: u64,
    /// 命令类别
    pub class: CommandClass,
    /// 状态
    pub status: FeedbackStatus,
    /// 人类/机器可读的详情
    pub detail: String,
}

impl FeedbackEvent {
    pub fn ok(seq: u64, class: CommandClass, detail: impl Into<String>) -> Self {
        Self {
            seq,
            class,
            status: FeedbackStatus::Ok,
            detail: detail.into(),
        }
    }

    pub fn rejected(seq: u64, class: CommandClass, detail: impl Into<String>) -> Self {
        Self {
            seq,
            class,
            status: FeedbackStatus::Rejected,
            detail: detail.into(),
        }
    }

    pub fn error(seq: u64, class: CommandClass, detail: impl Into<String>) -> Self {
        Self {
            seq,
            class,
            status: FeedbackStatus::Error,
            detail: detail.into(),
        }
    }

    /// 编码为一行反馈（不含换行符）
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.status.wire_tag(), self.seq, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_line_encoding() {
        let ev = FeedbackEvent::ok(1, CommandClass::Move, "moved to X10 Y0 Z5");
        assert_eq!(ev.to_line(), "OK 1 moved to X10 Y0 Z5");

        let ev = FeedbackEvent::rejected(3, CommandClass::Move, "out of workspace");
        assert_eq!(ev.to_line(), "REJ 3 out of workspace");

        let ev = FeedbackEvent::error(7, CommandClass::Buzzer, "tone driver fault");
        assert_eq!(ev.to_line(), "ERR 7 tone driver fault");
    }

    #[test]
    fn test_status_tags() {
        assert_eq!(FeedbackStatus::Ok.wire_tag(), "OK");
        assert_eq!(FeedbackStatus::Rejected.wire_tag(), "REJ");
        assert_eq!(FeedbackStatus::Error.wire_tag(), "ERR");
    }
}
