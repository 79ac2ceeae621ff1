//! 解析与路由
//!
//! 连接管理器把每条入站文本行交给 [`Router`]：
//! - 分配序列号（全局单调递增，定义客户端可见全序）；
//! - 解析失败立即产生 Rejected 反馈，绝不静默丢弃；
//! - 按命令类别投递到对应域队列；
//! - stop / status 绕过队列，在调用线程上立即生效。

use crate::queue::{CommandQueues, Domain, EnqueueError};
use crate::state::ArmContext;
use crossbeam_channel::Sender;
use reach_protocol::{Command, CommandClass, CommandKind, FeedbackEvent, SystemCommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// 命令路由器
pub struct Router {
    queues: CommandQueues,
    feedback_tx: Sender<FeedbackEvent>,
    ctx: Arc<ArmContext>,
    next_seq: AtomicU64,
}

impl Router {
    pub fn new(
        queues: CommandQueues,
        feedback_tx: Sender<FeedbackEvent>,
        ctx: Arc<ArmContext>,
    ) -> Self {
        Self {
            queues,
            feedback_tx,
            ctx,
            next_seq: AtomicU64::new(1),
        }
    }

    /// 处理一条入站文本行
    ///
    /// 空行直接跳过，不占用序列号。其余每一行（包括解析失败的）
    /// 都被分配序列号，并保证最终恰好产生一条反馈。
    pub fn route_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let command = match Command::parse(seq, line) {
            Ok(command) => command,
            Err(e) => {
                debug!(seq, line = line.trim(), error = %e, "Rejected unparseable line");
                self.emit(FeedbackEvent::rejected(
                    seq,
                    CommandClass::Unknown,
                    e.to_string(),
                ));
                return;
            },
        };

        match &command.kind {
            CommandKind::System(SystemCommand::Stop) => self.handle_stop(seq),
            CommandKind::System(SystemCommand::Status) => {
                self.emit(FeedbackEvent::ok(
                    seq,
                    CommandClass::System,
                    self.ctx.arm_state().summary(),
                ));
            },
            // load/relax 与移动共用 Action 队列，保持与在队移动的相对顺序
            CommandKind::System(_) => self.dispatch(Domain::Action, command),
            CommandKind::Move(_) | CommandKind::Calibrate(_) => {
                self.dispatch(Domain::Action, command)
            },
            CommandKind::Led(_) => self.dispatch(Domain::Led, command),
            CommandKind::Buzzer(_) => self.dispatch(Domain::Buzzer, command),
        }
    }

    /// 急停：推进停止纪元中断在途运动，再冲刷动作队列。
    /// LED / 蜂鸣器队列不受影响。
    fn handle_stop(&self, seq: u64) {
        self.ctx.request_stop();
        let drained = self.queues.flush(Domain::Action);
        let count = drained.len();
        for stale in drained {
            self.emit(FeedbackEvent::rejected(
                stale.seq,
                stale.kind.class(),
                "flushed by stop",
            ));
        }
        debug!(seq, flushed = count, "Stop executed");
        self.emit(FeedbackEvent::ok(
            seq,
            CommandClass::System,
            format!("stopped, {count} queued command(s) flushed"),
        ));
    }

    fn dispatch(&self, domain: Domain, command: Command) {
        match self.queues.enqueue(domain, command) {
            Ok(()) => {},
            Err(EnqueueError::Full(command)) => {
                debug!(seq = command.seq, ?domain, "Queue full, command rejected");
                self.emit(FeedbackEvent::rejected(
                    command.seq,
                    command.kind.class(),
                    "queue full",
                ));
            },
            Err(EnqueueError::Closed(command)) => {
                warn!(seq = command.seq, ?domain, "Queue closed, worker gone");
                self.emit(FeedbackEvent::error(
                    command.seq,
                    command.kind.class(),
                    "worker unavailable",
                ));
            },
        }
    }

    /// 拒绝一条无法作为文本行交付的输入（超长行、非法编码）
    ///
    /// 仍占用一个序列号并产生 Rejected 反馈，维持"每条被接收的
    /// 输入恰好一条反馈"的不变量。
    pub fn reject_raw(&self, detail: &str) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(seq, detail, "Rejected undeliverable input");
        self.emit(FeedbackEvent::rejected(seq, CommandClass::Unknown, detail));
    }

    /// 连接断开时清场：中断在途运动并清空全部队列
    ///
    /// 被清除的命令仍产生 Rejected 反馈——此时客户端通常已收不到，
    /// 但反馈泵会把它们记入日志，保持"绝不静默消失"的不变量。
    pub fn purge_on_disconnect(&self) {
        self.ctx.request_stop();
        let drained = self.queues.flush_all();
        if !drained.is_empty() {
            debug!(purged = drained.len(), "Purged queues on disconnect");
        }
        for stale in drained {
            self.emit(FeedbackEvent::rejected(
                stale.seq,
                stale.kind.class(),
                "connection closed",
            ));
        }
    }

    fn emit(&self, event: FeedbackEvent) {
        if self.feedback_tx.send(event).is_err() {
            warn!("Feedback channel closed, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationProfile;
    use crate::config::FullPolicy;
    use crate::kinematics::ArmGeometry;
    use crate::queue::QueueReceivers;
    use crate::state::ArmState;
    use crossbeam_channel::{Receiver, unbounded};
    use reach_protocol::FeedbackStatus;

    fn router(capacity: usize) -> (Router, QueueReceivers, Receiver<FeedbackEvent>) {
        let (queues, receivers) = CommandQueues::new(capacity, FullPolicy::Reject);
        let (feedback_tx, feedback_rx) = unbounded();
        let geometry = ArmGeometry::default();
        let ctx = ArmContext::new(
            CalibrationProfile::default(),
            ArmState::at_angles([0.0, 90.0, 90.0], &geometry),
        );
        (Router::new(queues, feedback_tx, ctx), receivers, feedback_rx)
    }

    #[test]
    fn test_routes_to_domain_queues() {
        let (router, receivers, _feedback) = router(8);
        router.route_line("G0 X10 Y0 Z5");
        router.route_line("S1 M1 R255 G0 B0");
        router.route_line("S2 B2000 T100");

        assert_eq!(receivers.action.recv().unwrap().seq, 1);
        assert_eq!(receivers.led.recv().unwrap().seq, 2);
        assert_eq!(receivers.buzzer.recv().unwrap().seq, 3);
    }

    #[test]
    fn test_parse_error_produces_rejected_feedback() {
        let (router, _receivers, feedback) = router(8);
        router.route_line("FLY X1 Y2 Z3");
        let ev = feedback.recv().unwrap();
        assert_eq!(ev.seq, 1);
        assert_eq!(ev.status, FeedbackStatus::Rejected);
        assert_eq!(ev.class, CommandClass::Unknown);
    }

    #[test]
    fn test_empty_line_consumes_no_seq() {
        let (router, receivers, _feedback) = router(8);
        router.route_line("   ");
        router.route_line("G0 X10 Y0 Z5");
        assert_eq!(receivers.action.recv().unwrap().seq, 1);
    }

    #[test]
    fn test_seq_strictly_increasing_across_domains() {
        let (router, receivers, feedback) = router(8);
        router.route_line("G0 X10 Y0 Z5");
        router.route_line("bogus");
        router.route_line("S1 M0");

        assert_eq!(receivers.action.recv().unwrap().seq, 1);
        assert_eq!(feedback.recv().unwrap().seq, 2);
        assert_eq!(receivers.led.recv().unwrap().seq, 3);
    }

    #[test]
    fn test_stop_flushes_action_queue_only() {
        let (router, receivers, feedback) = router(8);
        router.route_line("G0 X10 Y0 Z5");
        router.route_line("G0 X20 Y0 Z5");
        router.route_line("S1 M1 R1 G1 B1");
        router.route_line("stop");

        // 两条在队移动被冲刷，各得一条 Rejected；stop 本身得 Ok
        let mut rejected = 0;
        let mut stop_ok = false;
        while let Ok(ev) = feedback.try_recv() {
            match ev.status {
                FeedbackStatus::Rejected => {
                    assert_eq!(ev.detail, "flushed by stop");
                    rejected += 1;
                },
                FeedbackStatus::Ok => {
                    assert_eq!(ev.seq, 4);
                    stop_ok = true;
                },
                other => panic!("unexpected status {:?}", other),
            }
        }
        assert_eq!(rejected, 2);
        assert!(stop_ok);
        // LED 队列不受 stop 影响
        assert_eq!(receivers.led.recv().unwrap().seq, 3);
        assert!(receivers.action.try_recv().is_err());
    }

    #[test]
    fn test_status_immediate_ok() {
        let (router, _receivers, feedback) = router(8);
        router.route_line("status");
        let ev = feedback.recv().unwrap();
        assert_eq!(ev.status, FeedbackStatus::Ok);
        assert!(ev.detail.contains("motors=loaded"));
    }

    #[test]
    fn test_queue_full_rejected() {
        let (router, _receivers, feedback) = router(1);
        router.route_line("S2 B100 T10");
        router.route_line("S2 B200 T10");
        let ev = feedback.recv().unwrap();
        assert_eq!(ev.seq, 2);
        assert_eq!(ev.status, FeedbackStatus::Rejected);
        assert_eq!(ev.detail, "queue full");
    }

    #[test]
    fn test_purge_on_disconnect() {
        let (router, receivers, feedback) = router(8);
        router.route_line("G0 X10 Y0 Z5");
        router.route_line("S1 M0");
        router.purge_on_disconnect();

        let mut purged = 0;
        while let Ok(ev) = feedback.try_recv() {
            assert_eq!(ev.status, FeedbackStatus::Rejected);
            assert_eq!(ev.detail, "connection closed");
            purged += 1;
        }
        assert_eq!(purged, 2);
        assert!(receivers.action.try_recv().is_err());
        assert!(receivers.led.try_recv().is_err());
    }
}
