//! 命令队列
//!
//! 三条相互独立的有界 FIFO 通道（Action / LED / Buzzer）。
//! 域之间物理独立，故意不提供跨队列顺序保证；队列内严格 FIFO。
//! 队列满时按配置阻塞或显式拒绝——任何路径都不允许静默丢弃。

use crate::config::FullPolicy;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use reach_protocol::Command;

/// 命令域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// 机械臂动作（Move / Calibrate / Load / Relax）
    Action,
    /// LED
    Led,
    /// 蜂鸣器
    Buzzer,
}

/// 入队错误
#[derive(Debug)]
pub enum EnqueueError {
    /// 队列满（Reject 策略），命令原样返还供调用方产生反馈
    Full(Command),
    /// 队列已关闭（对应工作线程已退出），命令原样返还
    Closed(Command),
}

/// 队列发送端集合（路由器持有）
///
/// 同时保留接收端克隆用于 `flush`：crossbeam 通道是 MPMC，
/// 工作线程与 flush 并发取件时每条命令仍只被消费一次。
pub struct CommandQueues {
    action_tx: Sender<Command>,
    led_tx: Sender<Command>,
    buzzer_tx: Sender<Command>,
    action_rx: Receiver<Command>,
    led_rx: Receiver<Command>,
    buzzer_rx: Receiver<Command>,
    policy: FullPolicy,
}

/// 队列接收端集合（分发给各工作线程）
pub struct QueueReceivers {
    pub action: Receiver<Command>,
    pub led: Receiver<Command>,
    pub buzzer: Receiver<Command>,
}

impl CommandQueues {
    /// 创建三条有界队列
    pub fn new(capacity: usize, policy: FullPolicy) -> (Self, QueueReceivers) {
        let (action_tx, action_rx) = bounded(capacity);
        let (led_tx, led_rx) = bounded(capacity);
        let (buzzer_tx, buzzer_rx) = bounded(capacity);
        let receivers = QueueReceivers {
            action: action_rx.clone(),
            led: led_rx.clone(),
            buzzer: buzzer_rx.clone(),
        };
        (
            Self {
                action_tx,
                led_tx,
                buzzer_tx,
                action_rx,
                led_rx,
                buzzer_rx,
                policy,
            },
            receivers,
        )
    }

    fn sender(&self, domain: Domain) -> &Sender<Command> {
        match domain {
            Domain::Action => &self.action_tx,
            Domain::Led => &self.led_tx,
            Domain::Buzzer => &self.buzzer_tx,
        }
    }

    fn receiver(&self, domain: Domain) -> &Receiver<Command> {
        match domain {
            Domain::Action => &self.action_rx,
            Domain::Led => &self.led_rx,
            Domain::Buzzer => &self.buzzer_rx,
        }
    }

    /// 入队一条命令
    ///
    /// `Block` 策略下满队列时阻塞发送方；`Reject` 策略下立即
    /// 返回 [`EnqueueError::Full`]，由调用方产生 Rejected 反馈。
    pub fn enqueue(&self, domain: Domain, command: Command) -> Result<(), EnqueueError> {
        match self.policy {
            FullPolicy::Block => self
                .sender(domain)
                .send(command)
                .map_err(|e| EnqueueError::Closed(e.into_inner())),
            FullPolicy::Reject => match self.sender(domain).try_send(command) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(command)) => Err(EnqueueError::Full(command)),
                Err(TrySendError::Disconnected(command)) => Err(EnqueueError::Closed(command)),
            },
        }
    }

    /// 冲刷一条队列，返回被丢弃的命令
    ///
    /// 每条返还的命令都必须由调用方产生一条终态反馈
    /// （不变量：入队的命令绝不静默消失）。
    pub fn flush(&self, domain: Domain) -> Vec<Command> {
        let rx = self.receiver(domain);
        let mut drained = Vec::new();
        while let Ok(command) = rx.try_recv() {
            drained.push(command);
        }
        drained
    }

    /// 冲刷全部三条队列（断连清场用）
    pub fn flush_all(&self) -> Vec<Command> {
        let mut drained = self.flush(Domain::Action);
        drained.extend(self.flush(Domain::Led));
        drained.extend(self.flush(Domain::Buzzer));
        drained
    }

    /// 指定域当前排队深度
    pub fn len(&self, domain: Domain) -> usize {
        self.receiver(domain).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_protocol::Command;

    fn command(seq: u64, line: &str) -> Command {
        Command::parse(seq, line).unwrap()
    }

    #[test]
    fn test_fifo_within_domain() {
        let (queues, receivers) = CommandQueues::new(8, FullPolicy::Reject);
        queues.enqueue(Domain::Led, command(1, "S1 M1 R1 G2 B3")).unwrap();
        queues.enqueue(Domain::Led, command(2, "S1 M0")).unwrap();

        assert_eq!(receivers.led.recv().unwrap().seq, 1);
        assert_eq!(receivers.led.recv().unwrap().seq, 2);
    }

    #[test]
    fn test_reject_when_full() {
        let (queues, _receivers) = CommandQueues::new(1, FullPolicy::Reject);
        queues.enqueue(Domain::Buzzer, command(1, "S2 B100")).unwrap();
        let err = queues.enqueue(Domain::Buzzer, command(2, "S2 B200")).unwrap_err();
        match err {
            EnqueueError::Full(returned) => assert_eq!(returned.seq, 2),
            other => panic!("expected Full, got {:?}", other),
        }
    }

    #[test]
    fn test_domains_independent() {
        let (queues, _receivers) = CommandQueues::new(1, FullPolicy::Reject);
        // Buzzer 满不影响 LED
        queues.enqueue(Domain::Buzzer, command(1, "S2 B100")).unwrap();
        queues.enqueue(Domain::Led, command(2, "S1 M0")).unwrap();
        assert_eq!(queues.len(Domain::Buzzer), 1);
        assert_eq!(queues.len(Domain::Led), 1);
    }

    #[test]
    fn test_flush_returns_drained_commands() {
        let (queues, _receivers) = CommandQueues::new(8, FullPolicy::Reject);
        for seq in 1..=3 {
            queues.enqueue(Domain::Action, command(seq, "G0 X0 Y150 Z80")).unwrap();
        }
        let drained = queues.flush(Domain::Action);
        assert_eq!(drained.len(), 3);
        assert_eq!(
            drained.iter().map(|c| c.seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(queues.len(Domain::Action), 0);
    }

    #[test]
    fn test_flush_all() {
        let (queues, _receivers) = CommandQueues::new(8, FullPolicy::Reject);
        queues.enqueue(Domain::Action, command(1, "G0 X0 Y150 Z80")).unwrap();
        queues.enqueue(Domain::Led, command(2, "S1 M0")).unwrap();
        queues.enqueue(Domain::Buzzer, command(3, "S2 B100")).unwrap();
        assert_eq!(queues.flush_all().len(), 3);
    }
}
