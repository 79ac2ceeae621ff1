//! TCP 连接管理
//!
//! 单客户端、后来者优先：新连接到达时旧连接被关闭（现场调试时
//! 残留的半死连接不能把控制器锁死）。当前活跃连接断开时中断在途
//! 运动并清空全部队列。断开清场先摘下写出端再排空队列，清场反馈
//! 因此走日志而非套接字；若新连接恰在清场事件排空前接入，个别
//! 旧会话事件仍可能写给它——反馈带序列号，客户端忽略不认识的
//! 序列号即可，这里不做事件代数过滤。
//!
//! 写出端是唯一串行点：所有反馈事件经一条汇聚通道由反馈泵线程
//! 逐行写出，行与行之间不会交错。

use crate::config::ServerConfig;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use reach_driver::{ArmContext, Router};
use reach_protocol::FeedbackEvent;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const PUMP_POLL: Duration = Duration::from_millis(100);

/// 当前活跃连接的写出端 + 连接代数
///
/// 代数区分"被新连接替换"与"客户端自己断开"：只有后者触发清场。
struct ConnectionHub {
    writer: Mutex<Option<TcpStream>>,
    generation: AtomicU64,
}

/// 服务主循环：接受连接直到上下文关停
///
/// 监听套接字由调用方绑定（测试时绑定临时端口）。
pub fn run(
    listener: TcpListener,
    config: &ServerConfig,
    router: Arc<Router>,
    feedback_rx: Receiver<FeedbackEvent>,
    ctx: Arc<ArmContext>,
) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    let hub = Arc::new(ConnectionHub {
        writer: Mutex::new(None),
        generation: AtomicU64::new(0),
    });

    let pump = {
        let hub = hub.clone();
        let ctx = ctx.clone();
        thread::spawn(move || feedback_pump(hub, feedback_rx, ctx))
    };

    while ctx.is_running() {
        match listener.accept() {
            Ok((stream, peer)) => {
                let generation = hub.generation.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::info!(%peer, generation, "Client connected");

                let reader_stream = stream.try_clone()?;
                if let Some(old) = hub.writer.lock().replace(stream) {
                    tracing::info!("Previous connection superseded");
                    let _ = old.shutdown(Shutdown::Both);
                }

                let hub = hub.clone();
                let router = router.clone();
                let ctx = ctx.clone();
                let max_line = config.max_line_bytes;
                thread::spawn(move || {
                    serve_connection(reader_stream, generation, hub, router, ctx, max_line)
                });
            },
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            },
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                thread::sleep(ACCEPT_POLL);
            },
        }
    }

    // 关停：切断活跃连接，等反馈泵排空
    if let Some(stream) = hub.writer.lock().take() {
        let _ = stream.shutdown(Shutdown::Both);
    }
    if pump.join().is_err() {
        tracing::warn!("Feedback pump panicked");
    }
    Ok(())
}

/// 反馈泵：汇聚通道 → 当前活跃连接，逐行串行写出
fn feedback_pump(
    hub: Arc<ConnectionHub>,
    feedback_rx: Receiver<FeedbackEvent>,
    ctx: Arc<ArmContext>,
) {
    loop {
        let event = match feedback_rx.recv_timeout(PUMP_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                if !ctx.is_running() {
                    break;
                }
                continue;
            },
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let line = event.to_line();
        let mut slot = hub.writer.lock();
        let write_err = match slot.as_mut() {
            Some(stream) => writeln!(stream, "{line}").err(),
            None => {
                // 无活跃连接：反馈只进日志，不静默消失
                tracing::debug!(%line, "Feedback with no client attached");
                None
            },
        };
        if let Some(e) = write_err {
            tracing::debug!(error = %e, "Feedback write failed, dropping connection");
            if let Some(dead) = slot.take() {
                let _ = dead.shutdown(Shutdown::Both);
            }
        }
    }
}

/// 单连接读取循环：有界行分帧 → 路由器
fn serve_connection(
    stream: TcpStream,
    generation: u64,
    hub: Arc<ConnectionHub>,
    router: Arc<Router>,
    ctx: Arc<ArmContext>,
    max_line: usize,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);

    while ctx.is_running() {
        buf.clear();
        let n = match reader
            .by_ref()
            .take(max_line as u64 + 1)
            .read_until(b'\n', &mut buf)
        {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Read failed");
                break;
            },
        };
        if n == 0 {
            break;
        }

        if buf.last() != Some(&b'\n') && buf.len() > max_line {
            // 超长行：拒绝整行并丢弃到下一个换行重新对齐
            router.reject_raw("line too long");
            if !resync_to_newline(&mut reader) {
                break;
            }
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        router.route_line(&line);
    }

    // 只有仍是活跃连接的断开才触发清场；被替换的连接静默退出。
    // 先摘写出端再清场，清场产生的 REJ 不再写向已死的套接字
    if hub.generation.load(Ordering::Acquire) == generation {
        tracing::info!(generation, "Client disconnected, purging queues");
        hub.writer.lock().take();
        router.purge_on_disconnect();
    } else {
        tracing::debug!(generation, "Superseded connection closed");
    }
}

/// 丢弃输入直到下一个换行；EOF 时返回 false
fn resync_to_newline(reader: &mut BufReader<TcpStream>) -> bool {
    let mut discard = Vec::with_capacity(256);
    loop {
        discard.clear();
        match reader.by_ref().take(4096).read_until(b'\n', &mut discard) {
            Ok(0) | Err(_) => return false,
            Ok(_) if discard.last() == Some(&b'\n') => return true,
            Ok(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::{SimArm, SimBuzzer, SimLed};
    use crate::store::TomlProfileStore;
    use crossbeam_channel::unbounded;
    use reach_driver::{
        ArmState, ArmWorker, BuzzerWorker, CommandQueues, DriverConfig, LedWorker, MotionConfig,
        to_joint_angles,
    };
    use reach_protocol::MoveTarget;
    use std::net::SocketAddr;

    struct Stack {
        addr: SocketAddr,
        ctx: Arc<ArmContext>,
        _dir: tempfile::TempDir,
    }

    fn start_stack() -> Stack {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            max_line_bytes: 64,
            driver: DriverConfig {
                motion: MotionConfig {
                    step_deg: 5.0,
                    segment_interval_us: 100,
                },
                ..DriverConfig::default()
            },
            ..ServerConfig::default()
        };

        let store = TomlProfileStore::new(dir.path().join("profile.toml"));
        let profile = store.load_or_default().unwrap();
        let initial = to_joint_angles(
            &MoveTarget::Cartesian(profile.home),
            &profile,
            &config.driver.geometry,
        )
        .unwrap();
        let ctx = ArmContext::new(
            profile,
            ArmState::at_angles(initial, &config.driver.geometry),
        );

        let (queues, receivers) =
            CommandQueues::new(config.driver.queue_capacity, config.driver.full_policy);
        let (feedback_tx, feedback_rx) = unbounded();

        let arm = ArmWorker::new(
            ctx.clone(),
            feedback_tx.clone(),
            SimArm,
            store,
            config.driver.clone(),
        );
        let led = LedWorker::new(ctx.clone(), feedback_tx.clone(), SimLed);
        let buzzer = BuzzerWorker::new(ctx.clone(), feedback_tx.clone(), SimBuzzer);
        thread::spawn(move || arm.run(receivers.action));
        thread::spawn(move || led.run(receivers.led));
        thread::spawn(move || buzzer.run(receivers.buzzer));

        let router = Arc::new(Router::new(queues, feedback_tx, ctx.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        {
            let ctx = ctx.clone();
            thread::spawn(move || run(listener, &config, router, feedback_rx, ctx).unwrap());
        }

        Stack {
            addr,
            ctx,
            _dir: dir,
        }
    }

    fn connect(addr: SocketAddr) -> (TcpStream, BufReader<TcpStream>) {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (stream, reader)
    }

    /// 收取 n 行反馈并按序列号排序
    fn collect_lines(reader: &mut BufReader<TcpStream>, n: usize) -> Vec<String> {
        let mut lines: Vec<String> = (0..n)
            .map(|_| {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                line.trim_end().to_string()
            })
            .collect();
        lines.sort_by_key(|line| {
            line.split_whitespace()
                .nth(1)
                .and_then(|seq| seq.parse::<u64>().ok())
                .unwrap_or(0)
        });
        lines
    }

    #[test]
    fn test_session_feedback_lines() {
        let stack = start_stack();
        let (mut stream, mut reader) = connect(stack.addr);

        stream.write_all(b"G0 X10 Y0 Z5\nbogus\nstatus\n").unwrap();
        let lines = collect_lines(&mut reader, 3);
        assert!(lines[0].starts_with("OK 1 "), "got {:?}", lines);
        assert!(lines[1].starts_with("REJ 2 "), "got {:?}", lines);
        assert!(lines[2].starts_with("OK 3 "), "got {:?}", lines);

        stack.ctx.shutdown();
    }

    #[test]
    fn test_oversized_line_rejected_and_resynced() {
        let stack = start_stack();
        let (mut stream, mut reader) = connect(stack.addr);

        let mut payload = vec![b'a'; 200];
        payload.push(b'\n');
        payload.extend_from_slice(b"status\n");
        stream.write_all(&payload).unwrap();

        let lines = collect_lines(&mut reader, 2);
        assert_eq!(lines[0], "REJ 1 line too long");
        assert!(lines[1].starts_with("OK 2 "), "got {:?}", lines);

        stack.ctx.shutdown();
    }

    #[test]
    fn test_most_recent_connection_wins() {
        let stack = start_stack();
        let (_stream1, mut reader1) = connect(stack.addr);
        // 等第一条连接登记为活跃写出端
        thread::sleep(Duration::from_millis(100));
        let (mut stream2, mut reader2) = connect(stack.addr);
        thread::sleep(Duration::from_millis(100));

        // 新连接接管：反馈只发给它
        stream2.write_all(b"status\n").unwrap();
        let lines = collect_lines(&mut reader2, 1);
        assert!(lines[0].starts_with("OK 1 "), "got {:?}", lines);

        // 旧连接已被服务器关闭
        let mut line = String::new();
        assert_eq!(reader1.read_line(&mut line).unwrap(), 0);

        stack.ctx.shutdown();
    }

    #[test]
    fn test_purge_feedback_stays_off_next_session() {
        let stack = start_stack();
        let (mut stream1, _reader1) = connect(stack.addr);
        thread::sleep(Duration::from_millis(100));

        // 排入多条运动命令后立刻断开，未消费的部分由清场排空
        stream1
            .write_all(b"G0 X0 Y200 Z40\nG0 X10 Y190 Z40\nG0 X-10 Y190 Z40\n")
            .unwrap();
        stream1.shutdown(Shutdown::Both).unwrap();
        drop(stream1);
        // 写出端已被摘下，清场反馈只进日志；等它排空再接入
        thread::sleep(Duration::from_millis(300));

        let (mut stream2, mut reader2) = connect(stack.addr);
        thread::sleep(Duration::from_millis(100));
        stream2.write_all(b"status\n").unwrap();

        // 新会话读到的第一行必须是自己的反馈，而非上个会话的清场 REJ
        let mut line = String::new();
        reader2.read_line(&mut line).unwrap();
        assert!(line.starts_with("OK 4 "), "got {line:?}");
        assert!(!line.contains("connection closed"), "got {line:?}");

        stack.ctx.shutdown();
    }
}
