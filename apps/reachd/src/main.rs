//! # reachd
//!
//! Reach 机械臂的 TCP 命令守护进程。
//!
//! ```bash
//! # 缺省监听 0.0.0.0:5000，档案存放在工作目录
//! reachd
//!
//! # 指定配置文件与端口
//! reachd --config /etc/reachd.toml --port 6000
//! ```
//!
//! 协议：每行一条命令（`G0 X10 Y0 Z5`、`S1 M1 R255 G0 B0`、
//! `stop` 等），每条被接收的命令恰好回一行
//! `OK|REJ|ERR <seq> <detail>`。

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use reach_driver::{
    ArmContext, ArmState, ArmWorker, BuzzerWorker, CommandQueues, LedWorker, Router,
    to_joint_angles,
};
use reach_protocol::MoveTarget;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

mod actuators;
mod config;
mod server;
mod store;

use actuators::{SimArm, SimBuzzer, SimLed};
use config::ServerConfig;
use store::TomlProfileStore;

/// Reach 机械臂 TCP 守护进程
#[derive(Parser, Debug)]
#[command(name = "reachd")]
#[command(about = "TCP command daemon for the Reach robot arm", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（TOML）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听端口（覆盖配置文件）
    #[arg(long)]
    port: Option<u16>,

    /// 标定档案文件（覆盖配置文件）
    #[arg(long)]
    profile: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reachd=info".parse()?)
                .add_directive("reach_driver=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(profile) = cli.profile {
        config.profile_path = profile;
    }

    let store = TomlProfileStore::new(config.profile_path.clone());
    let profile = store
        .load_or_default()
        .context("failed to load calibration profile")?;

    // 上电姿态取档案原点；原点不可达（档案被手工改坏）时退到竖直姿态
    let initial_angles = match to_joint_angles(
        &MoveTarget::Cartesian(profile.home),
        &profile,
        &config.driver.geometry,
    ) {
        Ok(angles) => angles,
        Err(e) => {
            warn!(error = %e, "Home point unreachable, starting upright");
            [0.0, 90.0, 90.0]
        },
    };
    let ctx = ArmContext::new(
        profile,
        ArmState::at_angles(initial_angles, &config.driver.geometry),
    );

    let (queues, receivers) = CommandQueues::new(config.driver.queue_capacity, config.driver.full_policy);
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
    let workers = vec![
        thread::spawn(move || arm.run(receivers.action)),
        thread::spawn(move || led.run(receivers.led)),
        thread::spawn(move || buzzer.run(receivers.buzzer)),
    ];

    let router = Arc::new(Router::new(queues, feedback_tx, ctx.clone()));

    {
        let ctx = ctx.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown signal received");
            ctx.shutdown();
        })
        .context("failed to install signal handler")?;
    }

    let listener = TcpListener::bind(config.listen_addr())
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
    info!(addr = %config.listen_addr(), "reachd listening");

    server::run(listener, &config, router, feedback_rx, ctx)?;

    for handle in workers {
        if handle.join().is_err() {
            warn!("Worker thread panicked during shutdown");
        }
    }
    info!("reachd stopped");
    Ok(())
}
