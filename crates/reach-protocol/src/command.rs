//! 入站命令语法定义
//!
//! 固定前缀集合（源自原始硬件协议的 G-code 风格 token）：
//!
//! | 前缀  | 含义                 | 形式                                        |
//! |-------|----------------------|---------------------------------------------|
//! | `G0`  | 笛卡尔移动           | `G0 X<f> Y<f> Z<f>`（单位 mm）              |
//! | `G1`  | 命名点移动           | `G1 P<name>`                                |
//! | `S10` | 标定                 | `S10 HOME/PLANE/SENSOR/POINT ...`           |
//! | `S1`  | LED 模式 + RGB       | `S1 M<mode> R<u8> G<u8> B<u8>`              |
//! | `S2`  | 蜂鸣器               | `S2 B<freq> T<ms>`（freq=0 表示关闭）       |
//! | 关键字| 系统命令（绕过队列） | `stop` / `status` / `load` / `relax`        |
//!
//! 序列号在解析时分配（由调用方传入），定义客户端可见的全序。

use crate::ProtocolError;
use num_enum::TryFromPrimitive;

/// 笛卡尔坐标点（毫米）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartesianPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl CartesianPoint {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 移动目标
#[derive(Debug, Clone, PartialEq)]
pub enum MoveTarget {
    /// 笛卡尔目标（经运动学引擎换算为关节角）
    Cartesian(CartesianPoint),
    /// 命名标定点（直接查表得到关节角）
    Named(String),
}

/// 标定平面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlaneKind {
    /// XZ 参考平面（沿 X 轴的高度修正）
    Xz,
    /// YZ 参考平面（沿 Y 轴的高度修正）
    Yz,
}

/// 平面标定采样点：沿平面轴的位置 + 实测高度
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaneSample {
    pub along: f64,
    pub height: f64,
}

/// 标定请求
///
/// 每个变体对应标定档案的一个子档案；替换是全有或全无的，
/// 由上层以快照交换方式提交。
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrateRequest {
    /// 重设原点（home point）
    Home(CartesianPoint),
    /// 从两个采样点重算参考平面的线性修正
    Plane {
        plane: PlaneKind,
        samples: [PlaneSample; 2],
    },
    /// 重设传感器中心（2D）
    Sensor { u: f64, v: f64 },
    /// 记录命名点（三个关节角，单位度）
    Point { name: String, angles: [f64; 3] },
}

/// LED 工作模式
///
/// 模式值与原始硬件固件一致；Off/Rainbow/Gradient 不使用 RGB 参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum LedMode {
    Off = 0,
    Solid = 1,
    Following = 2,
    Blink = 3,
    Breathing = 4,
    Rainbow = 5,
    Gradient = 6,
}

impl LedMode {
    /// 该模式是否使用 RGB 颜色数据
    pub fn uses_rgb(self) -> bool {
        !matches!(self, LedMode::Off | LedMode::Rainbow | LedMode::Gradient)
    }
}

/// LED 命令：模式 + RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCommand {
    pub mode: LedMode,
    pub rgb: [u8; 3],
}

/// 蜂鸣器音调：频率（Hz，0 = 关闭）+ 持续时间（ms，0 = 保持到下一条命令）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSpec {
    pub frequency_hz: u32,
    pub duration_ms: u64,
}

/// 系统命令（绕过队列，立即生效）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCommand {
    /// 急停：中断在途运动并冲刷动作队列
    Stop,
    /// 查询当前臂状态
    Status,
    /// 使能电机
    Load,
    /// 释放电机（可手动拖动）
    Relax,
}

/// 命令种类（已解析参数）
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Move(MoveTarget),
    Calibrate(CalibrateRequest),
    Led(LedCommand),
    Buzzer(ToneSpec),
    System(SystemCommand),
}

impl CommandKind {
    /// 命令所属类别（用于反馈事件标记和队列路由）
    pub fn class(&self) -> CommandClass {
        match self {
            CommandKind::Move(_) => CommandClass::Move,
            CommandKind::Calibrate(_) => CommandClass::Calibrate,
            CommandKind::Led(_) => CommandClass::Led,
            CommandKind::Buzzer(_) => CommandClass::Buzzer,
            CommandKind::System(_) => CommandClass::System,
        }
    }
}

/// 命令类别标签（轻量，用于反馈和日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    Move,
    Calibrate,
    Led,
    Buzzer,
    System,
    /// 解析失败、无法归类的行（仍占用序列号并产生反馈）
    Unknown,
}

impl std::fmt::Display for CommandClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandClass::Move => "MOVE",
            CommandClass::Calibrate => "CAL",
            CommandClass::Led => "LED",
            CommandClass::Buzzer => "BUZ",
            CommandClass::System => "SYS",
            CommandClass::Unknown => "UNK",
        };
        f.write_str(s)
    }
}

/// 已解析的命令
///
/// 解析后不可变；由路由器创建，被恰好一个域工作线程消费一次。
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// 序列号（解析时分配，客户端可见全序的依据）
    pub seq: u64,
    /// 原始命令行文本（用于日志与反馈 detail）
    pub raw: String,
    /// 已解析的命令参数
    pub kind: CommandKind,
}

impl Command {
    /// 解析一行命令文本
    ///
    /// 只做语法检查：token 齐全、数字可解析、枚举取值合法。
    /// 语义范围检查（限位、工作空间）属于安全校验器。
    ///
    /// # 错误
    /// - `EmptyLine`：空行或纯空白
    /// - `UnknownCommand`：前缀不在固定集合中
    /// - `MissingArgument` / `BadArgument` / `InvalidValue`
    pub fn parse(seq: u64, line: &str) -> Result<Self, ProtocolError> {
        let raw = line.trim();
        if raw.is_empty() {
            return Err(ProtocolError::EmptyLine);
        }

        let mut tokens = raw.split_whitespace();
        // 上面已确认非空，这里一定有首 token
        let prefix = tokens.next().unwrap_or_default();

        let kind = match prefix {
            "G0" => parse_cartesian_move(tokens)?,
            "G1" => parse_named_move(tokens)?,
            "S10" => parse_calibrate(tokens)?,
            "S1" => parse_led(tokens)?,
            "S2" => parse_buzzer(tokens)?,
            other => match other.to_ascii_lowercase().as_str() {
                "stop" => CommandKind::System(SystemCommand::Stop),
                "status" => CommandKind::System(SystemCommand::Status),
                "load" => CommandKind::System(SystemCommand::Load),
                "relax" => CommandKind::System(SystemCommand::Relax),
                _ => {
                    return Err(ProtocolError::UnknownCommand {
                        prefix: other.to_string(),
                    });
                },
            },
        };

        Ok(Command {
            seq,
            raw: raw.to_string(),
            kind,
        })
    }
}

/// 解析带单字母前缀的浮点 token（如 `X10.5`）
fn prefixed_f64(token: &str, prefix: char) -> Option<Result<f64, ProtocolError>> {
    let rest = token.strip_prefix(prefix)?;
    Some(rest.parse::<f64>().map_err(|_| ProtocolError::BadArgument {
        token: token.to_string(),
    }))
}

fn parse_cartesian_move<'a>(
    tokens: impl Iterator<Item = &'a str>,
) -> Result<CommandKind, ProtocolError> {
    let (mut x, mut y, mut z) = (None, None, None);
    for token in tokens {
        if let Some(v) = prefixed_f64(token, 'X') {
            x = Some(v?);
        } else if let Some(v) = prefixed_f64(token, 'Y') {
            y = Some(v?);
        } else if let Some(v) = prefixed_f64(token, 'Z') {
            z = Some(v?);
        } else {
            return Err(ProtocolError::BadArgument {
                token: token.to_string(),
            });
        }
    }
    let x = x.ok_or(ProtocolError::MissingArgument { what: "X" })?;
    let y = y.ok_or(ProtocolError::MissingArgument { what: "Y" })?;
    let z = z.ok_or(ProtocolError::MissingArgument { what: "Z" })?;
    Ok(CommandKind::Move(MoveTarget::Cartesian(
        CartesianPoint::new(x, y, z),
    )))
}

fn parse_named_move<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<CommandKind, ProtocolError> {
    let token = tokens
        .next()
        .ok_or(ProtocolError::MissingArgument { what: "P<name>" })?;
    let name = token
        .strip_prefix('P')
        .ok_or_else(|| ProtocolError::BadArgument {
            token: token.to_string(),
        })?;
    if name.is_empty() {
        return Err(ProtocolError::MissingArgument { what: "point name" });
    }
    Ok(CommandKind::Move(MoveTarget::Named(name.to_string())))
}

/// 解析 `<f>,<f>` 形式的采样对
fn parse_pair(token: &str) -> Result<(f64, f64), ProtocolError> {
    let bad = || ProtocolError::BadArgument {
        token: token.to_string(),
    };
    let (a, b) = token.split_once(',').ok_or_else(bad)?;
    let a = a.parse::<f64>().map_err(|_| bad())?;
    let b = b.parse::<f64>().map_err(|_| bad())?;
    Ok((a, b))
}

fn parse_calibrate<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<CommandKind, ProtocolError> {
    let target = tokens
        .next()
        .ok_or(ProtocolError::MissingArgument { what: "calibration target" })?;

    let request = match target.to_ascii_uppercase().as_str() {
        "HOME" => {
            let CommandKind::Move(MoveTarget::Cartesian(point)) = parse_cartesian_move(tokens)?
            else {
                unreachable!("parse_cartesian_move only builds cartesian moves");
            };
            CalibrateRequest::Home(point)
        },
        "PLANE" => {
            let plane = match tokens
                .next()
                .ok_or(ProtocolError::MissingArgument { what: "plane (XZ|YZ)" })?
                .to_ascii_uppercase()
                .as_str()
            {
                "XZ" => PlaneKind::Xz,
                "YZ" => PlaneKind::Yz,
                other => {
                    return Err(ProtocolError::InvalidValue {
                        field: "plane",
                        value: other.to_string(),
                    });
                },
            };
            let mut samples = [PlaneSample {
                along: 0.0,
                height: 0.0,
            }; 2];
            for sample in samples.iter_mut() {
                let token = tokens
                    .next()
                    .ok_or(ProtocolError::MissingArgument { what: "plane sample" })?;
                let (along, height) = parse_pair(token)?;
                *sample = PlaneSample { along, height };
            }
            CalibrateRequest::Plane { plane, samples }
        },
        "SENSOR" => {
            let token = tokens
                .next()
                .ok_or(ProtocolError::MissingArgument { what: "sensor center" })?;
            let (u, v) = parse_pair(token)?;
            CalibrateRequest::Sensor { u, v }
        },
        "POINT" => {
            let name = tokens
                .next()
                .ok_or(ProtocolError::MissingArgument { what: "point name" })?
                .to_string();
            let mut angles = [0.0f64; 3];
            for angle in angles.iter_mut() {
                let token = tokens
                    .next()
                    .ok_or(ProtocolError::MissingArgument { what: "joint angle" })?;
                *angle = token.parse().map_err(|_| ProtocolError::BadArgument {
                    token: token.to_string(),
                })?;
            }
            CalibrateRequest::Point { name, angles }
        },
        other => {
            return Err(ProtocolError::InvalidValue {
                field: "calibration target",
                value: other.to_string(),
            });
        },
    };

    Ok(CommandKind::Calibrate(request))
}

/// 解析带单字母前缀的整数 token（如 `M1`、`R255`）
fn prefixed_u32(token: &str, prefix: char) -> Option<Result<u32, ProtocolError>> {
    let rest = token.strip_prefix(prefix)?;
    Some(rest.parse::<u32>().map_err(|_| ProtocolError::BadArgument {
        token: token.to_string(),
    }))
}

fn parse_led<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<CommandKind, ProtocolError> {
    let mut mode = None;
    let mut rgb = [0u8; 3];
    for token in tokens {
        if let Some(v) = prefixed_u32(token, 'M') {
            let v = v?;
            // 先窄化再查枚举，避免截断让 256+n 混入合法模式
            mode = Some(
                u8::try_from(v)
                    .ok()
                    .and_then(|m| LedMode::try_from(m).ok())
                    .ok_or(ProtocolError::InvalidValue {
                        field: "led mode",
                        value: v.to_string(),
                    })?,
            );
        } else if let Some(v) = prefixed_u32(token, 'R') {
            rgb[0] = channel(v?, token)?;
        } else if let Some(v) = prefixed_u32(token, 'G') {
            rgb[1] = channel(v?, token)?;
        } else if let Some(v) = prefixed_u32(token, 'B') {
            rgb[2] = channel(v?, token)?;
        } else {
            return Err(ProtocolError::BadArgument {
                token: token.to_string(),
            });
        }
    }
    let mode = mode.ok_or(ProtocolError::MissingArgument { what: "M<mode>" })?;
    Ok(CommandKind::Led(LedCommand { mode, rgb }))
}

fn channel(v: u32, token: &str) -> Result<u8, ProtocolError> {
    u8::try_from(v).map_err(|_| ProtocolError::BadArgument {
        token: token.to_string(),
    })
}

fn parse_buzzer<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<CommandKind, ProtocolError> {
    let mut frequency_hz = None;
    let mut duration_ms = 0u64;
    for token in tokens {
        if let Some(v) = prefixed_u32(token, 'B') {
            frequency_hz = Some(v?);
        } else if let Some(v) = prefixed_u32(token, 'T') {
            duration_ms = v? as u64;
        } else {
            return Err(ProtocolError::BadArgument {
                token: token.to_string(),
            });
        }
    }
    let frequency_hz = frequency_hz.ok_or(ProtocolError::MissingArgument { what: "B<freq>" })?;
    Ok(CommandKind::Buzzer(ToneSpec {
        frequency_hz,
        duration_ms,
    }))
}
