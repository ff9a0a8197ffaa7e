//! # Luan (乱)
//!
//! 纯 Rust 实现的时间戳故障注入工具: 把输入容器重封装为同构的
//! 输出容器, 并在受控的一小部分数据包上故意损坏时间元数据
//! (PTS/DTS、时长或整体播放速度), 生成用于检验下游播放器/转码器
//! 健壮性的测试媒体.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use luan::fault::FaultPlan;
//! use luan::format::IoContext;
//!
//! let plan = FaultPlan::new("video", 5).unwrap();
//! let registry = luan::default_format_registry();
//!
//! let mut input_io = IoContext::open_read("input.flv").unwrap();
//! let mut demuxer = registry.open_input(&mut input_io, Some("input.flv")).unwrap();
//! let mut output_io = IoContext::open_write("output.flv").unwrap();
//! let mut muxer = registry.create_muxer(demuxer.format_id()).unwrap();
//!
//! let stats = luan::fault::run(
//!     demuxer.as_mut(),
//!     &mut input_io,
//!     muxer.as_mut(),
//!     &mut output_io,
//!     &plan,
//! )
//! .unwrap();
//! println!("重注入 {} 个扣留包", stats.held_back);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `luan-core` | 核心类型与时间基换算 |
//! | `luan-codec` | 编解码器标识与 Packet 抽象 |
//! | `luan-format` | 容器格式框架 (FLV, MPEG-TS) |
//! | `luan-fault` | 故障注入核心与重封装循环 |

/// 核心类型与工具 (对标 libavutil)
pub use luan_core as core;

/// 编解码器标识与数据包抽象 (对标 libavcodec)
pub use luan_codec as codec;

/// 容器格式框架 (对标 libavformat)
pub use luan_format as format;

/// 故障注入核心与重封装循环
pub use luan_fault as fault;

/// 获取 Luan 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> luan_format::FormatRegistry {
    let mut registry = luan_format::FormatRegistry::new();
    luan_format::register_all(&mut registry);
    registry
}
