//! # luan-fault
//!
//! Luan 时间戳故障注入核心.
//!
//! 把输入容器重封装为同构的输出容器, 并按选定策略在一小部分
//! 数据包上故意损坏时间元数据, 生成用于检验播放器/转码器
//! 健壮性的测试媒体:
//!
//! - [`FaultPlan`]: 校验用户参数, 选定唯一的故障策略
//! - [`SpeedScaler`]: 全局速度缩放, 作用于每一个数据包
//! - [`HoldBackCorruptor`]: 扣留目标流的前若干个数据包,
//!   改写时间戳后在流末尾重新注入
//! - [`session::run`]: 驱动整个读取-换算-分发-写出循环

pub mod hold;
pub mod plan;
pub mod session;
pub mod speed;

// 重导出常用类型
pub use hold::HoldBackCorruptor;
pub use plan::{FaultMethod, FaultPlan};
pub use session::{RemuxStats, run};
pub use speed::SpeedScaler;
