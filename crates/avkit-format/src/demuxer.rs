//! 解封装插件 (Demuxer) trait 定义.
//!
//! 每种容器格式实现一个 `Demuxer`, 由 [`crate::demux::DemuxEngine`] 驱动.
//! 插件只负责格式相关的部分: 解析头部、提取包、定位;
//! 前瞻缓冲、探测、带内参数修补等通用逻辑由引擎完成.

use async_trait::async_trait;
use avkit_codec::Packet;
use avkit_core::AvResult;
use bitflags::bitflags;

use crate::context::FormatContext;
use crate::format_id::FormatId;

bitflags! {
    /// Seek 标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeekFlags: u32 {
        /// 目标值是字节偏移, 不是时间戳
        const BYTE = 1 << 0;
        /// 目标值是时间戳
        const TIMESTAMP = 1 << 1;
        /// 允许落在任意帧上, 不要求关键帧
        const ANY = 1 << 2;
    }
}

/// 插件生命周期状态
///
/// `Uninitialized -> Initialized -> HeaderRead -> Streaming -> Destroyed`,
/// 头部解析失败进入 `Failed`, 之后只允许销毁.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninitialized,
    Initialized,
    HeaderRead,
    Streaming,
    Failed,
    Destroyed,
}

/// 解封装插件 trait
///
/// 使用流程 (由引擎调用):
/// 1. `init()` 安装私有解析状态, 只调用一次
/// 2. `read_header()` 解析头部, 为每条基本流创建 `Stream`
/// 3. 循环 `read_packet()`, 可穿插 `seek()`
/// 4. `destroy()` 释放插件持有的资源
#[async_trait]
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str {
        self.format_id().name()
    }

    /// 安装插件私有解析状态
    fn init(&mut self, _ctx: &mut FormatContext) -> AvResult<()> {
        Ok(())
    }

    /// 解析容器头部
    ///
    /// 为每条基本流调用 `ctx.create_stream()`, 带索引的格式同时填充
    /// 样本索引. 数据不合法时返回 `DataInvalid` 或 `FormatNotSupport`.
    async fn read_header(&mut self, ctx: &mut FormatContext) -> AvResult<()>;

    /// 提取下一个数据包
    ///
    /// 顺带发现的其他包可以放入 `ctx.interval.packet_buffer` 稍后交付.
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功提取一个包
    /// - `Err(AvError::Eof)`: 容器已读完, 之后仍可 seek 重新开始
    async fn read_packet(&mut self, ctx: &mut FormatContext) -> AvResult<Packet>;

    /// 定位
    ///
    /// # 参数
    /// - `stream_index`: 目标流, 字节定位时为 `None`
    /// - `timestamp`: `BYTE` 时为字节偏移, 否则为目标流时间基下的时间戳
    /// - `flags`: Seek 标志
    ///
    /// # 返回
    /// 定位前的字节位置 (未知时为 0), 供调用方失败时恢复
    async fn seek(
        &mut self,
        _ctx: &mut FormatContext,
        _stream_index: Option<usize>,
        _timestamp: i64,
        _flags: SeekFlags,
    ) -> AvResult<i64> {
        Err(avkit_core::AvError::FormatNotSupport(format!(
            "{} 不支持 seek",
            self.name()
        )))
    }

    /// 探测阶段需要观察到的流数量, 头部已完整描述所有流时为 0
    fn analyze_streams_count(&self) -> usize {
        0
    }

    /// 探测时长的下限 (毫秒), 0 表示不限制
    fn min_analyze_duration_ms(&self) -> u64 {
        0
    }

    /// 头部不携带流时长、需要扫描文件尾部估算时长的格式返回 true
    fn needs_duration_estimate(&self) -> bool {
        false
    }

    /// 释放插件持有的资源
    async fn destroy(&mut self, _ctx: &mut FormatContext) {}
}
