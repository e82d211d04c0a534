//! 封装引擎.
//!
//! 驱动一个 [`Muxer`] 插件: 打开时检查编码白名单, 写包前按选项把每条流的
//! 时间戳平移到从 0 开始 (或只在出现负值时平移).

use std::collections::HashMap;

use avkit_codec::Packet;
use avkit_core::{AvError, AvResult, NOPTS_VALUE};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::context::FormatContext;
use crate::demuxer::PluginState;
use crate::io::IoContext;
use crate::muxer::{Muxer, is_codec_supported};
use crate::stream::Stream;

/// 封装选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxOptions {
    /// 每条流的时间戳都减去该流第一个包的最小时间戳
    pub zero_start: bool,
    /// 只有第一个包的时间戳为负时才平移
    pub nonnegative: bool,
}

/// 封装引擎
pub struct MuxEngine {
    ctx: FormatContext,
    muxer: Box<dyn Muxer>,
    options: MuxOptions,
    /// 流下标 -> 第一个包的最小时间戳
    first: HashMap<usize, i64>,
    state: PluginState,
}

impl MuxEngine {
    pub fn new(io: IoContext, muxer: Box<dyn Muxer>) -> Self {
        Self {
            ctx: FormatContext::new(io),
            muxer,
            options: MuxOptions::default(),
            first: HashMap::new(),
            state: PluginState::Uninitialized,
        }
    }

    pub fn context(&self) -> &FormatContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut FormatContext {
        &mut self.ctx
    }

    /// 添加一条输出流, 返回其下标
    pub fn add_stream(&mut self, stream: Stream) -> usize {
        let index = stream.index;
        self.ctx.add_stream(stream);
        index
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// 打开封装器
    ///
    /// 任何一条流的编码不被输出格式支持时返回 `CodecNotSupport`, 此时不会写出任何数据.
    pub async fn open(&mut self, options: MuxOptions) -> AvResult<()> {
        if self.state != PluginState::Uninitialized {
            return Err(AvError::InvalidState(format!(
                "open 只能调用一次, 当前状态 {:?}",
                self.state
            )));
        }
        let format = self.muxer.format_id();
        for stream in &self.ctx.streams {
            let codec_id = stream.codecpar.codec_id;
            if !is_codec_supported(format, codec_id) {
                error!("{format} 不支持编码 {codec_id} (流 {})", stream.index);
                self.state = PluginState::Failed;
                return Err(AvError::CodecNotSupport(format!(
                    "{format} 不支持编码 {codec_id}"
                )));
            }
        }
        self.options = options;
        self.ctx.format = Some(format);
        self.first.clear();
        if let Err(e) = self.muxer.init(&mut self.ctx) {
            self.state = PluginState::Failed;
            return Err(e);
        }
        self.state = PluginState::Initialized;
        Ok(())
    }

    pub async fn write_header(&mut self) -> AvResult<()> {
        if self.state != PluginState::Initialized {
            return Err(AvError::InvalidState(format!(
                "写头部前需要先 open, 当前状态 {:?}",
                self.state
            )));
        }
        self.muxer.write_header(&mut self.ctx).await?;
        self.state = PluginState::HeaderRead;
        debug!("{}: 头部已写入", self.muxer.name());
        Ok(())
    }

    /// 写入一个数据包
    ///
    /// 包的时间戳会按选项就地平移, 调用方可据此得知实际写出的值.
    pub async fn write_packet(&mut self, packet: &mut Packet) -> AvResult<()> {
        match self.state {
            PluginState::HeaderRead | PluginState::Streaming => {}
            state => {
                return Err(AvError::InvalidState(format!(
                    "当前状态 {state:?} 不能写包"
                )));
            }
        }
        if self.ctx.stream_by_index(packet.stream_index).is_none() {
            return Err(AvError::StreamNotFound(packet.stream_index));
        }
        self.state = PluginState::Streaming;

        let first = *self.first.entry(packet.stream_index).or_insert_with(|| {
            [packet.dts, packet.pts]
                .into_iter()
                .filter(|&ts| ts != NOPTS_VALUE)
                .min()
                .unwrap_or(0)
        });
        let shift = self.options.zero_start || (self.options.nonnegative && first < 0);
        if shift && first != 0 {
            if packet.dts != NOPTS_VALUE {
                packet.dts -= first;
            }
            if packet.pts != NOPTS_VALUE {
                packet.pts -= first;
            }
        }
        self.muxer.write_packet(&mut self.ctx, packet).await
    }

    pub async fn write_trailer(&mut self) -> AvResult<()> {
        match self.state {
            PluginState::HeaderRead | PluginState::Streaming => {}
            state => {
                return Err(AvError::InvalidState(format!(
                    "当前状态 {state:?} 不能写尾部"
                )));
            }
        }
        self.muxer.write_trailer(&mut self.ctx).await?;
        self.muxer.flush(&mut self.ctx).await
    }

    pub async fn flush(&mut self) -> AvResult<()> {
        self.muxer.flush(&mut self.ctx).await
    }

    /// 销毁插件, 可重复调用
    pub async fn close(&mut self) {
        if matches!(
            self.state,
            PluginState::Uninitialized | PluginState::Destroyed
        ) {
            return;
        }
        self.muxer.destroy(&mut self.ctx).await;
        self.state = PluginState::Destroyed;
    }
}
