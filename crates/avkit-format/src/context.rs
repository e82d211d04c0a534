//! 格式上下文.
//!
//! 贯穿所有 demux/mux 操作的数据对象: 流注册表、前瞻包缓冲区和字节流端口.
//! 插件与引擎都通过 `&mut FormatContext` 访问它, 调用方必须串行化操作.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use avkit_codec::Packet;
use avkit_core::MediaType;
use bitflags::bitflags;
use log::debug;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 进程内递增的流 id
static NEXT_STREAM_ID: AtomicU32 = AtomicU32::new(1);

bitflags! {
    /// 上下文出错记录
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ErrorFlags: u32 {
        /// 头部解析失败, 上下文不可再用
        const HEADER = 1 << 0;
        /// 发生过 I/O 错误
        const IO = 1 << 1;
        /// 操作被取消过
        const ABORTED = 1 << 2;
    }
}

/// 引擎内部的前瞻状态
#[derive(Debug, Default)]
pub struct Interval {
    /// 已从容器中提取、尚未交付给调用方的包 (FIFO)
    pub packet_buffer: VecDeque<Packet>,
}

/// 格式上下文
pub struct FormatContext {
    /// 流列表, `index` 互不相同
    pub streams: Vec<Stream>,
    /// 容器级元数据
    pub metadata: HashMap<String, String>,
    /// 字节流端口
    pub io: IoContext,
    pub interval: Interval,
    pub error_flag: ErrorFlags,
    /// 当前插件的格式
    pub format: Option<FormatId>,
    next_stream_index: usize,
}

impl FormatContext {
    pub fn new(io: IoContext) -> Self {
        Self {
            streams: Vec::new(),
            metadata: HashMap::new(),
            io,
            interval: Interval::default(),
            error_flag: ErrorFlags::empty(),
            format: None,
            next_stream_index: 0,
        }
    }

    // ========================
    // 流注册表
    // ========================

    /// 创建一条新流, 分配递增的 index 与唯一 id
    pub fn create_stream(&mut self) -> &mut Stream {
        let index = self.next_stream_index;
        self.next_stream_index += 1;
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        self.remove_stream_by_index(index);
        self.streams.push(Stream::new(index, id));
        let last = self.streams.len() - 1;
        &mut self.streams[last]
    }

    /// 添加调用方提供的流, 同 index 的旧流会被移除
    pub fn add_stream(&mut self, stream: Stream) {
        self.remove_stream_by_index(stream.index);
        self.next_stream_index = self.next_stream_index.max(stream.index + 1);
        self.streams.push(stream);
    }

    /// 按 index 移除并销毁流, 返回是否存在
    pub fn remove_stream_by_index(&mut self, index: usize) -> bool {
        match self.streams.iter().position(|s| s.index == index) {
            Some(pos) => {
                let stream = self.streams.remove(pos);
                debug!("移除流: index={}, id={}", stream.index, stream.id);
                true
            }
            None => false,
        }
    }

    /// 按 id 移除并销毁流, 返回是否存在
    pub fn remove_stream_by_id(&mut self, id: u32) -> bool {
        match self.streams.iter().find(|s| s.id == id).map(|s| s.index) {
            Some(index) => self.remove_stream_by_index(index),
            None => false,
        }
    }

    pub fn stream_by_index(&self, index: usize) -> Option<&Stream> {
        self.streams.iter().find(|s| s.index == index)
    }

    pub fn stream_by_index_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.index == index)
    }

    pub fn stream_by_id(&self, id: u32) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == id)
    }

    /// 第一条指定媒体类型的流, 跳过附带图片
    pub fn stream_by_media_type(&self, media_type: MediaType) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| s.media_type() == media_type && !s.is_attached_pic())
    }

    /// 附带图片 (封面) 流
    pub fn attachment_picture(&self) -> Option<&Stream> {
        self.streams.iter().find(|s| s.is_attached_pic())
    }

    /// 流在 `streams` 中的下标
    pub fn stream_position(&self, index: usize) -> Option<usize> {
        self.streams.iter().position(|s| s.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Disposition;
    use avkit_codec::{CodecId, CodecParameters};

    fn context() -> FormatContext {
        FormatContext::new(IoContext::from_memory(Vec::new()))
    }

    #[test]
    fn test_创建流_索引递增_id唯一() {
        let mut ctx = context();
        let a = ctx.create_stream().id;
        let b = ctx.create_stream().id;
        assert_ne!(a, b);
        let indexes: Vec<usize> = ctx.streams.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn test_移除流后不复用索引() {
        let mut ctx = context();
        ctx.create_stream();
        let id = ctx.create_stream().id;
        assert!(ctx.remove_stream_by_id(id));
        assert!(!ctx.remove_stream_by_id(id));
        assert!(ctx.stream_by_index(1).is_none());
        assert_eq!(ctx.create_stream().index, 2);
    }

    #[test]
    fn test_添加流替换同索引() {
        let mut ctx = context();
        let mut s = Stream::new(3, 100);
        s.codecpar = CodecParameters::new(CodecId::Aac);
        ctx.add_stream(s);
        ctx.add_stream(Stream::new(3, 101));
        assert_eq!(ctx.streams.len(), 1);
        assert_eq!(ctx.stream_by_index(3).map(|s| s.id), Some(101));
        assert_eq!(ctx.create_stream().index, 4);
    }

    #[test]
    fn test_按媒体类型查找_跳过封面() {
        let mut ctx = context();
        {
            let cover = ctx.create_stream();
            cover.codecpar = CodecParameters::new(CodecId::Png);
            cover.disposition = Disposition::ATTACHED_PIC;
        }
        {
            let video = ctx.create_stream();
            video.codecpar = CodecParameters::new(CodecId::H264);
        }
        assert_eq!(ctx.stream_by_media_type(MediaType::Video).map(|s| s.index), Some(1));
        assert_eq!(ctx.attachment_picture().map(|s| s.index), Some(0));
        assert!(ctx.stream_by_media_type(MediaType::Audio).is_none());
    }
}
