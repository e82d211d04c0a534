//! # avkit-format
//!
//! 媒体容器解封装/封装框架.
//!
//! 格式相关的解析由实现 [`Demuxer`] / [`Muxer`] 的插件完成; 本 crate 提供
//! 所有格式共用的部分: 字节流端口、流与上下文模型、样本索引与选择器、
//! 以及驱动插件的 [`DemuxEngine`] 和 [`MuxEngine`].

pub mod analyze;
pub mod context;
pub mod demux;
pub mod demuxer;
pub mod dts;
pub mod format_id;
pub mod indexed;
pub mod io;
pub mod mux;
pub mod muxer;
pub mod sample_index;
pub mod sample_table;
pub mod selector;
pub mod stream;

// 重导出常用类型
pub use analyze::check_stream_parameters;
pub use context::{ErrorFlags, FormatContext, Interval};
pub use demux::{DemuxEngine, DemuxOptions};
pub use demuxer::{Demuxer, PluginState, SeekFlags};
pub use dts::DtsQueue;
pub use format_id::FormatId;
pub use indexed::{read_indexed_packet, seek_indexed};
pub use io::{AbortHandle, FileBackend, IoBackend, IoContext, IoFlags, MemoryBackend, SliceBackend};
pub use mux::{MuxEngine, MuxOptions};
pub use muxer::{Muxer, is_codec_supported, supported_codecs};
pub use sample_index::{Sample, SampleIndex};
pub use sample_table::SampleTable;
pub use selector::{Selection, SelectorPolicy};
pub use stream::{Discard, Disposition, Stream};
