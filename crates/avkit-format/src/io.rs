//! I/O 抽象层 (字节流端口).
//!
//! 为格式插件提供统一的异步读写接口, 支持文件、内存缓冲区以及
//! "大资源中的一段" (slice) 等不同后端. 所有 I/O 原语都是挂起点,
//! 其余解析逻辑一律同步执行.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use avkit_core::{AvError, AvResult};
use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

bitflags! {
    /// 字节流能力标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoFlags: u32 {
        /// 支持随机访问
        const SEEKABLE = 1 << 0;
        /// 只是更大逻辑资源中的一段
        const SLICE = 1 << 1;
        /// 网络来源
        const NETWORK = 1 << 2;
        /// 调用方已请求取消
        const ABORT = 1 << 3;
    }
}

/// 取消句柄
///
/// 可克隆, 所有克隆共享同一个标志. 引擎与插件的长循环会轮询它.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// 清除取消标志
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的 I/O 来源.
#[async_trait]
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示数据结束
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 全部写入
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    /// 刷新写缓冲
    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
    /// 定位到绝对位置
    async fn seek(&mut self, pos: u64) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&self) -> u64;
    /// 获取总大小 (如果可知)
    async fn size(&mut self) -> io::Result<Option<u64>>;
    /// 能力标志
    fn flags(&self) -> IoFlags;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// I/O 上下文
///
/// 封装后端, 提供带缓冲的读取、peek、按字节序解码整数、定位与写入.
/// 数据不足时返回 [`AvError::Eof`], 取消时返回 [`AvError::Aborted`].
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
    /// 多字节整数是否按大端解码
    big_endian: bool,
    abort: AbortHandle,
}

impl IoContext {
    /// 从 I/O 后端创建上下文 (默认大端)
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
            big_endian: true,
            abort: AbortHandle::new(),
        }
    }

    /// 从内存数据创建只读上下文
    pub fn from_memory(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data.into())))
    }

    /// 从文件路径打开 (只读)
    pub async fn open_read(path: impl AsRef<Path>) -> AvResult<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 从文件路径打开 (写入, 截断已有内容)
    pub async fn open_write(path: impl AsRef<Path>) -> AvResult<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 设置多字节整数的字节序
    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// 获取取消句柄的克隆
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// 是否已请求取消
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// 能力标志, 已请求取消时额外带上 `ABORT`
    pub fn flags(&self) -> IoFlags {
        let mut flags = self.inner.flags();
        if self.abort.is_aborted() {
            flags |= IoFlags::ABORT;
        }
        flags
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.flags().contains(IoFlags::SEEKABLE)
    }

    fn check_abort(&self) -> AvResult<()> {
        if self.abort.is_aborted() {
            return Err(AvError::Aborted);
        }
        Ok(())
    }

    // ========================
    // 读取方法
    // ========================

    /// 保证缓冲区中至少有 `need` 字节未消耗数据
    async fn fill_buffer(&mut self, need: usize) -> AvResult<()> {
        let available = self.buf_len - self.buf_pos;
        if available >= need {
            return Ok(());
        }
        // 把剩余数据移到缓冲区头部
        self.buffer.copy_within(self.buf_pos..self.buf_len, 0);
        self.buf_pos = 0;
        self.buf_len = available;
        if self.buffer.len() < need {
            self.buffer.resize(need, 0);
        }
        while self.buf_len < need {
            let n = self.inner.read(&mut self.buffer[self.buf_len..]).await?;
            if n == 0 {
                return Err(AvError::Eof);
            }
            self.buf_len += n;
        }
        Ok(())
    }

    /// 读取指定字节数
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> AvResult<()> {
        self.check_abort()?;
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer).await?;
                if self.buf_len == 0 {
                    return Err(AvError::Eof);
                }
            }
        }
        Ok(())
    }

    async fn read_array<const N: usize>(&mut self) -> AvResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// 读取 1 个字节
    pub async fn read_u8(&mut self) -> AvResult<u8> {
        Ok(self.read_array::<1>().await?[0])
    }

    /// 按当前字节序读取 u16
    pub async fn read_u16(&mut self) -> AvResult<u16> {
        let buf = self.read_array::<2>().await?;
        Ok(if self.big_endian {
            BigEndian::read_u16(&buf)
        } else {
            LittleEndian::read_u16(&buf)
        })
    }

    /// 按当前字节序读取 3 字节无符号整数
    pub async fn read_u24(&mut self) -> AvResult<u32> {
        let buf = self.read_array::<3>().await?;
        Ok(if self.big_endian {
            BigEndian::read_u24(&buf)
        } else {
            LittleEndian::read_u24(&buf)
        })
    }

    /// 按当前字节序读取 u32
    pub async fn read_u32(&mut self) -> AvResult<u32> {
        let buf = self.read_array::<4>().await?;
        Ok(if self.big_endian {
            BigEndian::read_u32(&buf)
        } else {
            LittleEndian::read_u32(&buf)
        })
    }

    /// 按当前字节序读取 i32
    pub async fn read_i32(&mut self) -> AvResult<i32> {
        let buf = self.read_array::<4>().await?;
        Ok(if self.big_endian {
            BigEndian::read_i32(&buf)
        } else {
            LittleEndian::read_i32(&buf)
        })
    }

    /// 按当前字节序读取 u64
    pub async fn read_u64(&mut self) -> AvResult<u64> {
        let buf = self.read_array::<8>().await?;
        Ok(if self.big_endian {
            BigEndian::read_u64(&buf)
        } else {
            LittleEndian::read_u64(&buf)
        })
    }

    /// 读取 4 字节标签 (FourCC)
    pub async fn read_tag(&mut self) -> AvResult<[u8; 4]> {
        self.read_array::<4>().await
    }

    /// 读取指定数量的字节
    pub async fn read_bytes(&mut self, count: usize) -> AvResult<Bytes> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// 读取定长字符串, 非 UTF-8 字节按替换字符处理
    pub async fn read_string(&mut self, count: usize) -> AvResult<String> {
        let bytes = self.read_bytes(count).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 查看接下来的 `count` 字节, 不移动读位置
    pub async fn peek_bytes(&mut self, count: usize) -> AvResult<Bytes> {
        self.check_abort()?;
        self.fill_buffer(count).await?;
        Ok(Bytes::copy_from_slice(
            &self.buffer[self.buf_pos..self.buf_pos + count],
        ))
    }

    /// 查看接下来的定长字符串, 不移动读位置
    pub async fn peek_string(&mut self, count: usize) -> AvResult<String> {
        let bytes = self.peek_bytes(count).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 跳过指定字节数
    pub async fn skip(&mut self, count: usize) -> AvResult<()> {
        self.check_abort()?;
        // 先尝试消耗缓冲区中的数据
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }

        let remaining = count - buffered;
        self.buf_pos = 0;
        self.buf_len = 0;

        if self.is_seekable() {
            let target = self.inner.position() + remaining as u64;
            self.inner.seek(target).await?;
        } else {
            // 逐块丢弃读取的数据
            let mut left = remaining;
            while left > 0 {
                self.check_abort()?;
                let to_read = left.min(self.buffer.len());
                let n = self.inner.read(&mut self.buffer[..to_read]).await?;
                if n == 0 {
                    return Err(AvError::Eof);
                }
                left -= n;
            }
        }
        Ok(())
    }

    // ========================
    // 定位方法
    // ========================

    /// 定位到绝对位置
    ///
    /// 目标仍在读缓冲区内时只移动缓冲区游标, 否则清空缓冲区并定位后端.
    pub async fn seek(&mut self, pos: u64) -> AvResult<()> {
        self.check_abort()?;
        let backend_pos = self.inner.position();
        let buffer_start = backend_pos - self.buf_len as u64;
        if pos >= buffer_start && pos <= backend_pos {
            self.buf_pos = (pos - buffer_start) as usize;
            return Ok(());
        }
        self.buf_pos = 0;
        self.buf_len = 0;
        self.inner.seek(pos).await?;
        Ok(())
    }

    /// 获取当前位置
    ///
    /// 考虑读缓冲区中尚未消耗的数据量.
    pub fn position(&self) -> u64 {
        self.inner.position() - (self.buf_len - self.buf_pos) as u64
    }

    /// 获取总大小, 未知时返回 `None`
    pub async fn file_size(&mut self) -> AvResult<Option<u64>> {
        Ok(self.inner.size().await?)
    }

    // ========================
    // 写入方法
    // ========================

    /// 写入全部数据
    pub async fn write_all(&mut self, buf: &[u8]) -> AvResult<()> {
        self.check_abort()?;
        self.inner.write_all(buf).await?;
        Ok(())
    }

    /// 写入 u8
    pub async fn write_u8(&mut self, v: u8) -> AvResult<()> {
        self.write_all(&[v]).await
    }

    /// 按当前字节序写入 u16
    pub async fn write_u16(&mut self, v: u16) -> AvResult<()> {
        let mut buf = [0u8; 2];
        if self.big_endian {
            BigEndian::write_u16(&mut buf, v);
        } else {
            LittleEndian::write_u16(&mut buf, v);
        }
        self.write_all(&buf).await
    }

    /// 按当前字节序写入 u32
    pub async fn write_u32(&mut self, v: u32) -> AvResult<()> {
        let mut buf = [0u8; 4];
        if self.big_endian {
            BigEndian::write_u32(&mut buf, v);
        } else {
            LittleEndian::write_u32(&mut buf, v);
        }
        self.write_all(&buf).await
    }

    /// 按当前字节序写入 u64
    pub async fn write_u64(&mut self, v: u64) -> AvResult<()> {
        let mut buf = [0u8; 8];
        if self.big_endian {
            BigEndian::write_u64(&mut buf, v);
        } else {
            LittleEndian::write_u64(&mut buf, v);
        }
        self.write_all(&buf).await
    }

    /// 写入 4 字节标签 (FourCC)
    pub async fn write_tag(&mut self, tag: &[u8; 4]) -> AvResult<()> {
        self.write_all(tag).await
    }

    /// 刷新后端写缓冲
    pub async fn flush(&mut self) -> AvResult<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

// ========================
// 后端实现
// ========================

/// 文件 I/O 后端 (tokio)
pub struct FileBackend {
    file: tokio::fs::File,
    pos: u64,
}

impl FileBackend {
    pub fn new(file: tokio::fs::File) -> Self {
        Self { file, pos: 0 }
    }
}

#[async_trait]
impl IoBackend for FileBackend {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf).await?;
        self.pos += n as u64;
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.file.flush().await
    }

    async fn seek(&mut self, pos: u64) -> io::Result<u64> {
        self.pos = self.file.seek(io::SeekFrom::Start(pos)).await?;
        Ok(self.pos)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    async fn size(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.file.metadata().await?.len()))
    }

    fn flags(&self) -> IoFlags {
        IoFlags::SEEKABLE
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理, 能力标志可配置以模拟流式或网络来源.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
    flags: IoFlags,
}

impl MemoryBackend {
    /// 从已有数据创建 (用于读取)
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            flags: IoFlags::SEEKABLE,
        }
    }

    /// 创建空缓冲区 (用于写入)
    pub fn new() -> Self {
        Self::from_data(Vec::new())
    }

    /// 替换能力标志
    pub fn with_flags(mut self, flags: IoFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 获取内部数据的引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IoBackend for MemoryBackend {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // seek 允许越过末尾, 此后的读取视为 EOF
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        let n = (self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    async fn seek(&mut self, pos: u64) -> io::Result<u64> {
        if !self.flags.contains(IoFlags::SEEKABLE) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "内存后端被配置为不可 seek",
            ));
        }
        self.pos = pos as usize;
        Ok(pos)
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    async fn size(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    fn flags(&self) -> IoFlags {
        self.flags
    }
}

/// 片段后端: 只暴露另一个后端中 `[start, end)` 的字节
///
/// 对外的位置从 0 开始计数, 能力标志额外带上 `SLICE`.
pub struct SliceBackend {
    inner: Box<dyn IoBackend>,
    start: u64,
    end: u64,
    pos: u64,
}

impl SliceBackend {
    /// 创建片段并把内部后端定位到片段起点
    pub async fn new(mut inner: Box<dyn IoBackend>, start: u64, end: u64) -> AvResult<Self> {
        if end < start {
            return Err(AvError::InvalidArgument(format!(
                "片段范围无效: [{start}, {end})"
            )));
        }
        inner.seek(start).await?;
        Ok(Self {
            inner,
            start,
            end,
            pos: 0,
        })
    }
}

#[async_trait]
impl IoBackend for SliceBackend {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = (self.end - self.start).saturating_sub(self.pos);
        let want = (remaining as usize).min(buf.len());
        if want == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..want]).await?;
        self.pos += n as u64;
        Ok(n)
    }

    async fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "片段后端只读",
        ))
    }

    async fn seek(&mut self, pos: u64) -> io::Result<u64> {
        let pos = pos.min(self.end - self.start);
        self.inner.seek(self.start + pos).await?;
        self.pos = pos;
        Ok(pos)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    async fn size(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.end - self.start))
    }

    fn flags(&self) -> IoFlags {
        self.inner.flags() | IoFlags::SLICE
    }
}
