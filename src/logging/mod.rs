//! 日志初始化.
//!
//! 库 crate 通过 `log` 宏输出日志, 这里安装的 `tracing` 订阅器会把 `log`
//! 记录一并收集, 输出到控制台, 可选地再写入按天滚动的日志文件.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 控制台日志级别 (`EnvFilter` 语法)
    pub level: String,
    /// 日志文件目录, 为空时只输出到控制台
    pub directory: Option<String>,
    /// 日志文件名前缀
    pub file_prefix: String,
    /// 文件日志级别
    pub file_level: String,
    /// 日志文件保留天数, 0 表示不清理
    pub retention_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            directory: None,
            file_prefix: "avkit".into(),
            file_level: "debug".into(),
            retention_days: 30,
        }
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志订阅器
///
/// 全局订阅器只能安装一次, 重复调用返回错误.
pub fn init(config: LoggingConfig) -> Result<()> {
    let console_filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("无效的控制台日志级别: {}", config.level))?;
    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(ConsoleFormatter)
        .with_filter(console_filter);

    let file_layer = match &config.directory {
        Some(directory) => {
            let directory = Path::new(directory);
            fs::create_dir_all(directory)
                .with_context(|| format!("创建日志目录失败, path={}", directory.display()))?;
            if config.retention_days > 0 {
                cleanup_expired_logs(directory, &config.file_prefix, config.retention_days)?;
            }
            let file_filter = EnvFilter::try_new(&config.file_level)
                .with_context(|| format!("无效的文件日志级别: {}", config.file_level))?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();
            Some(
                fmt::Layer::default()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(FileFormatter)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("全局日志订阅器已经初始化")?;
    Ok(())
}

/// 指定日期 (UTC) 的日志文件路径, 与 `tracing_appender::rolling::daily` 的命名一致
pub fn current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}", prefix, date.format("%Y-%m-%d")))
}

/// 删除目录中修改时间早于保留期限的日志文件, 返回删除的数量
pub fn cleanup_expired_logs(directory: &Path, prefix: &str, retention_days: u64) -> Result<usize> {
    let deadline = SystemTime::now()
        .checked_sub(Duration::from_secs(retention_days * 24 * 3600))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;
    let entries = fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(&format!("{prefix}.")) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if modified < deadline {
            fs::remove_file(entry.path())
                .with_context(|| format!("删除日志文件失败, path={}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        )?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        // 来自 log 的记录没有文件信息时退回 target
        let location = meta.file().unwrap_or_else(|| meta.target());
        write!(
            writer,
            "{}{:5}\x1b[0m {}:{} > ",
            color,
            meta.level().to_string(),
            location,
            meta.line().unwrap_or(0)
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{} {:02}:{:02}:{:02}.{:03}] {:5} {} > ",
            now.format("%Y-%m-%d"),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis(),
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
