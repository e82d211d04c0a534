//! 引擎配置.
//!
//! 解封装、封装与日志的配置合在一个 JSON 文档里, 缺省字段取默认值:
//!
//! ```json
//! {
//!     "demux": { "fast_open": true, "max_analyze_duration_ms": 3000 },
//!     "mux": { "zero_start": true },
//!     "logging": { "level": "debug", "directory": "logs" }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::format::{DemuxOptions, MuxOptions};
use crate::logging::LoggingConfig;

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvkitConfig {
    pub demux: DemuxOptions,
    pub mux: MuxOptions,
    pub logging: LoggingConfig,
}

impl AvkitConfig {
    /// 从 JSON 字符串解析
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("解析配置 JSON 失败")
    }

    /// 从 JSON 文件读取
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("配置文件格式错误, path={}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("序列化配置失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_空文档取默认值() {
        let config = AvkitConfig::from_json("{}").unwrap();
        assert_eq!(config, AvkitConfig::default());
        assert!(!config.demux.fast_open);
        assert_eq!(config.demux.max_analyze_duration_ms, 15_000);
        assert_eq!(config.demux.sample_index_step_ms, 10_000);
        assert!(!config.mux.zero_start);
    }

    #[test]
    fn test_部分字段覆盖() {
        let config = AvkitConfig::from_json(
            r#"{"demux": {"fast_open": true}, "mux": {"nonnegative": true}}"#,
        )
        .unwrap();
        assert!(config.demux.fast_open);
        assert_eq!(config.demux.max_analyze_duration_ms, 15_000);
        assert!(config.mux.nonnegative);
        assert!(!config.mux.zero_start);
    }

    #[test]
    fn test_格式错误() {
        let err = AvkitConfig::from_json(r#"{"demux": {"fast_open": "yes"}}"#).unwrap_err();
        assert!(err.to_string().contains("解析配置 JSON 失败"));
    }

    #[tokio::test]
    async fn test_从文件读取() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avkit.json");
        let mut config = AvkitConfig::default();
        config.demux.max_analyze_duration_ms = 3000;
        config.logging.level = "debug".into();
        tokio::fs::write(&path, config.to_json().unwrap()).await.unwrap();

        let loaded = AvkitConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert!(AvkitConfig::load(dir.path().join("missing.json")).await.is_err());
    }
}
