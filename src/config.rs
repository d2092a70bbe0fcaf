//! 引擎配置 - 连接、投递、显示与图标参数
//!
//! 配置读取优先级：
//! 1. 环境变量 `OVN_HOST` / `OVN_PORT`（只覆盖连接端点）
//! 2. 配置文件 `<config_dir>/overlay-notifier/config.json`
//! 3. 内置默认值
//!
//! 所有字段都带 `#[serde(default)]`，只写了部分字段的配置文件也能加载。
//! 数值非法时在 [`EngineConfig::normalized`] 中修复为安全值，只记录警告。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, DeliveryError};
use crate::notification::height::HeightModel;
use crate::notification::icon::IconFallback;

/// 渲染端默认监听端口
pub const DEFAULT_PORT: u16 = 42070;

/// 配置目录名
const CONFIG_DIR_NAME: &str = "overlay-notifier";

/// 配置文件名
const CONFIG_FILE_NAME: &str = "config.json";

/// 引擎配置快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 渲染端主机
    pub host: String,
    /// 渲染端端口
    pub port: u16,
    /// 客户端名称（出现在 URL 和 envelope 的 sender 字段）
    pub client_name: String,
    /// 断开后是否自动重连
    pub auto_connect: bool,
    /// 建立连接的超时（毫秒）
    pub connect_timeout_ms: u64,
    pub delivery: DeliveryConfig,
    pub display: DisplayConfig,
    pub height: HeightModel,
    pub icon: IconConfig,
    /// 按类别开关通知，未列出的类别默认开启
    pub categories: BTreeMap<String, bool>,
    /// 调试日志（同时记录收到的原始帧）
    pub debug_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            client_name: "overlay-notifier".to_string(),
            auto_connect: true,
            connect_timeout_ms: 5000,
            delivery: DeliveryConfig::default(),
            display: DisplayConfig::default(),
            height: HeightModel::default(),
            icon: IconConfig::default(),
            categories: BTreeMap::new(),
            debug_logging: false,
        }
    }
}

/// 投递参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 两次发送之间的最小间隔（毫秒）
    pub min_interval_ms: u64,
    /// 断线期间的队列容量
    pub max_queue: usize,
    /// 重连退避下限（毫秒）
    pub backoff_floor_ms: u64,
    /// 重连退避上限（毫秒）
    pub backoff_ceiling_ms: u64,
    /// 重连随机抖动上限（毫秒）
    pub jitter_ms: u64,
    /// 连接成功后发送问候通知
    pub greeting: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 800,
            max_queue: 200,
            backoff_floor_ms: 1000,
            backoff_ceiling_ms: 15000,
            jitter_ms: 400,
            greeting: true,
        }
    }
}

/// 显示参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub opacity: f64,
    pub volume: f64,
    /// 强制使用渲染端默认提示音
    pub force_default_sound: bool,
    /// 显示在通知上的来源标签
    pub source_label: String,
    /// 请求未指定超时时使用的默认值（毫秒）
    pub default_timeout_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            volume: 0.7,
            force_default_sound: false,
            source_label: "overlay-notifier".to_string(),
            default_timeout_ms: 5000,
        }
    }
}

/// 图标参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    /// 没有图片数据时使用的图标
    pub fallback: IconFallback,
    /// 是否下载请求里的远程图标
    pub fetch_remote: bool,
    /// 图标下载超时（毫秒）
    pub fetch_timeout_ms: u64,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            fallback: IconFallback::default(),
            fetch_remote: true,
            fetch_timeout_ms: 3000,
        }
    }
}

impl EngineConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// 从默认路径加载并应用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::default_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// 从指定文件加载，文件不存在时返回默认配置
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config.normalized())
    }

    /// 保存到指定文件（自动创建父目录）
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 应用 `OVN_HOST` / `OVN_PORT` 环境变量
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("OVN_HOST") {
            if !host.trim().is_empty() {
                self.host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("OVN_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.port = p,
                Err(e) => warn!(value = %port, error = %e, "Ignoring invalid OVN_PORT"),
            }
        }
    }

    /// 修复非法数值，保证下游不会拿到倒置或为零的范围
    pub fn normalized(mut self) -> Self {
        let d = &mut self.delivery;
        if d.max_queue == 0 {
            report_invalid("delivery.max_queue", "must be at least 1");
            d.max_queue = 1;
        }
        if d.backoff_floor_ms == 0 {
            report_invalid("delivery.backoff_floor_ms", "must be positive");
            d.backoff_floor_ms = DeliveryConfig::default().backoff_floor_ms;
        }
        if d.backoff_ceiling_ms < d.backoff_floor_ms {
            report_invalid("delivery.backoff_ceiling_ms", "below backoff floor");
            d.backoff_ceiling_ms = d.backoff_floor_ms;
        }
        if self.connect_timeout_ms == 0 {
            report_invalid("connect_timeout_ms", "must be positive");
            self.connect_timeout_ms = Self::default().connect_timeout_ms;
        }
        if self.client_name.trim().is_empty() {
            report_invalid("client_name", "must not be empty");
            self.client_name = Self::default().client_name;
        }
        self
    }

    /// 渲染端 WebSocket 地址：`ws://{host}:{port}/?client={client_name}`
    pub fn endpoint_url(&self) -> Result<Url, DeliveryError> {
        let raw = format!("ws://{}:{}/", self.host, self.port);
        let mut url = Url::parse(&raw).map_err(|e| DeliveryError::TransportOpenFailed {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("client", &self.client_name);
        Ok(url)
    }

    /// 类别是否启用（未配置的类别视为启用）
    pub fn is_category_enabled(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(true)
    }

    /// 连接端点是否与另一份配置不同
    pub fn endpoint_differs(&self, other: &EngineConfig) -> bool {
        self.host != other.host || self.port != other.port || self.client_name != other.client_name
    }
}

fn report_invalid(field: &'static str, reason: &str) {
    let err = DeliveryError::ConfigInvalid {
        field,
        reason: reason.to_string(),
    };
    warn!(error = %err, "Recovered invalid config value");
}
