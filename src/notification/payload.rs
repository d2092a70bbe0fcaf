//! Payload 构建模块 - 组装渲染端显示用的通知记录
//!
//! 记录格式（线上字段名）：
//! ```json
//! {
//!   "type": 1,
//!   "index": 0,
//!   "timeout": 5.0,
//!   "height": 146,
//!   "opacity": 1.0,
//!   "volume": 0.7,
//!   "audioPath": "default",
//!   "title": "标题（≤128 字符）",
//!   "content": "已清理的正文（≤1024 字符）",
//!   "useBase64Icon": false,
//!   "icon": "default",
//!   "sourceApp": "overlay-notifier"
//! }
//! ```
//!
//! 构建是纯函数：只依赖输入和配置，没有副作用。

use serde::{Deserialize, Serialize};

use super::height::{estimate_height, HeightModel};
use super::icon::{resolve_icon, IconFallback};
use crate::config::EngineConfig;

/// 标题最大字符数
pub const MAX_TITLE_CHARS: usize = 128;

/// 正文最大字符数
pub const MAX_CONTENT_CHARS: usize = 1024;

/// 最短显示时间（秒）
pub const MIN_TIMEOUT_SECS: f64 = 0.5;

/// 通知记录类型（渲染端约定的常量）
pub const RECORD_TYPE: u8 = 1;

/// 正文为空时的占位文本
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "(no content)";

/// 渲染端默认提示音
const DEFAULT_AUDIO: &str = "default";

const DEFAULT_OPACITY: f64 = 1.0;
const DEFAULT_VOLUME: f64 = 0.7;

/// 显示就绪的通知记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(rename = "type")]
    pub kind: u8,
    pub index: u32,
    /// 显示时长（秒）
    pub timeout: f64,
    /// 窗口高度（像素）
    pub height: u32,
    pub opacity: f64,
    pub volume: f64,
    /// "default" 或空字符串
    pub audio_path: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "useBase64Icon")]
    pub use_base64_icon: bool,
    /// base64 图片数据，或回退图标关键字/路径
    pub icon: String,
    pub source_app: String,
}

/// Payload 构建器
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    opacity: f64,
    volume: f64,
    force_default_sound: bool,
    source_label: String,
    height: HeightModel,
    fallback_icon: IconFallback,
}

impl PayloadBuilder {
    /// 使用默认显示参数创建
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    /// 从配置快照创建
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            opacity: config.display.opacity,
            volume: config.display.volume,
            force_default_sound: config.display.force_default_sound,
            source_label: config.display.source_label.clone(),
            height: config.height.clone(),
            fallback_icon: config.icon.fallback.clone(),
        }
    }

    /// 设置高度模型
    pub fn with_height_model(mut self, height: HeightModel) -> Self {
        self.height = height;
        self
    }

    /// 设置回退图标
    pub fn with_fallback_icon(mut self, fallback: IconFallback) -> Self {
        self.fallback_icon = fallback;
        self
    }

    /// 设置不透明度和音量
    pub fn with_levels(mut self, opacity: f64, volume: f64) -> Self {
        self.opacity = opacity;
        self.volume = volume;
        self
    }

    /// 设置是否强制默认提示音
    pub fn with_force_default_sound(mut self, force: bool) -> Self {
        self.force_default_sound = force;
        self
    }

    /// 构建通知记录
    ///
    /// # Arguments
    /// * `title` - 标题（超过 128 字符直接截断）
    /// * `content` - 已清理的正文（超过 1024 字符直接截断，为空时使用占位文本）
    /// * `timeout_ms` - 显示时长（毫秒），不足 0.5 秒按 0.5 秒
    /// * `icon_bytes` - 调用方提供的图片数据
    /// * `height_source` - 用于估算高度的文本
    pub fn build(
        &self,
        title: &str,
        content: &str,
        timeout_ms: u64,
        icon_bytes: Option<&[u8]>,
        height_source: &str,
    ) -> NotificationRecord {
        let timeout = (timeout_ms as f64 / 1000.0).max(MIN_TIMEOUT_SECS);

        let audio_path = if self.force_default_sound {
            DEFAULT_AUDIO.to_string()
        } else {
            String::new()
        };

        let height = if self.height.auto_height {
            estimate_height(height_source, &self.height)
        } else {
            self.height.clamp(self.height.fixed_height)
        };

        let icon = resolve_icon(icon_bytes, &self.fallback_icon);

        let content = truncate_chars(content, MAX_CONTENT_CHARS);
        let content = content.trim_end();
        let content = if content.is_empty() {
            EMPTY_CONTENT_PLACEHOLDER.to_string()
        } else {
            content.to_string()
        };

        NotificationRecord {
            kind: RECORD_TYPE,
            index: 0,
            timeout,
            height,
            opacity: unit_or(self.opacity, DEFAULT_OPACITY),
            volume: unit_or(self.volume, DEFAULT_VOLUME),
            audio_path,
            title: truncate_chars(title, MAX_TITLE_CHARS).to_string(),
            content,
            use_base64_icon: icon.embedded,
            icon: icon.data,
            source_app: self.source_label.clone(),
        }
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 按字符截断（不加省略号）
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 裁剪到 [0, 1]，非有限值使用默认值
fn unit_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        default
    }
}
