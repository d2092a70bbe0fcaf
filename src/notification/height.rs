//! 高度估算 - 根据文本换行后的行数计算通知窗口高度

use serde::{Deserialize, Serialize};

/// 高度模型参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightModel {
    /// 是否根据文本自动计算高度
    pub auto_height: bool,
    /// 关闭自动高度时使用的固定高度
    pub fixed_height: f64,
    /// 每行可容纳的字符数
    pub wrap_chars: f64,
    /// 每行像素高度
    pub line_height: f64,
    /// 标题、边距等固定占用
    pub base_padding: f64,
    pub min_height: f64,
    pub max_height: f64,
}

impl Default for HeightModel {
    fn default() -> Self {
        Self {
            auto_height: true,
            fixed_height: 175.0,
            wrap_chars: 38.0,
            line_height: 18.0,
            base_padding: 92.0,
            min_height: 140.0,
            max_height: 520.0,
        }
    }
}

/// 参数下限
const MIN_WRAP_CHARS: f64 = 20.0;
const MIN_LINE_HEIGHT: f64 = 12.0;
const MIN_BASE_PADDING: f64 = 60.0;
const MIN_HEIGHT_FLOOR: f64 = 80.0;

/// 应用下限后的参数
#[derive(Debug, Clone, Copy)]
struct Floored {
    wrap_chars: f64,
    line_height: f64,
    base_padding: f64,
    min_height: f64,
    max_height: f64,
}

impl HeightModel {
    fn floored(&self) -> Floored {
        let min_height = at_least(self.min_height, MIN_HEIGHT_FLOOR);
        Floored {
            wrap_chars: at_least(self.wrap_chars, MIN_WRAP_CHARS).floor(),
            line_height: at_least(self.line_height, MIN_LINE_HEIGHT),
            base_padding: at_least(self.base_padding, MIN_BASE_PADDING),
            min_height,
            max_height: at_least(self.max_height, min_height),
        }
    }

    /// 把任意高度裁剪到 `[min_height, max_height]`
    pub fn clamp(&self, height: f64) -> u32 {
        let f = self.floored();
        let height = if height.is_finite() { height } else { f.min_height };
        height.round().clamp(f.min_height.round(), f.max_height.round()) as u32
    }
}

/// 非有限值或低于下限时取下限
fn at_least(value: f64, floor: f64) -> f64 {
    if value.is_finite() && value >= floor {
        value
    } else {
        floor
    }
}

/// 文本换行后的可视行数，每个逻辑行至少占一行
pub fn visual_lines(text: &str, wrap_chars: usize) -> usize {
    let wrap = wrap_chars.max(1);
    text.split('\n')
        .map(|line| line.chars().count().div_ceil(wrap).max(1))
        .sum()
}

/// 估算通知高度
pub fn estimate_height(text: &str, model: &HeightModel) -> u32 {
    let f = model.floored();
    let lines = visual_lines(text, f.wrap_chars as usize);
    let height = f.base_padding + lines as f64 * f.line_height;
    model.clamp(height)
}
