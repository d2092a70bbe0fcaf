//! 文本清理模块 - 把聊天消息里的内联标记转换成适合悬浮窗显示的纯文本
//!
//! 主要功能：
//! - 移除自定义表情，替换用户/身份组/频道提及
//! - 去掉强调和代码标记，保留内部文本
//! - 折叠 `[text](url)` 链接为文本
//! - 规范换行，去掉首尾空行，连续空行合并为一个换行
//!
//! 标记清理会反复执行直到结果不再变化：移除一个标记可能拼出另一个标记，
//! 嵌套链接每轮也只展开一层，这样 `sanitize` 才是幂等的。
//! 每条规则都会消耗 `<` `*` `` ` `` `[` 中的至少一个字符且替换文本里不含这些字符，
//! 所以循环一定会结束。

use std::sync::LazyLock;
use regex::Regex;

/// 标记清理规则（按顺序应用）：(模式, 替换)
pub static MARKUP_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // Custom emoji <:name:id> / <a:name:id>
        (r"<a?:[A-Za-z0-9_~]+:\d+>", ""),
        // User mention <@id> / <@!id>
        (r"<@!?\d+>", "@mention"),
        // Role mention <@&id>
        (r"<@&\d+>", "@role"),
        // Channel mention <#id>
        (r"<#\d+>", "#channel"),
        // *x* / **x** / ***x***
        (r"\*{1,3}([^*\n]+?)\*{1,3}", "$1"),
        // Code block, optional language tag
        (r"(?s)```(?:[A-Za-z0-9_+\-]+\n)?(.*?)```", "$1"),
        (r"`([^`\n]*)`", "$1"),
        // Unpaired emphasis/code markers
        (r"[*`]+", ""),
        // [text](url)
        (r"\[([^\]\n]*)\]\([^)\n]*\)", "$1"),
    ]
    .iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, *replacement)))
    .collect()
});

/// 零宽字符
const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// 清理原始消息文本
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut text: String = raw.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();

    loop {
        let next = strip_markup(&text);
        if next == text {
            break;
        }
        text = next;
    }

    normalize_whitespace(&text)
}

/// 单轮标记清理
fn strip_markup(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in MARKUP_RULES.iter() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// 统一换行，逐行去掉首尾空白，丢弃空白行
fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines.join("\n").trim().to_string()
}
