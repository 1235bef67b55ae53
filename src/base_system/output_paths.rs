//! 输出目录与文件命名。

use std::path::PathBuf;

const TITLE_SEPARATOR: char = '|';
const FALLBACK_FOLDER: &str = "episode";

/// 从页面标题提取文件夹名。
///
/// 去掉第一个 `|` 之后的站点名后缀，把 Windows/Unix 路径非法字符替换为 `_`，
/// 结果为空时退回 `episode`。
pub fn title_folder_name(document_title: &str) -> String {
    let head = document_title
        .split(TITLE_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = head
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if (c as u32) < 32 => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_FOLDER.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<folder>/page_NNN.jpg`，`index` 从 1 开始。
pub fn page_file(folder: &str, index: usize) -> PathBuf {
    PathBuf::from(folder).join(format!("page_{index:03}.jpg"))
}

/// `<folder>/spread_NNN.jpg`，`index` 从 1 开始。
pub fn spread_file(folder: &str, index: usize) -> PathBuf {
    PathBuf::from(folder).join(format!("spread_{index:03}.jpg"))
}
