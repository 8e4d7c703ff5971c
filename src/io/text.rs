use anyhow::Result;
use std::io::Read;

/// 是否为保留的可打印 ASCII 字符（空格到 `~`）。
#[inline]
pub fn is_printable(b: u8) -> bool {
    (32..=126).contains(&b)
}

/// 丢弃不可打印字节，a–z 转为大写。
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .copied()
        .filter(|&b| is_printable(b))
        .map(|b| b.to_ascii_uppercase())
        .collect()
}

/// 读入整个文本文件并按 [`normalize`] 过滤。
pub fn read_text<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    Ok(normalize(&raw))
}
