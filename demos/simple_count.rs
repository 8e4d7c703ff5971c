//! 演示如何在 library 模式下使用 fm-count 做子串计数。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_count
//! ```

use fm_count::{AlphabetCompactor, BuildConfig, BuildContext, FmIndex};

fn main() -> anyhow::Result<()> {
    // 1. 参考序列与字母表
    let reference = b"ACGTACGTAGCTGATCGTAGCTAGCTAGCTGATCGTAGCTAGCTAGCTGAT";
    println!("参考序列: {}", std::str::from_utf8(reference)?);
    println!("参考长度: {} bp", reference.len());

    let alphabet = AlphabetCompactor::from_bytes(reference)?;
    let codes = alphabet.compact_sequence(reference)?;
    println!("字母表大小: {}", alphabet.alphabet_size()?);

    // 2. 构建 FM 索引（带进度回调）
    let mut ctx = BuildContext::new().with_progress(|p| {
        if p.done == p.total {
            println!("起始序列处理完成: {}/{}", p.done, p.total);
        }
    });
    let fm = FmIndex::build(&codes, alphabet, &BuildConfig::default(), &mut ctx)?;
    println!("FM 索引构建完成：BWT 长度={}, 估算占用={} 字节", fm.len(), fm.size_in_bytes());

    // 3. 计数查询
    for pattern in [&b"GCTGATCGTAG"[..], b"AGCT", b"CTAG", b"TTTT"] {
        println!("'{}' 出现 {} 次", std::str::from_utf8(pattern)?, fm.count(pattern)?);
    }

    // 4. 不在参考中的字符会报错
    if let Err(e) = fm.count(b"ACGN") {
        println!("查询失败: {}", e);
    }

    println!("\n完成！");
    Ok(())
}
