//! # fm-count
//!
//! 基于 FM 索引的子串计数：对大型参考序列（如基因组）建一次索引，
//! 之后任意查询串的出现次数只与查询长度有关，与参考长度无关。
//!
//! 主要组成：
//!
//! - **字母表压缩**：原始字节映射为稠密编码 `1..=σ`，0 预留给终止符 `$`
//! - **BWT 构建**：按起始序列分桶匹配旋转，不构建后缀数组，内存受缓冲区上限约束
//! - **小波树**：BWT 上的 Occ 查询，每层一次 O(1) rank
//! - **反向搜索**：从查询串末尾逐字符收窄区间
//!
//! ## 快速示例
//!
//! ```rust
//! use fm_count::{build_index, AlphabetCompactor};
//!
//! let reference = b"BANANA";
//! let alphabet = AlphabetCompactor::from_bytes(reference).unwrap();
//! let codes = alphabet.compact_sequence(reference).unwrap();
//! let index = build_index(&codes, alphabet).unwrap();
//!
//! assert_eq!(index.count(b"ANA").unwrap(), 2);
//! ```
//!
//! ## 模块说明
//!
//! - [`alphabet`]：字母表压缩
//! - [`index`]：位向量、小波树、BWT 与 FM 索引
//! - [`io`]：FASTA / 纯文本参考读入
//! - [`config`] / [`context`]：构建参数、取消、进度与内存统计
//! - [`error`]：核心错误类型

pub mod alphabet;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod io;

pub use alphabet::AlphabetCompactor;
pub use config::BuildConfig;
pub use context::{BuildContext, CancelToken, MemoryTracker, Progress};
pub use error::{IndexError, Result};
pub use index::fm::{FmIndex, IndexMeta};

/// 用默认参数从紧凑编码序列（以 0 结尾）和已定型的字母表构建索引。
pub fn build_index(codes: &[u8], alphabet: AlphabetCompactor) -> Result<FmIndex> {
    FmIndex::build(codes, alphabet, &BuildConfig::default(), &mut BuildContext::new())
}
