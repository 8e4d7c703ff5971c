//! 索引构建与查询的错误类型。

use thiserror::Error;

/// 核心可能报告的全部错误。
///
/// 任何错误都会结束当前操作，内部不重试。越界类错误（`IndexOutOfRange`、
/// `SymbolOutOfRange`）通常意味着调用方编程错误或快照损坏，而不是用户输入有误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// 原始字节不在 1..=127，或在字母表定型后注册
    #[error("invalid symbol {byte:#04x}: {reason}")]
    InvalidSymbol {
        /// 出错的原始字节
        byte: u8,
        /// 拒绝原因
        reason: &'static str,
    },

    /// 字母表在 `finalize()` 之前被读取
    #[error("alphabet is not finalized")]
    NotFinalized,

    /// 重复调用 `finalize()`
    #[error("alphabet is already finalized")]
    AlreadyFinalized,

    /// 位或 BWT 位置越过结构末尾
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// 请求的位置
        index: usize,
        /// 结构的长度
        len: usize,
    },

    /// 字符超出小波树节点或 C 表覆盖的区间
    #[error("symbol {symbol} outside range [{low}, {high}]")]
    SymbolOutOfRange {
        /// 请求的字符编码
        symbol: u8,
        /// 最小合法编码
        low: u8,
        /// 最大合法编码
        high: u8,
    },

    /// 小波树节点要划分的区间不足两个字符
    #[error("cannot split symbol range [{low}, {high}]")]
    ConstructionError {
        /// 区间下界
        low: u8,
        /// 区间上界
        high: u8,
    },

    /// 输入长度或起始序列深度超出构建器的上限
    #[error("{what} {value} exceeds the supported maximum of {limit}")]
    SequenceTooLarge {
        /// 超限的量
        what: &'static str,
        /// 实际值
        value: usize,
        /// 允许的最大值
        limit: usize,
    },

    /// 少于两个字符（含终止符）
    #[error("sequence of length {len} is too short to index")]
    SequenceTooShort {
        /// 实际长度（含终止符）
        len: usize,
    },

    /// 紧凑编码序列不合规（终止符位置、字符范围）
    #[error("malformed sequence at position {position}: {reason}")]
    MalformedSequence {
        /// 第一个出错位置
        position: usize,
        /// 错误说明
        reason: &'static str,
    },

    /// 查询字节从未在参考序列中出现
    #[error("query symbol '{}' at position {position} does not occur in the reference", char::from(*.byte))]
    UnknownSymbol {
        /// 出错的原始字节
        byte: u8,
        /// 在查询串中的位置
        position: usize,
    },

    /// 查询串为空
    #[error("query is empty")]
    EmptyQuery,

    /// 通过取消令牌中止了构建
    #[error("index construction cancelled")]
    Cancelled,
}

/// 核心模块通用的 Result 别名
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_message_shows_the_character() {
        let err = IndexError::UnknownSymbol { byte: b'X', position: 4 };
        assert_eq!(err.to_string(), "query symbol 'X' at position 4 does not occur in the reference");
    }

    #[test]
    fn bounds_messages_carry_their_values() {
        assert_eq!(IndexError::IndexOutOfRange { index: 9, len: 4 }.to_string(), "index 9 out of range (length 4)");
        assert_eq!(IndexError::InvalidSymbol { byte: 0x80, reason: "r" }.to_string(), "invalid symbol 0x80: r");
    }
}
