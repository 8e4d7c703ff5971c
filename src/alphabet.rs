use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// 支持的原始字符上限（仅 1..=127）。
pub const RAW_LIMIT: usize = 128;

/// 终止符的紧凑编码。
pub const SENTINEL: u8 = 0;

/// 原始字节 → 紧凑编码（1..=alphabet_size）的字母表。
///
/// 生命周期分两段：
/// - 未定型：`add` 只记录“出现过”；
/// - 定型（`finalize`）后：按原始字节升序分配稠密编码，之后只读。
///
/// 0 预留给终止符 `$`，所以它比任何字符都小。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphabetCompactor {
    /// 定型前为 0/1 标记，定型后为紧凑编码（0 = 未出现）
    table: Vec<u8>,
    /// 紧凑编码 → 原始字节，下标 0 为终止符
    raw: Vec<u8>,
    size: u8,
    finalized: bool,
}

impl Default for AlphabetCompactor {
    fn default() -> Self {
        Self::new()
    }
}

impl AlphabetCompactor {
    pub fn new() -> Self {
        Self {
            table: vec![0; RAW_LIMIT],
            raw: Vec::new(),
            size: 0,
            finalized: false,
        }
    }

    /// 注册一个原始字符。
    pub fn add(&mut self, byte: u8) -> Result<()> {
        if self.finalized {
            return Err(IndexError::InvalidSymbol {
                byte,
                reason: "alphabet is already finalized",
            });
        }
        if byte == 0 || byte as usize >= RAW_LIMIT {
            return Err(IndexError::InvalidSymbol {
                byte,
                reason: "only raw codes 1..=127 are supported",
            });
        }
        self.table[byte as usize] = 1;
        Ok(())
    }

    /// 按原始字节升序分配紧凑编码。重复调用报错且不改动已有编码。
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(IndexError::AlreadyFinalized);
        }
        let mut next = 1u8;
        self.raw = vec![SENTINEL];
        for b in 1..RAW_LIMIT {
            if self.table[b] != 0 {
                self.table[b] = next;
                self.raw.push(b as u8);
                next += 1;
            }
        }
        self.size = next - 1;
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// 原始字节的紧凑编码；未注册的字节（含 >127）返回 0。
    #[inline]
    pub fn code(&self, byte: u8) -> Result<u8> {
        if !self.finalized {
            return Err(IndexError::NotFinalized);
        }
        Ok(self.table.get(byte as usize).copied().unwrap_or(0))
    }

    pub fn alphabet_size(&self) -> Result<u8> {
        if !self.finalized {
            return Err(IndexError::NotFinalized);
        }
        Ok(self.size)
    }

    /// 紧凑编码 → 原始字节（0 → None，表示终止符）。
    pub fn raw(&self, code: u8) -> Result<Option<u8>> {
        if !self.finalized {
            return Err(IndexError::NotFinalized);
        }
        if code == SENTINEL {
            return Ok(None);
        }
        match self.raw.get(code as usize) {
            Some(&b) => Ok(Some(b)),
            None => Err(IndexError::SymbolOutOfRange { symbol: code, low: 0, high: self.size }),
        }
    }

    /// 编码整条参考序列并追加终止符。
    pub fn compact_sequence(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut out = self.compact_query(raw)?;
        out.push(SENTINEL);
        Ok(out)
    }

    /// 编码查询串；出现未注册的字符时报 `UnknownSymbol`。
    pub fn compact_query(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(raw.len() + 1);
        for (position, &byte) in raw.iter().enumerate() {
            match self.code(byte)? {
                0 => return Err(IndexError::UnknownSymbol { byte, position }),
                c => out.push(c),
            }
        }
        Ok(out)
    }

    /// 从原始字节一次性构建并定型。
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let mut alphabet = Self::new();
        for &b in raw {
            alphabet.add(b)?;
        }
        alphabet.finalize()?;
        Ok(alphabet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_raw_order() {
        let mut a = AlphabetCompactor::new();
        for &b in b"TGCA" {
            a.add(b).unwrap();
        }
        a.finalize().unwrap();
        assert_eq!(a.alphabet_size().unwrap(), 4);
        assert_eq!(a.code(b'A').unwrap(), 1);
        assert_eq!(a.code(b'C').unwrap(), 2);
        assert_eq!(a.code(b'G').unwrap(), 3);
        assert_eq!(a.code(b'T').unwrap(), 4);
        assert_eq!(a.code(b'N').unwrap(), 0);
        assert_eq!(a.code(200).unwrap(), 0);
        assert_eq!(a.raw(3).unwrap(), Some(b'G'));
        assert_eq!(a.raw(0).unwrap(), None);
    }

    #[test]
    fn lifecycle_misuse_is_reported() {
        let mut a = AlphabetCompactor::new();
        assert_eq!(a.code(b'A'), Err(IndexError::NotFinalized));
        assert_eq!(a.alphabet_size(), Err(IndexError::NotFinalized));
        assert!(matches!(a.add(0), Err(IndexError::InvalidSymbol { byte: 0, .. })));
        assert!(matches!(a.add(128), Err(IndexError::InvalidSymbol { byte: 128, .. })));

        a.add(b'X').unwrap();
        a.finalize().unwrap();
        assert!(matches!(a.add(b'Y'), Err(IndexError::InvalidSymbol { byte: b'Y', .. })));
    }

    #[test]
    fn second_finalize_keeps_codes() {
        let mut a = AlphabetCompactor::from_bytes(b"BANANA").unwrap();
        let before = a.clone();
        assert_eq!(a.finalize(), Err(IndexError::AlreadyFinalized));
        assert_eq!(a, before);
        assert_eq!(a.code(b'N').unwrap(), 3);
    }

    #[test]
    fn compact_sequence_appends_sentinel() {
        let a = AlphabetCompactor::from_bytes(b"BANANA").unwrap();
        assert_eq!(a.compact_sequence(b"BANANA").unwrap(), vec![2, 1, 3, 1, 3, 1, 0]);
        assert_eq!(
            a.compact_query(b"BAX"),
            Err(IndexError::UnknownSymbol { byte: b'X', position: 2 })
        );
    }
}
