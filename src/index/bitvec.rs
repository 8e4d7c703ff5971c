use serde::{Deserialize, Serialize, Serializer};

use crate::error::{IndexError, Result};

const WORD_BITS: usize = 64;
const WORD_SHIFT: usize = 6;
const WORD_MASK: usize = WORD_BITS - 1;
/// 每个超级桶包含的字（桶）数，即 4096 位
const WORDS_PER_SUPER: usize = 64;
const SUPER_SHIFT: usize = 12;

/// 带两级计数的定长位向量，rank1 为 O(1)。
///
/// - `buckets[w]`：字 w 之前、同一超级桶内的 1 的个数（不含字 w 本身）
/// - `super_buckets[s]`：超级桶 s 之前的 1 的总数
///
/// 两种写入方式：
/// - `set_bit` / `reset_bit`：就地维护计数（适合少量修改）
/// - `*_no_bucket`：只改位，之后必须调用一次 `refresh_buckets`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BitWords")]
pub struct SuccinctBitVector {
    len: usize,
    words: Vec<u64>,
    buckets: Vec<u16>,
    super_buckets: Vec<u32>,
}

impl SuccinctBitVector {
    /// 创建长度为 `len` 的全 0 位向量。
    ///
    /// 存储总是比 `len` 多出至少一位，`rank1(len)` 因此可以直接查表。
    pub fn new(len: usize) -> Self {
        let num_super = ((len >> WORD_SHIFT) + WORDS_PER_SUPER) / WORDS_PER_SUPER;
        let num_words = num_super * WORDS_PER_SUPER;
        Self {
            len,
            words: vec![0; num_words],
            buckets: vec![0; num_words],
            super_buckets: vec![0; num_super],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn check_write(&self, index: usize) -> Result<(usize, u64)> {
        if index >= self.len {
            return Err(IndexError::IndexOutOfRange { index, len: self.len });
        }
        Ok((index >> WORD_SHIFT, 1u64 << (index & WORD_MASK)))
    }

    pub fn get(&self, index: usize) -> Result<bool> {
        let (w, mask) = self.check_write(index)?;
        Ok(self.words[w] & mask != 0)
    }

    /// 置位并更新其后的桶与超级桶。
    pub fn set_bit(&mut self, index: usize) -> Result<()> {
        let (w, mask) = self.check_write(index)?;
        if self.words[w] & mask == 0 {
            self.words[w] |= mask;
            self.adjust_counts_after(w, true);
        }
        Ok(())
    }

    /// 清位并更新其后的桶与超级桶。
    pub fn reset_bit(&mut self, index: usize) -> Result<()> {
        let (w, mask) = self.check_write(index)?;
        if self.words[w] & mask != 0 {
            self.words[w] &= !mask;
            self.adjust_counts_after(w, false);
        }
        Ok(())
    }

    /// 只置位，不维护计数。
    #[inline]
    pub fn set_bit_no_bucket(&mut self, index: usize) -> Result<()> {
        let (w, mask) = self.check_write(index)?;
        self.words[w] |= mask;
        Ok(())
    }

    /// 只清位，不维护计数。
    #[inline]
    pub fn reset_bit_no_bucket(&mut self, index: usize) -> Result<()> {
        let (w, mask) = self.check_write(index)?;
        self.words[w] &= !mask;
        Ok(())
    }

    fn adjust_counts_after(&mut self, word: usize, increment: bool) {
        let next_super = (word / WORDS_PER_SUPER) + 1;
        let bucket_end = next_super * WORDS_PER_SUPER;
        for b in &mut self.buckets[word + 1..bucket_end] {
            if increment { *b += 1 } else { *b -= 1 }
        }
        for s in &mut self.super_buckets[next_super..] {
            if increment { *s += 1 } else { *s -= 1 }
        }
    }

    /// 按当前位内容一次线性重算全部桶与超级桶。
    pub fn refresh_buckets(&mut self) {
        let mut total = 0u32;
        for (s, chunk) in self.words.chunks(WORDS_PER_SUPER).enumerate() {
            self.super_buckets[s] = total;
            let mut in_super = 0u16;
            for (j, &word) in chunk.iter().enumerate() {
                self.buckets[s * WORDS_PER_SUPER + j] = in_super;
                in_super += word.count_ones() as u16;
            }
            total += u32::from(in_super);
        }
    }

    /// `[0, index)` 中 1 的个数。
    #[inline]
    pub fn rank1(&self, index: usize) -> Result<usize> {
        if index > self.len {
            return Err(IndexError::IndexOutOfRange { index, len: self.len });
        }
        let w = index >> WORD_SHIFT;
        let mask = (1u64 << (index & WORD_MASK)) - 1;
        Ok(self.super_buckets[index >> SUPER_SHIFT] as usize
            + self.buckets[w] as usize
            + (self.words[w] & mask).count_ones() as usize)
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// 估算占用字节数（位、桶、超级桶）。
    pub fn size_in_bytes(&self) -> usize {
        self.words.len() * 8 + self.buckets.len() * 2 + self.super_buckets.len() * 4
    }
}

/// 持久化形式：只保存位本身，计数在加载时重算。
#[derive(Serialize, Deserialize)]
struct BitWords {
    len: u64,
    words: Vec<u64>,
}

#[derive(Serialize)]
struct BitWordsRef<'a> {
    len: u64,
    words: &'a [u64],
}

impl Serialize for SuccinctBitVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        BitWordsRef { len: self.len as u64, words: &self.words }.serialize(serializer)
    }
}

impl TryFrom<BitWords> for SuccinctBitVector {
    type Error = IndexError;

    /// 先按 `len` 核对字数再分配，损坏文件中的巨大 `len` 不会触发大块分配。
    fn try_from(raw: BitWords) -> Result<Self> {
        let words_len = raw.words.len();
        let expected = ((raw.len >> WORD_SHIFT) + WORDS_PER_SUPER as u64) / WORDS_PER_SUPER as u64 * WORDS_PER_SUPER as u64;
        let len = usize::try_from(raw.len).map_err(|_| IndexError::IndexOutOfRange { index: words_len, len: usize::MAX })?;
        if expected != words_len as u64 {
            return Err(IndexError::IndexOutOfRange {
                index: words_len,
                len: usize::try_from(expected).unwrap_or(usize::MAX),
            });
        }
        // len 之后不应有置位
        let tail_word = len >> WORD_SHIFT;
        let tail_mask = !((1u64 << (len & WORD_MASK)) - 1);
        if raw.words[tail_word] & tail_mask != 0 || raw.words[tail_word + 1..].iter().any(|&w| w != 0) {
            return Err(IndexError::IndexOutOfRange { index: len, len });
        }

        let mut bv = Self {
            len,
            words: raw.words,
            buckets: vec![0; words_len],
            super_buckets: vec![0; words_len / WORDS_PER_SUPER],
        };
        bv.refresh_buckets();
        Ok(bv)
    }
}
