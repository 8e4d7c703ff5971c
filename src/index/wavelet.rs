use serde::{Deserialize, Serialize};

use crate::context::BuildContext;
use crate::error::{IndexError, Result};
use crate::index::bitvec::SuccinctBitVector;

/// 每插入这么多字符检查一次取消请求
const CANCEL_POLL_INTERVAL: usize = 1 << 20;

/// 基于 C 表划分字母区间的二叉小波树，用于 BWT 上的 Occ 查询。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveletTree {
    root: WaveletNode,
}

/// 小波树节点：覆盖字母区间 `[low, high]`，
/// 小于 `threshold` 的字符记 0 进入左子树，其余记 1 进入右子树。
/// 只含一个字符的半区不再建节点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WaveletNode {
    low: u8,
    high: u8,
    threshold: u8,
    bits: SuccinctBitVector,
    left: Option<Box<WaveletNode>>,
    right: Option<Box<WaveletNode>>,
    /// 构建时的顺序写入位置，持久化时不保存
    #[serde(skip)]
    cursor: usize,
}

/// 选择划分点：使两侧的 BWT 位置数尽量接近 `[low, high]` 总数的一半。
/// 距离相同时取较低的划分点；结果总在 `[low + 1, high]` 内，两侧都不为空。
pub(crate) fn split_point(c: &[u32], low: u8, high: u8) -> u8 {
    let (lo, hi) = (low as usize, high as usize);
    let midpoint = (c[lo] as u64 + c[hi + 1] as u64) / 2;
    let mut t = lo + 1;
    while t <= hi && (c[t] as u64) < midpoint {
        t += 1;
    }
    if t > lo + 1 && t <= hi + 1 {
        let above = c[t] as u64 - midpoint;
        let below = midpoint - c[t - 1] as u64;
        if above >= below {
            t -= 1;
        }
    }
    t.clamp(lo + 1, hi) as u8
}

impl WaveletNode {
    /// 只建结构，不写数据。
    fn with_shape(c: &[u32], low: u8, high: u8) -> Result<Self> {
        if high <= low {
            return Err(IndexError::ConstructionError { low, high });
        }
        let threshold = split_point(c, low, high);
        let size = (c[high as usize + 1] - c[low as usize]) as usize;

        let left = if threshold - low >= 2 {
            Some(Box::new(Self::with_shape(c, low, threshold - 1)?))
        } else {
            None
        };
        let right = if high - threshold >= 1 {
            Some(Box::new(Self::with_shape(c, threshold, high)?))
        } else {
            None
        };

        Ok(Self {
            low,
            high,
            threshold,
            bits: SuccinctBitVector::new(size),
            left,
            right,
            cursor: 0,
        })
    }

    /// 把字符写到本节点下一个位置，并沿路由继续写入子节点。
    fn insert(&mut self, symbol: u8) -> Result<()> {
        if symbol < self.low || symbol > self.high {
            return Err(IndexError::SymbolOutOfRange { symbol, low: self.low, high: self.high });
        }
        let pos = self.cursor;
        if symbol < self.threshold {
            self.bits.reset_bit_no_bucket(pos)?;
            if let Some(left) = self.left.as_mut() {
                left.insert(symbol)?;
            }
        } else {
            self.bits.set_bit_no_bucket(pos)?;
            if let Some(right) = self.right.as_mut() {
                right.insert(symbol)?;
            }
        }
        self.cursor += 1;
        Ok(())
    }

    /// 写入结束：重算计数并清零游标，与反序列化得到的节点一致。
    fn refresh_buckets(&mut self) {
        self.bits.refresh_buckets();
        self.cursor = 0;
        if let Some(left) = self.left.as_mut() {
            left.refresh_buckets();
        }
        if let Some(right) = self.right.as_mut() {
            right.refresh_buckets();
        }
    }

    fn occ(&self, symbol: u8, index: usize) -> Result<usize> {
        if symbol < self.low || symbol > self.high {
            return Err(IndexError::SymbolOutOfRange { symbol, low: self.low, high: self.high });
        }
        if index > self.bits.len() {
            return Err(IndexError::IndexOutOfRange { index, len: self.bits.len() });
        }
        let ones = self.bits.rank1(index)?;
        if symbol < self.threshold {
            let child_index = index - ones;
            match &self.left {
                Some(left) => left.occ(symbol, child_index),
                None => Ok(child_index),
            }
        } else {
            match &self.right {
                Some(right) => right.occ(symbol, ones),
                None => Ok(ones),
            }
        }
    }

    fn size_in_bytes(&self) -> usize {
        self.bits.size_in_bytes()
            + self.left.as_ref().map_or(0, |n| n.size_in_bytes())
            + self.right.as_ref().map_or(0, |n| n.size_in_bytes())
    }

    fn depth(&self) -> usize {
        1 + self
            .left
            .as_ref()
            .map_or(0, |n| n.depth())
            .max(self.right.as_ref().map_or(0, |n| n.depth()))
    }
}

impl WaveletTree {
    /// 在序列 `seq`（通常是 BWT）上建树。`c` 为 `seq` 的 C 表，
    /// 长度为 字母表大小 + 2，末项等于 `seq.len()`。
    pub fn build(seq: &[u8], c: &[u32], ctx: &BuildContext<'_>) -> Result<Self> {
        if c.len() < 3 {
            return Err(IndexError::ConstructionError { low: 0, high: c.len().saturating_sub(2) as u8 });
        }
        let total = *c.last().unwrap_or(&0) as usize;
        if total != seq.len() {
            return Err(IndexError::IndexOutOfRange { index: seq.len(), len: total });
        }
        let high = (c.len() - 2) as u8;
        let mut root = WaveletNode::with_shape(c, 0, high)?;

        for (i, &symbol) in seq.iter().enumerate() {
            if i % CANCEL_POLL_INTERVAL == 0 {
                ctx.checkpoint()?;
            }
            root.insert(symbol)?;
        }
        root.refresh_buckets();
        ctx.checkpoint()?;

        Ok(Self { root })
    }

    /// `seq[0, index)` 中 `symbol` 的出现次数。
    #[inline]
    pub fn occ(&self, symbol: u8, index: usize) -> Result<usize> {
        self.root.occ(symbol, index)
    }

    /// 序列长度（即根节点位数）。
    pub fn len(&self) -> usize {
        self.root.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 覆盖的字母区间 `(low, high)`。
    pub fn symbol_range(&self) -> (u8, u8) {
        (self.root.low, self.root.high)
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.root.size_in_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c_table(seq: &[u8], sigma: usize) -> Vec<u32> {
        let mut freq = vec![0u32; sigma + 1];
        for &s in seq {
            freq[s as usize] += 1;
        }
        let mut c = vec![0u32; sigma + 2];
        for s in 0..=sigma {
            c[s + 1] = c[s] + freq[s];
        }
        c
    }

    fn naive_occ(seq: &[u8], symbol: u8, i: usize) -> usize {
        seq[..i].iter().filter(|&&s| s == symbol).count()
    }

    fn make_seq(len: usize, sigma: u8) -> Vec<u8> {
        let mut x: u32 = 2024;
        let mut v: Vec<u8> = (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                1 + ((x >> 16) % sigma as u32) as u8
            })
            .collect();
        v[len / 2] = 0;
        v
    }

    #[test]
    fn occ_matches_linear_scan() {
        for sigma in [1u8, 2, 3, 4, 7, 20] {
            let seq = make_seq(300, sigma);
            let c = c_table(&seq, sigma as usize);
            let tree = WaveletTree::build(&seq, &c, &BuildContext::new()).unwrap();
            assert_eq!(tree.len(), seq.len());
            for symbol in 0..=sigma {
                for i in 0..=seq.len() {
                    assert_eq!(tree.occ(symbol, i).unwrap(), naive_occ(&seq, symbol, i), "sigma={} symbol={} i={}", sigma, symbol, i);
                }
            }
        }
    }

    #[test]
    fn occ_rejects_bad_arguments() {
        let seq = [2u8, 1, 0, 1];
        let c = c_table(&seq, 2);
        let tree = WaveletTree::build(&seq, &c, &BuildContext::new()).unwrap();
        assert_eq!(tree.occ(3, 0), Err(IndexError::SymbolOutOfRange { symbol: 3, low: 0, high: 2 }));
        assert_eq!(tree.occ(1, 5), Err(IndexError::IndexOutOfRange { index: 5, len: 4 }));
    }

    #[test]
    fn split_point_balances_counts() {
        // 0:1, 1:5, 2:1, 3:5 → 总 12，中点 6，C[2] = 6 正好在中点
        let c = [0u32, 1, 6, 7, 12];
        assert_eq!(split_point(&c, 0, 3), 2);
        // 单个字符占大多数时仍保证两侧非空
        let c = [0u32, 1, 100, 101];
        let t = split_point(&c, 0, 2);
        assert!((1..=2).contains(&t));
        let c = [0u32, 1, 2];
        assert_eq!(split_point(&c, 0, 1), 1);
    }

    #[test]
    fn split_point_ties_go_low() {
        // C: 0, 2, 4, 6 → 中点 3，C[1]=2 与 C[2]=4 距离相同
        let c = [0u32, 2, 4, 6];
        assert_eq!(split_point(&c, 0, 2), 1);
    }

    #[test]
    fn symbols_without_occurrences_do_not_break_shape() {
        // 字母表声明了 4 个字符，序列只用到 1
        let seq = [1u8, 1, 0, 1];
        let c = c_table(&seq, 4);
        let tree = WaveletTree::build(&seq, &c, &BuildContext::new()).unwrap();
        assert_eq!(tree.occ(1, 4).unwrap(), 3);
        assert_eq!(tree.occ(4, 4).unwrap(), 0);
        assert!(tree.depth() <= 4);
    }

    #[test]
    fn mismatched_c_table_is_rejected() {
        let seq = [1u8, 0];
        let c = [0u32, 1, 3];
        assert!(WaveletTree::build(&seq, &c, &BuildContext::new()).is_err());
        let c = [0u32, 2];
        assert!(matches!(
            WaveletTree::build(&seq, &c, &BuildContext::new()),
            Err(IndexError::ConstructionError { .. })
        ));
    }

    #[test]
    fn too_many_symbols_for_a_node_is_an_error() {
        // C 表声明 1 出现 1 次、2 出现 2 次，序列里正好相反
        let seq = [1u8, 1, 2, 0];
        let c = [0u32, 1, 2, 4];
        let err = WaveletTree::build(&seq, &c, &BuildContext::new()).unwrap_err();
        assert!(matches!(err, IndexError::IndexOutOfRange { .. }));
    }
}
