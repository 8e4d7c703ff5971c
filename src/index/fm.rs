use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alphabet::AlphabetCompactor;
use crate::config::BuildConfig;
use crate::context::BuildContext;
use crate::error::{IndexError, Result};
use crate::index::bwt::{build_bwt, Bwt};
use crate::index::wavelet::WaveletTree;

/// 索引构建元信息（可选）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 只做计数的 FM 索引：
/// - 字母表与参考序列共用同一套紧凑编码（0 为 $）
/// - C 表长度为 字母表大小 + 2
/// - Occ 由 BWT 上的小波树回答，不保存 BWT 本身和 SA
///
/// 构建后只读，可在多个线程间共享查询。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FmIndex {
    alphabet: AlphabetCompactor,
    /// C[s] = 序列中小于 s 的字符数量
    c: Vec<u32>,
    occ: WaveletTree,
    meta: IndexMeta,
}

impl FmIndex {
    /// 从紧凑编码序列（以 0 结尾）构建索引。
    pub fn build(
        codes: &[u8],
        alphabet: AlphabetCompactor,
        config: &BuildConfig,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Self> {
        let alphabet_size = alphabet.alphabet_size()?;
        let bwt = build_bwt(codes, alphabet_size, config, ctx)?;
        Self::from_bwt(bwt, alphabet, ctx)
    }

    /// 用已构建好的 BWT 与 C 表建小波树。
    pub fn from_bwt(bwt: Bwt, alphabet: AlphabetCompactor, ctx: &BuildContext<'_>) -> Result<Self> {
        let alphabet_size = alphabet.alphabet_size()? as usize;
        if bwt.c.len() != alphabet_size + 2 {
            return Err(IndexError::IndexOutOfRange { index: bwt.c.len(), len: alphabet_size + 2 });
        }
        if let Some(position) = bwt.c.windows(2).position(|w| w[1] < w[0]) {
            return Err(IndexError::MalformedSequence { position: position + 1, reason: "C table must be non-decreasing" });
        }
        let _bwt_held = ctx.memory().reserve(bwt.bwt.len());
        let occ = WaveletTree::build(&bwt.bwt, &bwt.c, ctx)?;
        // 峰值计入 BWT 与整棵小波树同时存在的时刻
        let _tree_held = ctx.memory().reserve(occ.size_in_bytes());
        info!(len = occ.len(), depth = occ.depth(), bytes = occ.size_in_bytes(), "wavelet tree built");
        Ok(Self { alphabet, c: bwt.c, occ, meta: IndexMeta::default() })
    }

    pub fn alphabet(&self) -> &AlphabetCompactor {
        &self.alphabet
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    /// C 表中 `symbol` 一项。
    pub fn c(&self, symbol: u8) -> Result<usize> {
        self.c
            .get(symbol as usize)
            .map(|&v| v as usize)
            .ok_or(IndexError::SymbolOutOfRange { symbol, low: 0, high: (self.c.len() - 2) as u8 })
    }

    /// `symbol` 在参考序列中的总出现次数。
    pub fn total(&self, symbol: u8) -> Result<usize> {
        let high = (self.c.len() - 2) as u8;
        if symbol > high {
            return Err(IndexError::SymbolOutOfRange { symbol, low: 0, high });
        }
        Ok((self.c[symbol as usize + 1] - self.c[symbol as usize]) as usize)
    }

    /// BWT[0..pos) 中 `symbol` 的出现次数
    #[inline]
    pub fn occ(&self, symbol: u8, pos: usize) -> Result<usize> {
        self.occ.occ(symbol, pos)
    }

    /// 返回在区间 [l, r) 上向左扩展字符 c 后的新区间
    #[inline]
    pub fn rank_range(&self, c: u8, l: usize, r: usize) -> Result<(usize, usize)> {
        let c0 = self.c(c)?;
        Ok((c0 + self.occ(c, l)?, c0 + self.occ(c, r)?))
    }

    /// 反向搜索精确匹配，`pat` 为紧凑编码（不应包含 0）。
    /// 无匹配时返回 `None`。
    pub fn backward_search(&self, pat: &[u8]) -> Result<Option<(usize, usize)>> {
        let Some((&last, rest)) = pat.split_last() else {
            return Err(IndexError::EmptyQuery);
        };
        let mut l = self.c(last)?;
        let mut r = l + self.total(last)?;
        if r <= l {
            return Ok(None);
        }
        for &a in rest.iter().rev() {
            let (nl, nr) = self.rank_range(a, l, r)?;
            if nr <= nl {
                return Ok(None);
            }
            l = nl;
            r = nr;
        }
        Ok(Some((l, r)))
    }

    /// 紧凑编码查询的出现次数。
    pub fn count_codes(&self, pat: &[u8]) -> Result<usize> {
        Ok(self.backward_search(pat)?.map_or(0, |(l, r)| r - l))
    }

    /// 原始字节查询的出现次数，经由索引自带的字母表编码。
    pub fn count(&self, query: &[u8]) -> Result<usize> {
        if query.is_empty() {
            return Err(IndexError::EmptyQuery);
        }
        let codes = self.alphabet.compact_query(query)?;
        self.count_codes(&codes)
    }

    /// BWT 长度（含 $）
    pub fn len(&self) -> usize {
        self.occ.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occ.is_empty()
    }

    /// 参考序列长度（不含 $）
    pub fn reference_len(&self) -> usize {
        self.len().saturating_sub(1)
    }

    pub fn alphabet_size(&self) -> usize {
        self.c.len() - 2
    }

    /// 估算索引占用字节数
    pub fn size_in_bytes(&self) -> usize {
        self.occ.size_in_bytes() + self.c.len() * 4 + std::mem::size_of::<AlphabetCompactor>()
    }

    pub fn save_to_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        bincode::serialize_into(writer, self).context("cannot serialize FM index")?;
        Ok(())
    }

    pub fn load_from_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let idx: Self = bincode::deserialize_from(reader).context("cannot deserialize FM index")?;
        idx.check_consistency().context("corrupt FM index")?;
        Ok(idx)
    }

    /// 反序列化后核对字母表、C 表与小波树三者是否一致。
    fn check_consistency(&self) -> anyhow::Result<()> {
        let alphabet_size = self.alphabet.alphabet_size()? as usize;
        if self.c.len() != alphabet_size + 2 {
            anyhow::bail!("C table has {} entries, alphabet of size {} needs {}", self.c.len(), alphabet_size, alphabet_size + 2);
        }
        if self.c[0] != 0 || self.c.windows(2).any(|w| w[1] < w[0]) {
            anyhow::bail!("C table is not a non-decreasing prefix sum");
        }
        if self.c.last().map(|&n| n as usize) != Some(self.occ.len()) {
            anyhow::bail!("C table does not match the wavelet tree length");
        }
        if self.occ.symbol_range() != (0, alphabet_size as u8) {
            anyhow::bail!("wavelet tree symbol range {:?} does not match the alphabet", self.occ.symbol_range());
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let f = File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?;
        let mut w = BufWriter::new(f);
        self.save_to_writer(&mut w)?;
        w.flush()?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("cannot open '{}'", path.display()))?;
        Self::load_from_reader(BufReader::new(f)).with_context(|| format!("while loading '{}'", path.display()))
    }
}
