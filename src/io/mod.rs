//! 参考序列读入：FASTA 或纯文本 → 紧凑编码序列与字母表。

pub mod fasta;
pub mod text;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use tracing::info;

use crate::alphabet::AlphabetCompactor;

/// 参考文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReferenceFormat {
    #[default]
    Fasta,
    Text,
}

/// 已编码的参考序列，可直接交给 [`crate::FmIndex::build`]。
#[derive(Debug, Clone)]
pub struct Reference {
    /// FASTA 记录 id，纯文本为 `None`
    pub name: Option<String>,
    pub alphabet: AlphabetCompactor,
    /// 紧凑编码，以 0 结尾
    pub codes: Vec<u8>,
}

impl Reference {
    /// 从已规整的原始字节建立字母表并编码。
    pub fn from_raw(name: Option<String>, raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            bail!("reference is empty");
        }
        let alphabet = AlphabetCompactor::from_bytes(raw)?;
        let codes = alphabet.compact_sequence(raw)?;
        Ok(Self { name, alphabet, codes })
    }

    /// 参考长度（不含终止符）
    pub fn len(&self) -> usize {
        self.codes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 读入参考文件。FASTA 默认取第一条记录，`sequence` 给出时按 id 查找。
pub fn read_reference(path: impl AsRef<Path>, format: ReferenceFormat, sequence: Option<&str>) -> Result<Reference> {
    let path = path.as_ref();
    let fh = File::open(path).with_context(|| format!("cannot open reference '{}'", path.display()))?;
    let buf = BufReader::new(fh);

    let (name, raw) = match format {
        ReferenceFormat::Fasta => {
            let mut reader = fasta::FastaReader::new(buf);
            let record = match sequence {
                Some(name) => reader
                    .find_sequence(name)?
                    .with_context(|| format!("sequence '{}' not found in '{}'", name, path.display()))?,
                None => reader
                    .next_record()?
                    .with_context(|| format!("FASTA file '{}' contains no sequences", path.display()))?,
            };
            (Some(record.id), text::normalize(&record.seq))
        }
        ReferenceFormat::Text => {
            if sequence.is_some() {
                bail!("--sequence only applies to FASTA references");
            }
            (None, text::read_text(buf)?)
        }
    };

    if raw.is_empty() {
        bail!("reference '{}' contains no usable symbols", path.display());
    }
    let reference = Reference::from_raw(name, &raw)?;
    info!(
        path = %path.display(),
        name = reference.name.as_deref().unwrap_or("-"),
        len = reference.len(),
        alphabet_size = reference.alphabet.alphabet_size()?,
        "reference loaded"
    );
    Ok(reference)
}

/// 查询串按参考的同一规则规整：去掉不可打印字节并转大写。
pub fn normalize_query(raw: &[u8]) -> Vec<u8> {
    text::normalize(raw)
}
