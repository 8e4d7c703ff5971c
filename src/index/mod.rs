//! 索引构建与查询：位向量、小波树、BWT 与 FM 索引。

pub mod bitvec;
pub mod bwt;
pub mod fm;
pub mod wavelet;
