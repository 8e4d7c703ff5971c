//! 基于起始序列分桶的 BWT 构建，不需要完整后缀数组。
//!
//! 按字典序枚举长度为 k 的起始序列，对每个起始序列收集以它开头的旋转，
//! 排序后依次输出旋转前一个字符。缓冲区装满时把起始序列延长一位递归处理，
//! 已收集的旋转留在待处理栈中，在更深层扫描到末尾时再按前缀取回。

use std::cmp::Ordering;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::alphabet::SENTINEL;
use crate::config::BuildConfig;
use crate::context::{BuildContext, Reservation};
use crate::error::{IndexError, Result};

/// 可索引的最大序列长度（含哨兵），旋转位置以 u32 存储
pub const MAX_SEQUENCE_LEN: usize = (1usize << 31) - 2;

/// 堆排序每做这么多次下沉检查一次取消请求
const SORT_POLL_INTERVAL: usize = 1 << 16;

/// BWT 与其 C 表。
///
/// `c` 长度为 字母表大小 + 2：`c[s]` 是小于 `s` 的字符个数，
/// `c[0] = 0`，末项等于序列长度。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bwt {
    pub bwt: Vec<u8>,
    pub c: Vec<u32>,
}

/// 为以哨兵结尾的紧凑编码序列构建 BWT。
///
/// `text` 中除末尾的唯一一个 0 外，所有字符都须落在 `1..=alphabet_size`。
pub fn build_bwt(
    text: &[u8],
    alphabet_size: u8,
    config: &BuildConfig,
    ctx: &mut BuildContext<'_>,
) -> Result<Bwt> {
    validate(text, alphabet_size)?;
    let started = Instant::now();
    let k = config.start_sequence_len_for(alphabet_size as usize);
    info!(
        len = text.len(),
        alphabet_size,
        start_sequence_len = k,
        buffer_capacity = config.get_rotation_buffer_capacity(),
        "building BWT"
    );

    let builder = BwtBuilder::new(text, alphabet_size, config, ctx);
    let bwt = builder.run(k)?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        peak_bytes = ctx.memory().peak(),
        "BWT built"
    );
    Ok(bwt)
}

fn validate(text: &[u8], alphabet_size: u8) -> Result<()> {
    let n = text.len();
    if n > MAX_SEQUENCE_LEN {
        return Err(IndexError::SequenceTooLarge { what: "sequence length", value: n, limit: MAX_SEQUENCE_LEN });
    }
    if n < 2 {
        return Err(IndexError::SequenceTooShort { len: n });
    }
    if text[n - 1] != SENTINEL {
        return Err(IndexError::MalformedSequence { position: n - 1, reason: "sequence must end with the sentinel" });
    }
    if let Some(position) = text[..n - 1].iter().position(|&s| s == SENTINEL || s > alphabet_size) {
        let reason = if text[position] == SENTINEL {
            "sentinel may only appear at the end"
        } else {
            "symbol exceeds the alphabet size"
        };
        return Err(IndexError::MalformedSequence { position, reason });
    }
    Ok(())
}

/// 旋转 `r` 的前一个字符，即 BWT 中对应的输出。
#[inline]
fn preceding(text: &[u8], r: usize) -> u8 {
    if r == 0 {
        SENTINEL
    } else {
        text[r - 1]
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32,
    len: u32,
}

/// 长单字符串（如 N 区、多聚 A）的位置表，按字符分组、按起点升序。
/// 比较两个旋转时用它一步跳过共同的同字符段。
#[derive(Debug)]
struct LongRuns {
    runs: Vec<Vec<Run>>,
}

impl LongRuns {
    fn detect(text: &[u8], alphabet_size: u8, threshold: usize) -> Self {
        let mut runs = vec![Vec::new(); alphabet_size as usize + 1];
        let mut start = 0;
        while start < text.len() {
            let symbol = text[start];
            let mut end = start + 1;
            while end < text.len() && text[end] == symbol {
                end += 1;
            }
            if symbol != SENTINEL && end - start >= threshold {
                runs[symbol as usize].push(Run { start: start as u32, len: (end - start) as u32 });
            }
            start = end;
        }
        Self { runs }
    }

    fn entries(&self) -> usize {
        self.runs.iter().map(Vec::len).sum()
    }

    /// `pos` 落在某个 `symbol` 长串内时，返回从 `pos` 到串尾的长度。
    fn remaining(&self, symbol: u8, pos: usize) -> usize {
        let runs = &self.runs[symbol as usize];
        let idx = runs.partition_point(|r| r.start as usize <= pos);
        if idx == 0 {
            return 0;
        }
        let run = runs[idx - 1];
        let end = run.start as usize + run.len as usize;
        end.saturating_sub(pos)
    }

    /// 两个位置都处在同一字符的长串中时可以共同跳过的长度。
    fn common_len(&self, text: &[u8], i: usize, j: usize) -> usize {
        let symbol = text[i];
        if symbol == SENTINEL || text[j] != symbol || self.runs[symbol as usize].is_empty() {
            return 0;
        }
        self.remaining(symbol, i).min(self.remaining(symbol, j))
    }
}

/// 旋转比较器。哨兵唯一，因此两个不同旋转总会在越过序列末尾前分出大小。
struct RotationOrder<'t> {
    text: &'t [u8],
    long_runs: LongRuns,
    probe_after: usize,
}

impl RotationOrder<'_> {
    /// 比较旋转 `a` 与 `b`，已知前 `skip` 个字符相同。
    fn compare(&self, a: u32, b: u32, skip: usize) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let text = self.text;
        let mut i = a as usize + skip;
        let mut j = b as usize + skip;

        for _ in 0..self.probe_after {
            match text[i].cmp(&text[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }

        let jump = self.long_runs.common_len(text, i, j);
        i += jump;
        j += jump;

        loop {
            match text[i].cmp(&text[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }
    }
}

/// 原地堆排序，`poll` 周期性调用以便响应取消。
fn heap_sort<L, P>(v: &mut [u32], mut is_less: L, mut poll: P) -> Result<()>
where
    L: FnMut(u32, u32) -> bool,
    P: FnMut() -> Result<()>,
{
    let len = v.len();
    let mut steps = 0usize;

    for start in (0..len / 2).rev() {
        sift_down(v, start, len, &mut is_less);
        steps += 1;
        if steps % SORT_POLL_INTERVAL == 0 {
            poll()?;
        }
    }
    for end in (1..len).rev() {
        v.swap(0, end);
        sift_down(v, 0, end, &mut is_less);
        steps += 1;
        if steps % SORT_POLL_INTERVAL == 0 {
            poll()?;
        }
    }
    poll()
}

fn sift_down<L>(v: &mut [u32], mut node: usize, end: usize, is_less: &mut L)
where
    L: FnMut(u32, u32) -> bool,
{
    loop {
        let mut child = 2 * node + 1;
        if child >= end {
            break;
        }
        if child + 1 < end && is_less(v[child], v[child + 1]) {
            child += 1;
        }
        if !is_less(v[node], v[child]) {
            break;
        }
        v.swap(node, child);
        node = child;
    }
}

/// 因缓冲区已满而暂存的一层旋转。
struct PendingRotations {
    rotations: Vec<u32>,
    _reservation: Reservation,
}

struct BwtBuilder<'t, 'c, 'x> {
    order: RotationOrder<'t>,
    alphabet_size: u8,
    config: &'t BuildConfig,
    ctx: &'c mut BuildContext<'x>,
    start_seq: Vec<u8>,
    pending: Vec<PendingRotations>,
    bwt: Vec<u8>,
    c: Vec<u32>,
    _reservations: Vec<Reservation>,
}

impl<'t, 'c, 'x> BwtBuilder<'t, 'c, 'x> {
    fn new(text: &'t [u8], alphabet_size: u8, config: &'t BuildConfig, ctx: &'c mut BuildContext<'x>) -> Self {
        let long_runs = LongRuns::detect(text, alphabet_size, config.get_long_run_threshold());
        debug!(long_runs = long_runs.entries(), threshold = config.get_long_run_threshold(), "long runs detected");

        let reservations = vec![
            ctx.memory().reserve(text.len()),
            ctx.memory().reserve(text.len()),
            ctx.memory().reserve(long_runs.entries() * std::mem::size_of::<Run>()),
        ];
        Self {
            order: RotationOrder { text, long_runs, probe_after: config.get_long_run_probe_after() },
            alphabet_size,
            config,
            ctx,
            start_seq: Vec::new(),
            pending: Vec::new(),
            bwt: Vec::with_capacity(text.len()),
            c: vec![0; alphabet_size as usize + 2],
            _reservations: reservations,
        }
    }

    fn run(mut self, k: usize) -> Result<Bwt> {
        let text = self.order.text;
        let n = text.len();
        let sigma = self.alphabet_size;
        let total = (sigma as usize).saturating_pow(k as u32);

        // 第 0 行是以哨兵开头的旋转
        self.bwt.push(preceding(text, n - 1));
        self.c[sigma as usize + 1] = n as u32;

        self.start_seq = vec![1; k];
        // 上次递增落在的位置（从 1 计），更短的前缀在这之前都已处理过
        let mut changed = 1;
        let mut done = 0;
        loop {
            if changed == 1 {
                self.c[self.start_seq[0] as usize] = self.bwt.len() as u32;
            }
            for len in changed..k {
                self.check_tail(len);
            }
            debug!(start_sequence = ?self.start_seq, row = self.bwt.len(), "processing start sequence");
            self.find_rotations(k, 0)?;
            done += 1;
            self.ctx.report_progress(done, total);

            changed = k;
            while changed > 0 {
                let slot = &mut self.start_seq[changed - 1];
                *slot += 1;
                if *slot <= sigma {
                    break;
                }
                *slot = 1;
                changed -= 1;
            }
            if changed == 0 {
                break;
            }
        }

        debug_assert_eq!(self.bwt.len(), n);
        let Self { bwt, c, .. } = self;
        Ok(Bwt { bwt, c })
    }

    /// 长度为 `len` 的末尾片段（紧挨哨兵之前）若等于当前前缀，输出它的前一个字符。
    /// 这些旋转不足 k 个字符就遇到哨兵，扫描时不会被收集到。
    fn check_tail(&mut self, len: usize) {
        let text = self.order.text;
        let n = text.len();
        if len >= n {
            return;
        }
        let start = n - 1 - len;
        if text[start..n - 1] == self.start_seq[..len] {
            self.bwt.push(preceding(text, start));
        }
    }

    /// 从待处理栈中取出所有以当前前缀开头的旋转。
    fn take_pending_matches(&mut self, depth: usize) -> Vec<u32> {
        let text = self.order.text;
        let prefix = &self.start_seq[..depth];
        let mut matched = Vec::new();
        for level in &mut self.pending {
            level.rotations.retain(|&r| {
                let r = r as usize;
                if text.get(r..r + depth) == Some(prefix) {
                    matched.push(r as u32);
                    false
                } else {
                    true
                }
            });
        }
        matched
    }

    fn find_rotations(&mut self, depth: usize, from: usize) -> Result<()> {
        self.ctx.checkpoint()?;
        let text = self.order.text;
        let end = text.len().saturating_sub(depth);
        let cap = self.config.get_rotation_buffer_capacity();

        let mut rotations: Vec<u32> = Vec::with_capacity(cap.min(end.saturating_sub(from)));
        let reservation = self.ctx.memory().reserve(rotations.capacity() * std::mem::size_of::<u32>());

        let mut pos = from;
        {
            let prefix = &self.start_seq[..depth];
            while pos < end && rotations.len() < cap {
                if text[pos..pos + depth] == *prefix {
                    rotations.push(pos as u32);
                }
                pos += 1;
            }
        }
        self.ctx.checkpoint()?;

        if pos >= end {
            let deferred = self.take_pending_matches(depth);
            let (mut batch, _merged) = if deferred.is_empty() {
                (rotations, None)
            } else {
                let mut merged = deferred;
                merged.extend_from_slice(&rotations);
                let held = self.ctx.memory().reserve(merged.capacity() * std::mem::size_of::<u32>());
                (merged, Some(held))
            };

            if batch.len() > 1 {
                let order = &self.order;
                let ctx: &BuildContext<'_> = &*self.ctx;
                heap_sort(&mut batch, |a, b| order.compare(a, b, depth) == Ordering::Less, || ctx.checkpoint())?;
            }
            for &r in &batch {
                self.bwt.push(preceding(text, r as usize));
            }
            return Ok(());
        }

        let limit = self.config.get_max_start_sequence_len();
        if depth >= limit {
            return Err(IndexError::SequenceTooLarge { what: "start sequence length", value: depth + 1, limit });
        }
        trace!(depth, stopped_at = pos, collected = rotations.len(), "rotation buffer full, extending start sequence");

        self.check_tail(depth);
        self.pending.push(PendingRotations { rotations, _reservation: reservation });
        self.start_seq.truncate(depth);
        self.start_seq.push(SENTINEL);
        for symbol in 1..=self.alphabet_size {
            self.start_seq[depth] = symbol;
            self.find_rotations(depth + 1, pos)?;
        }
        self.start_seq.truncate(depth);
        self.pending.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelToken, MemoryTracker};

    /// 哨兵唯一且最小，旋转序等于后缀序
    fn naive_bwt(text: &[u8]) -> Bwt {
        let n = text.len();
        let mut sa: Vec<usize> = (0..n).collect();
        sa.sort_by(|&a, &b| text[a..].cmp(&text[b..]));
        let bwt = sa.iter().map(|&i| text[(i + n - 1) % n]).collect();
        let sigma = *text.iter().max().unwrap() as usize;
        let mut c = vec![0u32; sigma + 2];
        for &s in text {
            c[s as usize + 1] += 1;
        }
        for s in 1..c.len() {
            c[s] += c[s - 1];
        }
        Bwt { bwt, c }
    }

    fn make_text(len: usize, sigma: u8, seed: u32) -> Vec<u8> {
        let mut x = seed;
        let mut v: Vec<u8> = (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                1 + ((x >> 16) % sigma as u32) as u8
            })
            .collect();
        v.push(SENTINEL);
        v
    }

    fn build(text: &[u8], config: &BuildConfig) -> Result<Bwt> {
        let sigma = *text.iter().max().unwrap();
        build_bwt(text, sigma, config, &mut BuildContext::new())
    }

    #[test]
    fn small_text_matches_brute_force() {
        let text = [2u8, 1, 2, 1, 3, 0];
        let bwt = build(&text, &BuildConfig::default()).unwrap();
        assert_eq!(bwt.bwt, vec![3, 2, 2, 0, 1, 1]);
        assert_eq!(bwt.c, vec![0, 1, 3, 5, 6]);
        assert_eq!(bwt, naive_bwt(&text));
    }

    #[test]
    fn banana() {
        // B=2 A=1 N=3
        let text = [2u8, 1, 3, 1, 3, 1, 0];
        let bwt = build(&text, &BuildConfig::default()).unwrap();
        assert_eq!(bwt, naive_bwt(&text));
        assert_eq!(bwt.bwt, vec![1, 3, 3, 2, 0, 1, 1]);
    }

    #[test]
    fn tiny_inputs_shorter_than_start_sequence() {
        for text in [vec![1u8, 0], vec![1, 1, 0], vec![2, 1, 0], vec![1, 2, 0]] {
            let bwt = build(&text, &BuildConfig::default()).unwrap();
            assert_eq!(bwt, naive_bwt(&text), "text={:?}", text);
        }
    }

    #[test]
    fn small_buffers_force_recursion() {
        for sigma in [1u8, 2, 4, 12] {
            for cap in [1usize, 2, 3, 7] {
                let text = make_text(200, sigma, 17 + cap as u32);
                let mut config = BuildConfig::new();
                config.rotation_buffer_capacity(cap);
                let bwt = build(&text, &config).unwrap();
                assert_eq!(bwt, naive_bwt(&text), "sigma={} cap={}", sigma, cap);
            }
        }
    }

    #[test]
    fn long_runs_are_skipped_consistently() {
        let mut text = Vec::new();
        for (sym, len) in [(1u8, 300), (2, 5), (1, 250), (3, 1), (1, 300), (2, 40), (2, 41)] {
            text.extend(std::iter::repeat(sym).take(len));
        }
        text.push(SENTINEL);
        for probe in [0usize, 1, 3, 10] {
            let mut config = BuildConfig::new();
            config.long_run_threshold(5).long_run_probe_after(probe).rotation_buffer_capacity(64);
            let bwt = build(&text, &config).unwrap();
            assert_eq!(bwt, naive_bwt(&text), "probe={}", probe);
        }
    }

    #[test]
    fn long_run_lookup() {
        let text = [1u8, 1, 1, 1, 2, 1, 1, 1, 0];
        let runs = LongRuns::detect(&text, 2, 3);
        assert_eq!(runs.entries(), 2);
        assert_eq!(runs.remaining(1, 0), 4);
        assert_eq!(runs.remaining(1, 2), 2);
        assert_eq!(runs.remaining(1, 4), 0);
        assert_eq!(runs.remaining(1, 6), 2);
        assert_eq!(runs.common_len(&text, 1, 5), 3);
        assert_eq!(runs.common_len(&text, 1, 4), 0);
    }

    #[test]
    fn rejects_malformed_input() {
        let config = BuildConfig::default();
        let mut ctx = BuildContext::new();
        assert_eq!(build_bwt(&[0], 1, &config, &mut ctx), Err(IndexError::SequenceTooShort { len: 1 }));
        assert_eq!(build_bwt(&[], 1, &config, &mut ctx), Err(IndexError::SequenceTooShort { len: 0 }));
        assert!(matches!(
            build_bwt(&[1, 2], 2, &config, &mut ctx),
            Err(IndexError::MalformedSequence { position: 1, .. })
        ));
        assert!(matches!(
            build_bwt(&[1, 0, 1, 0], 1, &config, &mut ctx),
            Err(IndexError::MalformedSequence { position: 1, .. })
        ));
        assert!(matches!(
            build_bwt(&[1, 3, 0], 2, &config, &mut ctx),
            Err(IndexError::MalformedSequence { position: 1, .. })
        ));
    }

    #[test]
    fn start_sequence_depth_is_bounded() {
        let text = vec![1u8; 64].into_iter().chain([SENTINEL]).collect::<Vec<_>>();
        let mut config = BuildConfig::new();
        config.rotation_buffer_capacity(1).max_start_sequence_len(3);
        let err = build(&text, &config).unwrap_err();
        assert!(matches!(err, IndexError::SequenceTooLarge { what: "start sequence length", .. }));
    }

    #[test]
    fn progress_covers_every_start_sequence() {
        let text = make_text(100, 4, 5);
        let mut seen = Vec::new();
        {
            let mut ctx = BuildContext::new().with_progress(|p| seen.push(p));
            build_bwt(&text, 4, &BuildConfig::default(), &mut ctx).unwrap();
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(seen.last().map(|p| (p.done, p.total)), Some((64, 64)));
    }

    #[test]
    fn cancellation_stops_build_and_releases_memory() {
        let text = make_text(500, 4, 9);
        let token = CancelToken::new();
        let memory = MemoryTracker::new();
        let trigger = token.clone();
        let result = {
            let mut ctx = BuildContext::new()
                .with_cancel_token(token)
                .with_memory_tracker(memory.clone())
                .with_progress(move |p| {
                    if p.done == 3 {
                        trigger.cancel();
                    }
                });
            build_bwt(&text, 4, &BuildConfig::default(), &mut ctx)
        };
        assert_eq!(result, Err(IndexError::Cancelled));
        assert_eq!(memory.current(), 0);
        assert!(memory.peak() > 0);
    }

    #[test]
    fn heap_sort_orders_and_polls() {
        let mut v: Vec<u32> = (0..1000u32).map(|i| (i * 7919) % 1000).collect();
        let mut polls = 0;
        heap_sort(&mut v, |a, b| a < b, || {
            polls += 1;
            Ok(())
        })
        .unwrap();
        assert!(v.windows(2).all(|w| w[0] <= w[1]));
        assert!(polls >= 1);
    }
}
