//! 长时间构建过程中的取消、进度与内存统计。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{IndexError, Result};

/// 共享的取消标志，克隆到任何可能中止构建的线程。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 粗粒度进度：已完成的起始序列数 / 总数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
struct Counters {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// 构建期临时缓冲区的字节统计。
///
/// 每个缓冲区都通过 [`MemoryTracker::reserve`] 登记，返回的 [`Reservation`]
/// 在释放时归还字节数，中止的构建因此总会回到 0。
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker(Arc<Counters>);

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, bytes: usize) -> Reservation {
        let now = self.0.current.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.0.peak.fetch_max(now, Ordering::Relaxed);
        Reservation { counters: Arc::clone(&self.0), bytes }
    }

    /// 当前仍被持有的字节数
    pub fn current(&self) -> usize {
        self.0.current.load(Ordering::Relaxed)
    }

    /// `current` 曾达到的最大值
    pub fn peak(&self) -> usize {
        self.0.peak.load(Ordering::Relaxed)
    }
}

/// [`MemoryTracker::reserve`] 返回的守卫
#[derive(Debug)]
pub struct Reservation {
    counters: Arc<Counters>,
    bytes: usize,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.counters.current.fetch_sub(self.bytes, Ordering::Relaxed);
    }
}

/// 构建过程除数据外需要调用方提供的全部上下文。
pub struct BuildContext<'a> {
    cancel: CancelToken,
    progress: Option<Box<dyn FnMut(Progress) + 'a>>,
    memory: MemoryTracker,
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_progress", &self.progress.is_some())
            .field("memory_current", &self.memory.current())
            .finish()
    }
}

impl Default for BuildContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BuildContext<'a> {
    pub fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            progress: None,
            memory: MemoryTracker::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, sink: impl FnMut(Progress) + 'a) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn with_memory_tracker(mut self, memory: MemoryTracker) -> Self {
        self.memory = memory;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    /// 取消标志已置位时返回 `Cancelled`。
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        Ok(())
    }

    pub fn report_progress(&mut self, done: usize, total: usize) {
        if let Some(sink) = self.progress.as_mut() {
            sink(Progress { done, total });
        }
    }
}
