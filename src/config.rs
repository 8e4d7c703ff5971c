/// 索引构建参数。
///
/// 默认值按人类染色体规模的参考序列调优；测试中用很小的缓冲区
/// 强制走起始序列递归。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    rotation_buffer_capacity: usize,
    long_run_threshold: usize,
    long_run_probe_after: usize,
    max_start_sequence_len: usize,
    initial_start_sequence_len: Option<usize>,
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单个起始序列收集的旋转上限，超过后把前缀延长一位。至少为 1。
    pub fn rotation_buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.rotation_buffer_capacity = capacity.max(1);
        self
    }

    /// 记入长串表的单字符串最短长度
    pub fn long_run_threshold(&mut self, threshold: usize) -> &mut Self {
        self.long_run_threshold = threshold.max(2);
        self
    }

    /// 查长串表之前先逐个比较的相同字符数
    pub fn long_run_probe_after(&mut self, probe_after: usize) -> &mut Self {
        self.long_run_probe_after = probe_after;
        self
    }

    /// 起始序列递归的最大长度
    pub fn max_start_sequence_len(&mut self, max_len: usize) -> &mut Self {
        self.max_start_sequence_len = max_len.max(1);
        self
    }

    /// 固定初始起始序列长度，不再按字母表大小推导。
    pub fn initial_start_sequence_len(&mut self, len: usize) -> &mut Self {
        self.initial_start_sequence_len = Some(len.max(1));
        self
    }

    pub fn get_rotation_buffer_capacity(&self) -> usize {
        self.rotation_buffer_capacity
    }

    pub fn get_long_run_threshold(&self) -> usize {
        self.long_run_threshold
    }

    pub fn get_long_run_probe_after(&self) -> usize {
        self.long_run_probe_after
    }

    pub fn get_max_start_sequence_len(&self) -> usize {
        self.max_start_sequence_len
    }

    /// 字母表大小为 `alphabet_size` 时的初始起始序列长度：
    /// 不超过 10 个字符取 3，否则取 2；可被覆盖。
    pub fn start_sequence_len_for(&self, alphabet_size: usize) -> usize {
        let len = match self.initial_start_sequence_len {
            Some(len) => len,
            None if alphabet_size <= 10 => 3,
            None => 2,
        };
        len.min(self.max_start_sequence_len)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            rotation_buffer_capacity: 10_000_000,
            long_run_threshold: 100,
            long_run_probe_after: 10,
            max_start_sequence_len: 1000,
            initial_start_sequence_len: None,
        }
    }
}
