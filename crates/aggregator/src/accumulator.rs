use barwatch_core::bar::entity::Bar;
use barwatch_core::common::PartitionKey;
use barwatch_core::schedule::port::TaskHandle;

/// # Summary
/// 正在累积中的时间桶。
///
/// # Invariants
/// - 至少折叠过一个值，因此 open/close/high/low 均有定义。
/// - `low <= open, close <= high`。
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBucket {
    // 桶起点
    pub start: i64,
    pub first: f64,
    pub last: f64,
    pub high: f64,
    pub low: f64,
}

impl OpenBucket {
    pub fn new(start: i64, value: f64) -> Self {
        Self {
            start,
            first: value,
            last: value,
            high: value,
            low: value,
        }
    }

    /// 折叠一个新值：first 不变，last 覆盖，high/low 取极值。
    pub fn fold(&mut self, value: f64) {
        self.last = value;
        if value > self.high {
            self.high = value;
        }
        if value < self.low {
            self.low = value;
        }
    }

    pub fn to_bar(&self, partition_key: Option<PartitionKey>) -> Bar {
        Bar {
            bucket_start: self.start,
            open: self.first,
            close: self.last,
            high: self.high,
            low: self.low,
            partition_key,
        }
    }
}

/// 已挂载的看门狗及其代号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedWatchdog {
    pub handle: TaskHandle,
    pub generation: u64,
}

/// # Summary
/// 单个分区独占的累积状态。
///
/// # Invariants
/// - 任意时刻至多一个打开的桶。
/// - `cutoff` 一旦设置只增不减。
/// - 至多一个挂起的看门狗。
#[derive(Debug, Default)]
pub struct AccumulatorState {
    pub open: Option<OpenBucket>,
    pub cutoff: Option<i64>,
    pub watchdog: Option<ArmedWatchdog>,
    pub previous: Option<Bar>,
    next_generation: u64,
}

impl AccumulatorState {
    /// # Summary
    /// 判断桶是否迟到。
    ///
    /// # Logic
    /// 1. 不晚于 cutoff 的桶已经发布过，迟到。
    /// 2. 早于当前打开桶的桶无法重新打开，同样视为迟到。
    pub fn is_late(&self, bucket_start: i64) -> bool {
        self.cutoff.is_some_and(|cutoff| bucket_start <= cutoff)
            || self
                .open
                .as_ref()
                .is_some_and(|open| bucket_start < open.start)
    }

    /// 分配下一个看门狗代号
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// # Summary
    /// 发布成功后的状态推进。
    ///
    /// # Logic
    /// 1. cutoff 推进到已发布桶的起点（取最大值保证单调）。
    /// 2. 清空打开的桶，记录 previous。
    /// 3. 取出挂起的看门狗交由调用方取消。
    pub fn commit_flush(&mut self, bar: Bar) -> Option<ArmedWatchdog> {
        let start = bar.bucket_start;
        self.cutoff = Some(self.cutoff.map_or(start, |c| c.max(start)));
        self.open = None;
        self.previous = Some(bar);
        self.watchdog.take()
    }
}
