/// # Summary
/// 固定容量的滚动环形缓冲区，保存分区最近 N 根已发布的 Bar。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - 始终保持最近 N 个元素，插入顺序即时间顺序。
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    // 内部存储容器
    data: Vec<T>,
    // 最大容量，至少为 1
    capacity: usize,
    // 已满时下一个覆盖位置
    cursor: usize,
}

impl<T: Clone> RollingBuffer<T> {
    /// # Summary
    /// 创建一个新的滚动缓冲区。
    ///
    /// # Arguments
    /// * `capacity`: 固定容量上限，为 0 时按 1 处理。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// # Summary
    /// 推入新元素。
    ///
    /// # Logic
    /// 1. 未满时直接 push。
    /// 2. 已满时覆盖 cursor 处的最旧元素，并递增（取模）cursor。
    pub fn push(&mut self, item: T) {
        if self.data.len() < self.capacity {
            self.data.push(item);
        } else if let Some(slot) = self.data.get_mut(self.cursor) {
            *slot = item;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    /// # Summary
    /// 原地替换最新元素；为空时等同于 push。
    ///
    /// # Logic
    /// 用于同一个桶被重复发布（重试）的场景，避免历史里出现重复记录。
    pub fn replace_last(&mut self, item: T) {
        match self.last_index() {
            Some(idx) => {
                if let Some(slot) = self.data.get_mut(idx) {
                    *slot = item;
                }
            }
            None => self.push(item),
        }
    }

    /// 最新插入的元素
    pub fn last(&self) -> Option<&T> {
        self.last_index().and_then(|idx| self.data.get(idx))
    }

    /// # Summary
    /// 按插入顺序返回全部元素。
    ///
    /// # Logic
    /// 已满时从 cursor 处切割并重组两段数据。
    pub fn to_vec(&self) -> Vec<T> {
        if self.data.len() < self.capacity {
            self.data.clone()
        } else {
            let mut result = Vec::with_capacity(self.capacity);
            result.extend(self.data[self.cursor..].iter().cloned());
            result.extend(self.data[..self.cursor].iter().cloned());
            result
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn last_index(&self) -> Option<usize> {
        if self.data.is_empty() {
            None
        } else if self.data.len() < self.capacity {
            Some(self.data.len() - 1)
        } else if self.cursor == 0 {
            Some(self.capacity - 1)
        } else {
            Some(self.cursor - 1)
        }
    }
}
