// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 环形帧缓冲 - 最近 N 帧的渲染目标, 每个槽位带采集时间戳
//!
//! 仅由渲染线程访问 (&mut self), 工作线程从不触碰渲染资源。

use anyhow::Result;

/// 环形缓冲中的一个槽位
#[derive(Debug)]
pub struct RingSlot<S> {
    pub target: S,
    /// 最近写入帧的采集时间戳, 未写入时为 0
    pub timestamp: u64,
}

/// 固定大小的环形帧缓冲
#[derive(Debug)]
pub struct FrameRing<S> {
    slots: Vec<RingSlot<S>>,
    write_index: usize,
}

impl<S> FrameRing<S> {
    /// 用 `make(i)` 创建 `size` 个槽位的渲染目标
    pub fn from_fn<F>(size: usize, mut make: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<S>,
    {
        anyhow::ensure!(size > 0, "环形缓冲槽位数不能为0");
        let slots = (0..size)
            .map(|i| {
                Ok(RingSlot {
                    target: make(i)?,
                    timestamp: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            slots,
            write_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 下一帧写入的槽位
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// 当前写入槽位的渲染目标, 时间戳保持不变直到 `commit`
    pub fn write_target(&mut self) -> (usize, &mut S) {
        let index = self.write_index;
        (index, &mut self.slots[index].target)
    }

    /// 写入成功后给当前写入槽位打上时间戳
    pub fn commit(&mut self, timestamp: u64) {
        self.slots[self.write_index].timestamp = timestamp;
    }

    /// 写指针前进一格 (轮转)
    pub fn advance(&mut self) {
        self.write_index = (self.write_index + 1) % self.slots.len();
    }

    pub fn slot(&self, index: usize) -> &RingSlot<S> {
        &self.slots[index]
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.slots.iter().map(|s| s.timestamp).collect()
    }

    /// 时间戳最接近 `timestamp` 的槽位
    pub fn nearest(&self, timestamp: u64) -> usize {
        nearest_timestamp(self.slots.iter().map(|s| s.timestamp), timestamp)
    }
}

/// 线性扫描求 |query - ts| 最小的下标
///
/// 初始基准为 |query| 与下标 0, 仅严格更小才替换: 平局取靠前的下标,
/// 时间戳为 0 的未写入槽位一旦有更近的真实槽位就不会被选中。
pub fn nearest_timestamp<I>(timestamps: I, query: u64) -> usize
where
    I: IntoIterator<Item = u64>,
{
    let mut best_index = 0;
    let mut best_diff = query;
    for (i, ts) in timestamps.into_iter().enumerate() {
        let diff = query.abs_diff(ts);
        if diff < best_diff {
            best_diff = diff;
            best_index = i;
        }
    }
    best_index
}
