// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 光流结果队列 - 有界, 按源时间戳升序
//!
//! 工作线程与渲染线程之间唯一的共享可变状态。
//! - push:  线程安全插入, 超出容量时静默淘汰最旧的一项, 永不阻塞
//! - take:  阻塞取出时间戳最小的一项, 可被 interrupt 打断
//! - close: 唤醒所有等待者, 之后的 push 被丢弃

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// 一次光流估计 + 网格投影的结果
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResult {
    /// 光流对中前一帧的采集时间戳
    pub timestamp: u64,
    /// 交错 NDC 顶点 (x, y), 长度 2·W·H
    pub vertices: Vec<f32>,
    pub worker_id: usize,
    pub compute_ms: f64,
}

impl FlowResult {
    pub fn new(timestamp: u64, vertices: Vec<f32>) -> Self {
        Self {
            timestamp,
            vertices,
            worker_id: 0,
            compute_ms: 0.0,
        }
    }
}

/// 阻塞取出失败
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    #[error("等待光流结果时被中断")]
    Interrupted,
    #[error("光流队列已关闭")]
    Closed,
    #[error("等待光流结果超时")]
    Timeout,
}

/// 队列统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub evicted: u64,
    pub taken: u64,
}

struct QueueState {
    // (时间戳, 插入序号): 相同时间戳按插入顺序出队
    entries: BTreeMap<(u64, u64), FlowResult>,
    seq: u64,
    closed: bool,
    interrupt_pending: bool,
    stats: QueueStats,
}

/// 有界优先队列 (Mutex + Condvar)
pub struct FlowResultQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl FlowResultQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                entries: BTreeMap::new(),
                seq: 0,
                closed: false,
                interrupt_pending: false,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap()
    }

    /// 插入结果
    ///
    /// 插入后超出容量时移除时间戳最小的一项并返回 (可能就是刚插入的这项)。
    /// 队列已关闭时原样返回输入。
    pub fn push(&self, result: FlowResult) -> Option<FlowResult> {
        let mut state = self.lock();
        if state.closed {
            return Some(result);
        }

        let key = (result.timestamp, state.seq);
        state.seq += 1;
        state.entries.insert(key, result);
        state.stats.pushed += 1;

        let evicted = if state.entries.len() > self.capacity {
            state.stats.evicted += 1;
            state.entries.pop_first().map(|(_, old)| old)
        } else {
            None
        };
        drop(state);

        if let Some(old) = &evicted {
            debug!(timestamp = old.timestamp, "🗑️ 光流队列已满, 淘汰最旧结果");
        }
        self.available.notify_one();
        evicted
    }

    /// 阻塞取出时间戳最小的结果
    pub fn take(&self) -> Result<FlowResult, TakeError> {
        self.take_until(None)
    }

    /// 带超时的阻塞取出
    pub fn take_timeout(&self, timeout: Duration) -> Result<FlowResult, TakeError> {
        self.take_until(Some(Instant::now() + timeout))
    }

    fn take_until(&self, deadline: Option<Instant>) -> Result<FlowResult, TakeError> {
        let mut state = self.lock();
        loop {
            if state.interrupt_pending {
                state.interrupt_pending = false;
                return Err(TakeError::Interrupted);
            }
            if let Some((_, result)) = state.entries.pop_first() {
                state.stats.taken += 1;
                return Ok(result);
            }
            if state.closed {
                return Err(TakeError::Closed);
            }

            state = match deadline {
                None => self.available.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TakeError::Timeout);
                    }
                    self.available.wait_timeout(state, deadline - now).unwrap().0
                }
            };
        }
    }

    /// 非阻塞取出
    pub fn try_take(&self) -> Option<FlowResult> {
        let mut state = self.lock();
        let result = state.entries.pop_first().map(|(_, r)| r);
        if result.is_some() {
            state.stats.taken += 1;
        }
        result
    }

    /// 打断正在进行的阻塞取出, 一次性
    ///
    /// 没有取出在等待时中断会保留, 由下一次 `take`/`take_timeout` 消耗;
    /// `close` 会清除尚未消耗的中断。
    pub fn interrupt(&self) {
        self.lock().interrupt_pending = true;
        self.available.notify_all();
    }

    /// 关闭队列: 已有结果仍可取出, 之后不再接受插入
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.interrupt_pending = false;
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats
    }

    /// 当前排队结果的时间戳 (升序)
    pub fn timestamps(&self) -> Vec<u64> {
        self.lock().entries.keys().map(|&(ts, _)| ts).collect()
    }
}

impl Default for FlowResultQueue {
    fn default() -> Self {
        Self::new(crate::config::FLOW_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn result(ts: u64) -> FlowResult {
        FlowResult::new(ts, vec![ts as f32; 4])
    }

    #[test]
    fn take_returns_minimum_timestamp() {
        let queue = FlowResultQueue::new(8);
        for ts in [50, 10, 90, 30] {
            assert!(queue.push(result(ts)).is_none());
        }
        assert_eq!(queue.take().unwrap().timestamp, 10);
        assert_eq!(queue.take().unwrap().timestamp, 30);
        assert_eq!(queue.try_take().unwrap().timestamp, 50);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn ninth_insert_evicts_smallest_of_nine() {
        let queue = FlowResultQueue::new(8);
        for ts in [20, 30, 40, 50, 60, 70, 80, 90] {
            queue.push(result(ts));
        }
        // 新插入的是最小值: 被立即淘汰
        let evicted = queue.push(result(5)).unwrap();
        assert_eq!(evicted.timestamp, 5);
        assert_eq!(queue.len(), 8);

        let evicted = queue.push(result(100)).unwrap();
        assert_eq!(evicted.timestamp, 20);
        assert_eq!(queue.timestamps(), vec![30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(queue.stats().evicted, 2);
    }

    #[test]
    fn equal_timestamps_leave_in_insertion_order() {
        let queue = FlowResultQueue::new(4);
        let mut a = result(7);
        a.worker_id = 1;
        let mut b = result(7);
        b.worker_id = 2;
        queue.push(a);
        queue.push(b);
        assert_eq!(queue.take().unwrap().worker_id, 1);
        assert_eq!(queue.take().unwrap().worker_id, 2);
    }

    #[test]
    fn blocking_take_wakes_on_push() {
        let queue = Arc::new(FlowResultQueue::new(8));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(result(11));
            })
        };
        assert_eq!(queue.take().unwrap().timestamp, 11);
        producer.join().unwrap();
    }

    #[test]
    fn interrupt_cancels_waiting_take_once() {
        let queue = Arc::new(FlowResultQueue::new(8));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take())
        };
        thread::sleep(Duration::from_millis(20));
        queue.interrupt();
        assert_eq!(waiter.join().unwrap(), Err(TakeError::Interrupted));

        // 中断只生效一次
        queue.push(result(3));
        assert_eq!(queue.take().unwrap().timestamp, 3);
    }

    #[test]
    fn close_clears_pending_interrupt() {
        let queue = FlowResultQueue::new(4);
        queue.push(result(7));
        queue.interrupt();
        queue.close();
        assert_eq!(queue.take().unwrap().timestamp, 7);
        assert_eq!(queue.take(), Err(TakeError::Closed));
    }

    #[test]
    fn timeout_and_close() {
        let queue = FlowResultQueue::new(2);
        assert_eq!(
            queue.take_timeout(Duration::from_millis(10)),
            Err(TakeError::Timeout)
        );

        queue.push(result(1));
        queue.close();
        assert!(queue.push(result(2)).is_some());
        assert_eq!(queue.take().unwrap().timestamp, 1);
        assert_eq!(queue.take(), Err(TakeError::Closed));
        assert!(queue.try_take().is_none());
    }
}
