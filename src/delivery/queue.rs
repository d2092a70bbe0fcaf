//! 发送队列 - 断线期间暂存已编码的 envelope
//!
//! 有界 FIFO：满了以后丢弃最旧的一条，永不阻塞，也不会无限增长。

use std::collections::VecDeque;

use tracing::debug;

use crate::notification::Envelope;

/// 有界发送队列
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<Envelope>,
    capacity: usize,
}

impl OutboundQueue {
    /// 创建队列，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// 追加到队尾，队列已满时先丢弃队头，返回被丢弃的 envelope
    pub fn push(&mut self, envelope: Envelope) -> Option<Envelope> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        if evicted.is_some() {
            debug!(capacity = self.capacity, "Outbound queue full, dropped oldest envelope");
        }
        self.items.push_back(envelope);
        evicted
    }

    /// 依次把队头交给 `send`，返回 false 表示连接不可用，停止并保留剩余条目
    ///
    /// 返回成功发送的条数。
    pub fn drain_into<F>(&mut self, mut send: F) -> usize
    where
        F: FnMut(&Envelope) -> bool,
    {
        let mut sent = 0;
        while let Some(head) = self.items.front() {
            if !send(head) {
                break;
            }
            self.items.pop_front();
            sent += 1;
        }
        sent
    }

    /// 修改容量，缩小时丢弃最旧的条目，返回丢弃数量
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        let mut dropped = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{encode, PayloadBuilder};

    fn envelope(title: &str) -> Envelope {
        let record = PayloadBuilder::new().build(title, "body", 1000, None, "body");
        encode(&record, "test")
    }

    fn titles(queue: &OutboundQueue) -> Vec<String> {
        queue
            .iter()
            .map(|e| {
                let v: serde_json::Value = serde_json::from_str(e.json_data()).unwrap();
                v["title"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_push_preserves_order() {
        let mut queue = OutboundQueue::new(10);
        for t in ["a", "b", "c"] {
            assert!(queue.push(envelope(t)).is_none());
        }
        assert_eq!(titles(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = OutboundQueue::new(3);
        for t in ["a", "b", "c"] {
            queue.push(envelope(t));
        }
        let evicted = queue.push(envelope("d")).unwrap();
        assert_eq!(evicted, envelope("a"));
        assert_eq!(queue.len(), 3);
        assert_eq!(titles(&queue), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut queue = OutboundQueue::new(200);
        for i in 0..500 {
            queue.push(envelope(&i.to_string()));
            assert!(queue.len() <= 200);
        }
        let kept = titles(&queue);
        assert_eq!(kept.first().map(String::as_str), Some("300"));
        assert_eq!(kept.last().map(String::as_str), Some("499"));
    }

    #[test]
    fn test_drain_all() {
        let mut queue = OutboundQueue::new(10);
        for t in ["a", "b", "c"] {
            queue.push(envelope(t));
        }
        let mut seen = Vec::new();
        let sent = queue.drain_into(|e| {
            seen.push(e.clone());
            true
        });
        assert_eq!(sent, 3);
        assert!(queue.is_empty());
        assert_eq!(seen, vec![envelope("a"), envelope("b"), envelope("c")]);
    }

    #[test]
    fn test_drain_stops_when_connection_unusable() {
        let mut queue = OutboundQueue::new(10);
        for t in ["a", "b", "c", "d"] {
            queue.push(envelope(t));
        }
        let mut budget = 2;
        let sent = queue.drain_into(|_| {
            if budget == 0 {
                return false;
            }
            budget -= 1;
            true
        });
        assert_eq!(sent, 2);
        assert_eq!(titles(&queue), vec!["c", "d"]);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let mut queue = OutboundQueue::new(0);
        queue.push(envelope("a"));
        queue.push(envelope("b"));
        assert_eq!(titles(&queue), vec!["b"]);
    }

    #[test]
    fn test_shrink_capacity() {
        let mut queue = OutboundQueue::new(5);
        for t in ["a", "b", "c", "d"] {
            queue.push(envelope(t));
        }
        assert_eq!(queue.set_capacity(2), 2);
        assert_eq!(titles(&queue), vec!["c", "d"]);
    }
}
