use super::{CompressedPoint, DataPoint, Timestamp};

/// Physically drop the skipped prefix once the head passes this many slots
/// *and* more than half of the backing vector is dead.
pub const COMPACT_MIN_HEAD: usize = 512;

pub trait Timestamped {
    fn timestamp(&self) -> Timestamp;
}

impl Timestamped for DataPoint {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Timestamped for CompressedPoint {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Append-only buffer with a lazy logical start.
///
/// Eviction only moves `head`; the backing `Vec` is compacted when the dead
/// prefix dominates it. Items must be pushed in non-decreasing timestamp order.
#[derive(Debug, Clone)]
pub struct WindowBuffer<T> {
    items: Vec<T>,
    head: usize,
}

impl<T: Timestamped> WindowBuffer<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            head: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Skip every live item with `timestamp <= cutoff`.
    /// Returns how many items were evicted.
    pub fn evict_through(&mut self, cutoff: Timestamp) -> usize {
        let start = self.head;
        while self.head < self.items.len() && self.items[self.head].timestamp() <= cutoff {
            self.head += 1;
        }
        let evicted = self.head - start;
        if self.head > COMPACT_MIN_HEAD && self.head > self.items.len() / 2 {
            self.items.drain(..self.head);
            self.head = 0;
        }
        evicted
    }

    /// Live items, oldest first.
    pub fn live(&self) -> &[T] {
        &self.items[self.head..]
    }

    /// Live items with `after < timestamp <= through`.
    pub fn range(&self, after: Timestamp, through: Option<Timestamp>) -> &[T] {
        let live = self.live();
        let start = live.partition_point(|item| item.timestamp() <= after);
        let end = match through {
            Some(through) => live.partition_point(|item| item.timestamp() <= through),
            None => live.len(),
        };
        &live[start..end.max(start)]
    }

    pub fn len(&self) -> usize {
        self.items.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots held by the backing vector, dead prefix included.
    pub fn backing_len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }
}

impl<T: Timestamped> Default for WindowBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_with(timestamps: impl IntoIterator<Item = Timestamp>) -> WindowBuffer<DataPoint> {
        let mut buf = WindowBuffer::new();
        for t in timestamps {
            buf.push(DataPoint::new(0.0, 0.0, t));
        }
        buf
    }

    #[test]
    fn eviction_is_inclusive_of_cutoff() {
        let mut buf = buf_with([10, 20, 30, 40]);
        assert_eq!(buf.evict_through(20), 2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.live()[0].timestamp, 30);
        // Nothing left at or before the cutoff.
        assert_eq!(buf.evict_through(20), 0);
    }

    #[test]
    fn head_advances_lazily_then_compacts() {
        let mut buf = buf_with(0..2_000);
        buf.evict_through(400);
        // 401 skipped: under the threshold, nothing reallocated.
        assert_eq!(buf.backing_len(), 2_000);
        assert_eq!(buf.len(), 1_599);

        buf.evict_through(1_200);
        // head 1201 > 512 and > 1000: prefix dropped.
        assert_eq!(buf.backing_len(), 799);
        assert_eq!(buf.len(), 799);
        assert_eq!(buf.live()[0].timestamp, 1_201);
    }

    #[test]
    fn range_is_half_open_on_the_left() {
        let buf = buf_with([10, 20, 30, 40, 50]);
        let ts: Vec<_> = buf.range(20, Some(40)).iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![30, 40]);
        let ts: Vec<_> = buf.range(20, None).iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![30, 40, 50]);
        assert!(buf.range(40, Some(20)).is_empty());
    }

    #[test]
    fn clear_resets_head() {
        let mut buf = buf_with([1, 2, 3]);
        buf.evict_through(1);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.backing_len(), 0);
    }
}
