//! Position-tracked binary min-heap for TTL deadlines.
//!
//! The heap coordinates positions while the owning records live elsewhere
//! (an arena in the keyspace). Every sift reports moved items through a
//! tracking callback so each owner keeps its slot field current, which is
//! what makes O(1) re-expire and delete possible.

/// One deadline paired with the arena id of its owning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapItem<R> {
    /// Deadline in monotonic milliseconds.
    pub expire_at: u64,
    /// Owning record, reported back through the tracking callback.
    pub owner: R,
}

/// Array-backed binary min-heap ordered by `expire_at`.
///
/// Equal deadlines are not tie-broken; items with the same deadline may pop
/// in any order.
#[derive(Debug, Default)]
pub struct MinHeap<R: Copy> {
    items: Vec<HeapItem<R>>,
}

impl<R: Copy> MinHeap<R> {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item with the smallest deadline, at position 0.
    #[must_use]
    pub fn peek(&self) -> Option<&HeapItem<R>> {
        self.items.first()
    }

    /// The item at `pos`, if any.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<&HeapItem<R>> {
        self.items.get(pos)
    }

    /// Inserts a new item (`pos` = `None`) or replaces the item at `pos`,
    /// then restores heap order. Every item that ends up on a new position
    /// is reported through `track`, the placed item included.
    pub fn upsert(
        &mut self,
        pos: Option<usize>,
        item: HeapItem<R>,
        track: &mut impl FnMut(R, usize),
    ) {
        let pos = match pos {
            Some(pos) if pos < self.items.len() => {
                self.items[pos] = item;
                pos
            }
            _ => {
                self.items.push(item);
                self.items.len() - 1
            }
        };
        self.restore(pos, track);
    }

    /// Removes the item at `pos`; the last item takes its place and is
    /// sifted to a valid position. The removed item is not tracked — the
    /// caller clears its owner's slot field.
    pub fn remove(&mut self, pos: usize, track: &mut impl FnMut(R, usize)) {
        debug_assert!(pos < self.items.len());
        let last = self.items.len() - 1;
        self.items.swap(pos, last);
        self.items.pop();
        if pos < self.items.len() {
            self.restore(pos, track);
        }
    }

    fn restore(&mut self, pos: usize, track: &mut impl FnMut(R, usize)) {
        if pos > 0 && self.items[pos].expire_at < self.items[parent(pos)].expire_at {
            self.sift_up(pos, track);
        } else {
            self.sift_down(pos, track);
        }
    }

    fn sift_up(&mut self, mut pos: usize, track: &mut impl FnMut(R, usize)) {
        while pos > 0 {
            let up = parent(pos);
            if self.items[up].expire_at <= self.items[pos].expire_at {
                break;
            }
            self.items.swap(pos, up);
            track(self.items[pos].owner, pos);
            pos = up;
        }
        track(self.items[pos].owner, pos);
    }

    fn sift_down(&mut self, mut pos: usize, track: &mut impl FnMut(R, usize)) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.items.len()
                && self.items[left].expire_at < self.items[smallest].expire_at
            {
                smallest = left;
            }
            if right < self.items.len()
                && self.items[right].expire_at < self.items[smallest].expire_at
            {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.items.swap(pos, smallest);
            track(self.items[pos].owner, pos);
            pos = smallest;
        }
        track(self.items[pos].owner, pos);
    }
}

fn parent(pos: usize) -> usize {
    (pos - 1) / 2
}

#[cfg(test)]
mod tests {
    use super::{HeapItem, MinHeap};
    use googletest::prelude::*;
    use rstest::rstest;

    // Shadow slot table standing in for the keyspace arena: slots[owner]
    // must equal the item's heap position after every mutation.
    fn check_slots(heap: &MinHeap<usize>, slots: &[Option<usize>]) {
        for (owner, slot) in slots.iter().enumerate() {
            let Some(pos) = slot else { continue };
            let item = heap.get(*pos).expect("tracked slot must be in range");
            assert_that!(item.owner, eq(owner));
        }
    }

    fn check_heap_order(heap: &MinHeap<usize>) {
        for pos in 1..heap.len() {
            let child = heap.get(pos).expect("child must exist");
            let parent = heap.get((pos - 1) / 2).expect("parent must exist");
            assert_that!(parent.expire_at <= child.expire_at, eq(true));
        }
    }

    #[rstest]
    fn owners_observe_their_positions_after_every_mutation() {
        let mut heap = MinHeap::new();
        let deadlines = [900_u64, 100, 500, 300, 700, 200, 800, 400, 600];
        let mut slots: Vec<Option<usize>> = vec![None; deadlines.len()];

        for (owner, expire_at) in deadlines.iter().enumerate() {
            let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
            heap.upsert(
                None,
                HeapItem {
                    expire_at: *expire_at,
                    owner,
                },
                &mut track,
            );
        }
        check_slots(&heap, &slots);
        check_heap_order(&heap);

        // Re-arm owner 0 with the smallest deadline; it must sift to the top.
        let pos = slots[0];
        let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
        heap.upsert(
            pos,
            HeapItem {
                expire_at: 50,
                owner: 0,
            },
            &mut track,
        );
        check_slots(&heap, &slots);
        check_heap_order(&heap);
        assert_that!(heap.peek().map(|item| item.owner), eq(Some(0_usize)));

        // Remove an interior item; the relocated tail must be re-tracked.
        let victim = slots[4].expect("owner 4 must be queued");
        slots[4] = None;
        let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
        heap.remove(victim, &mut track);
        check_slots(&heap, &slots);
        check_heap_order(&heap);
        assert_that!(heap.len(), eq(deadlines.len() - 1));
    }

    #[rstest]
    fn popping_the_minimum_yields_ascending_deadlines() {
        let mut heap = MinHeap::new();
        let deadlines = [40_u64, 10, 30, 20, 50];
        let mut slots: Vec<Option<usize>> = vec![None; deadlines.len()];
        for (owner, expire_at) in deadlines.iter().enumerate() {
            let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
            heap.upsert(
                None,
                HeapItem {
                    expire_at: *expire_at,
                    owner,
                },
                &mut track,
            );
        }

        let mut popped = Vec::new();
        while let Some(item) = heap.peek().copied() {
            popped.push(item.expire_at);
            slots[item.owner] = None;
            let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
            heap.remove(0, &mut track);
            check_slots(&heap, &slots);
        }
        assert_that!(&popped, eq(&vec![10_u64, 20, 30, 40, 50]));
    }

    #[rstest]
    fn removing_the_last_item_needs_no_sift() {
        let mut heap = MinHeap::new();
        let mut slots: Vec<Option<usize>> = vec![None; 2];
        for owner in 0..2_usize {
            let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
            heap.upsert(
                None,
                HeapItem {
                    expire_at: owner as u64 + 1,
                    owner,
                },
                &mut track,
            );
        }
        let tail = slots[1].expect("owner 1 must be queued");
        slots[1] = None;
        let mut track = |owner: usize, pos: usize| slots[owner] = Some(pos);
        heap.remove(tail, &mut track);
        assert_that!(heap.len(), eq(1_usize));
        check_slots(&heap, &slots);
    }
}
