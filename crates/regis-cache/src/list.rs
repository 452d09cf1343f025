/// Doubly linked recency list stored in a slot arena.
///
/// Nodes are addressed by slot index; freed slots are recycled. The head is
/// the most recently used entry and the tail the least.
pub(crate) struct LinkedArena<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<T> LinkedArena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx)?.as_ref().map(|n| &n.value)
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx)?.as_mut().map(|n| &mut n.value)
    }

    /// Insert at the head and return the slot index.
    pub(crate) fn push_front(&mut self, value: T) -> usize {
        let node = Node {
            value,
            prev: None,
            next: self.head,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        if let Some(old_head) = self.head {
            if let Some(n) = self.slots[old_head].as_mut() {
                n.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        self.len += 1;
        idx
    }

    /// Unlink the node at `idx` and release its slot.
    pub(crate) fn remove(&mut self, idx: usize) -> Option<T> {
        let node = self.slots.get_mut(idx)?.take()?;
        self.link_around(node.prev, node.next);
        self.free.push(idx);
        self.len -= 1;
        Some(node.value)
    }

    pub(crate) fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        let (prev, next) = match self.slots.get(idx).and_then(|s| s.as_ref()) {
            Some(n) => (n.prev, n.next),
            None => return,
        };
        self.link_around(prev, next);
        let old_head = self.head;
        if let Some(n) = self.slots[idx].as_mut() {
            n.prev = None;
            n.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(n) = self.slots[h].as_mut() {
                n.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Values from most to least recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.slots[cursor?].as_ref()?;
            cursor = node.next;
            Some(&node.value)
        })
    }

    // Join `prev` and `next` to each other, fixing head/tail.
    fn link_around(&mut self, prev: Option<usize>, next: Option<usize>) {
        match prev {
            Some(p) => {
                if let Some(n) = self.slots[p].as_mut() {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.slots[nx].as_mut() {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}
