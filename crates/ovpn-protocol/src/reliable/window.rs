//! Sliding message window indexed by message id.
//!
//! Ids are compared with serial-number arithmetic, so a window that runs
//! past `u32::MAX` keeps working after the counter wraps.

use std::collections::VecDeque;

use super::Id;

#[derive(Debug, Clone)]
enum Slot<M> {
    /// Allocated but nothing stored yet
    Empty,
    Filled(M),
    /// Released, waiting for the head to slide past it
    Erased,
}

/// Deque of messages covering `[head_id, head_id + span)`
#[derive(Debug, Clone)]
pub struct MessageWindow<M> {
    head_id: Id,
    span: Id,
    slots: VecDeque<Slot<M>>,
}

impl<M> MessageWindow<M> {
    pub fn new(span: Id, start_id: Id) -> Self {
        assert!(span > 0, "message window span must be at least 1");
        MessageWindow {
            head_id: start_id,
            span,
            slots: VecDeque::with_capacity(span as usize),
        }
    }

    /// True if `id` falls inside `[head_id, head_id + span)`
    #[inline]
    pub fn in_window(&self, id: Id) -> bool {
        id.wrapping_sub(self.head_id) < self.span
    }

    /// True if `id` is behind the window, i.e. already released
    #[inline]
    pub fn pre_window(&self, id: Id) -> bool {
        let distance = self.head_id.wrapping_sub(id);
        distance != 0 && distance <= Id::MAX / 2
    }

    /// True if the head slot holds a message
    pub fn head_defined(&self) -> bool {
        matches!(self.slots.front(), Some(Slot::Filled(_)))
    }

    pub fn ref_head(&mut self) -> Option<&mut M> {
        match self.slots.front_mut() {
            Some(Slot::Filled(m)) => Some(m),
            _ => None,
        }
    }

    /// Message stored at `id`, allocating empty slots up to it.
    ///
    /// Panics if `id` is not in the window.
    pub fn ref_by_id(&mut self, id: Id) -> Option<&mut M> {
        let index = self.grow_to(id);
        match &mut self.slots[index] {
            Slot::Filled(m) => Some(m),
            _ => None,
        }
    }

    /// Store `m` at `id`, replacing whatever the slot held.
    ///
    /// Panics if `id` is not in the window.
    pub fn insert(&mut self, id: Id, m: M) -> &mut M {
        let index = self.grow_to(id);
        let slot = &mut self.slots[index];
        *slot = Slot::Filled(m);
        match slot {
            Slot::Filled(m) => m,
            _ => unreachable!(),
        }
    }

    pub fn get(&self, id: Id) -> Option<&M> {
        if !self.in_window(id) {
            return None;
        }
        match self.slots.get(id.wrapping_sub(self.head_id) as usize) {
            Some(Slot::Filled(m)) => Some(m),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut M> {
        if !self.in_window(id) {
            return None;
        }
        match self.slots.get_mut(id.wrapping_sub(self.head_id) as usize) {
            Some(Slot::Filled(m)) => Some(m),
            _ => None,
        }
    }

    /// Release the message at `id`; the head slides past any released
    /// prefix. Returns the message if one was stored there.
    pub fn rm_by_id(&mut self, id: Id) -> Option<M> {
        if !self.in_window(id) {
            return None;
        }
        let index = id.wrapping_sub(self.head_id) as usize;
        let removed = match self.slots.get_mut(index) {
            Some(slot) if matches!(slot, Slot::Filled(_)) => match std::mem::replace(slot, Slot::Erased) {
                Slot::Filled(m) => Some(m),
                _ => None,
            },
            _ => None,
        };
        self.purge();
        removed
    }

    /// Drop the head slot whatever its state and advance by one
    pub fn rm_head_nocheck(&mut self) -> Option<M> {
        let head = self.slots.pop_front();
        self.head_id = self.head_id.wrapping_add(1);
        match head {
            Some(Slot::Filled(m)) => Some(m),
            _ => None,
        }
    }

    #[inline]
    pub fn head_id(&self) -> Id {
        self.head_id
    }

    /// One past the last allocated slot
    #[inline]
    pub fn tail_id(&self) -> Id {
        self.head_id.wrapping_add(self.slots.len() as Id)
    }

    #[inline]
    pub fn span(&self) -> Id {
        self.span
    }

    /// Stored messages, head first
    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Filled(m) => Some(m),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut M> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Filled(m) => Some(m),
            _ => None,
        })
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn grow_to(&mut self, id: Id) -> usize {
        let index = self.index_of(id);
        while self.slots.len() <= index {
            self.slots.push_back(Slot::Empty);
        }
        index
    }

    fn index_of(&self, id: Id) -> usize {
        assert!(
            self.in_window(id),
            "message id {} outside window [{}, +{})",
            id,
            self.head_id,
            self.span
        );
        id.wrapping_sub(self.head_id) as usize
    }

    fn purge(&mut self) {
        while matches!(self.slots.front(), Some(Slot::Erased)) {
            self.slots.pop_front();
            self.head_id = self.head_id.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let window: MessageWindow<u8> = MessageWindow::new(4, 10);
        assert!(window.in_window(10));
        assert!(window.in_window(13));
        assert!(!window.in_window(14));
        assert!(window.pre_window(9));
        assert!(!window.pre_window(10));
        assert!(!window.pre_window(14));
    }

    #[test]
    fn test_bounds_across_wrap() {
        let window: MessageWindow<u8> = MessageWindow::new(4, u32::MAX - 1);
        assert!(window.in_window(u32::MAX));
        assert!(window.in_window(0));
        assert!(window.in_window(1));
        assert!(!window.in_window(2));
        assert!(window.pre_window(u32::MAX - 2));
    }

    #[test]
    fn test_purge_slides_only_over_released() {
        let mut window = MessageWindow::new(4, 0);
        window.insert(0, 'a');
        window.insert(1, 'b');
        window.insert(2, 'c');

        assert_eq!(window.rm_by_id(1), Some('b'));
        assert_eq!(window.head_id(), 0);
        assert_eq!(window.rm_by_id(0), Some('a'));
        assert_eq!(window.head_id(), 2);
        assert_eq!(window.tail_id(), 3);
        assert!(window.head_defined());
    }

    #[test]
    fn test_gap_blocks_head() {
        let mut window = MessageWindow::new(4, 0);
        window.insert(2, 'c');
        assert!(!window.head_defined());
        assert_eq!(window.tail_id(), 3);
        assert!(window.ref_by_id(1).is_none());

        window.insert(0, 'a');
        assert_eq!(window.rm_head_nocheck(), Some('a'));
        assert!(!window.head_defined());
        assert_eq!(window.head_id(), 1);
        assert_eq!(window.len(), 1);
    }

    #[test]
    #[should_panic(expected = "outside window")]
    fn test_ref_out_of_window_panics() {
        let mut window: MessageWindow<u8> = MessageWindow::new(2, 0);
        window.ref_by_id(2);
    }
}
