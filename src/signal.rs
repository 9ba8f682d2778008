//! Owner-thread signal/slot plumbing.
//!
//! Callbacks registered on a [`Signal`] run only when the thread owning the
//! driver pumps [`dispatch`](crate::Elm327::dispatch); background threads
//! never invoke them directly.

/// Handle identifying a connected callback, used to disconnect it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(u64);

/// An ordered list of observer callbacks for one event kind.
pub struct Signal<T> {
    slots: Vec<(SlotId, Box<dyn FnMut(&T)>)>,
    next_id: u64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a callback; it stays connected until [`disconnect`] is called
    /// with the returned handle.
    ///
    /// [`disconnect`]: Signal::disconnect
    pub fn connect(&mut self, callback: impl FnMut(&T) + 'static) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.slots.push((id, Box::new(callback)));
        id
    }

    /// Remove a previously connected callback. Unknown handles are ignored.
    pub fn disconnect(&mut self, id: SlotId) {
        self.slots.retain(|(slot, _)| *slot != id);
    }

    /// Invoke every connected callback, in connection order.
    pub fn emit(&mut self, value: &T) {
        for (_, callback) in &mut self.slots {
            callback(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}
