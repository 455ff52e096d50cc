use std::collections::HashMap;
use wasm_bindgen::JsCast;

/// Something that can stop a scheduled callback from firing.
pub(crate) trait TimerHandle {
    fn cancel(self);
}

/// `window.setTimeout` id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BrowserTimer(i32);

impl TimerHandle for BrowserTimer {
    fn cancel(self) {
        if let Some(win) = web_sys::window() {
            win.clear_timeout_with_handle(self.0);
        }
    }
}

impl BrowserTimer {
    /// Schedules `f` once after `delay_ms`. `None` when there is no window.
    pub fn schedule(delay_ms: i32, f: impl FnOnce() + 'static) -> Option<Self> {
        let win = web_sys::window()?;
        let cb = wasm_bindgen::closure::Closure::once_into_js(f);
        win.set_timeout_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), delay_ms)
            .ok()
            .map(BrowserTimer)
    }
}

/// One pending timer per field name. Rescheduling cancels, never stacks.
#[derive(Debug)]
pub(crate) struct Debouncer<H: TimerHandle> {
    pending: HashMap<String, H>,
}

impl<H: TimerHandle> Default for Debouncer<H> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<H: TimerHandle> Debouncer<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the field's pending timer and stores the new one.
    pub fn schedule(&mut self, field: &str, handle: H) {
        if let Some(prev) = self.pending.insert(field.to_string(), handle) {
            prev.cancel();
        }
    }

    pub fn cancel(&mut self, field: &str) {
        if let Some(h) = self.pending.remove(field) {
            h.cancel();
        }
    }

    /// Called by the fired callback so the entry doesn't linger.
    pub fn fired(&mut self, field: &str) {
        self.pending.remove(field);
    }

    pub fn cancel_all(&mut self) {
        for (_, h) in self.pending.drain() {
            h.cancel();
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, field: &str) -> bool {
        self.pending.contains_key(field)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
