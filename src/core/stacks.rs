//! Interned stack traces referenced by allocation records.

use std::collections::HashMap;

use crate::core::tls::UntrackedScope;
use crate::debug::backtrace::{capture_frames, resolve_frames};
use crate::sync::mutex::Mutex;

/// Identifiers are `u32`; `u32::MAX` is reserved as the "none" sentinel of
/// the profile format.
const MAX_STACKS: usize = (u32::MAX - 1) as usize;

#[derive(Default)]
struct StackTableInner {
    index: HashMap<Vec<usize>, u32>,
    stacks: Vec<Vec<usize>>,
}

/// Deduplicating table of raw stack traces.
#[derive(Default)]
pub(crate) struct StackTable {
    inner: Mutex<StackTableInner>,
}

impl StackTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Capture the current call stack and intern it.
    pub(crate) fn capture(&self, max_frames: usize) -> Option<u32> {
        let _untracked = UntrackedScope::new();
        let frames = capture_frames(max_frames);
        if frames.is_empty() {
            return None;
        }
        self.intern(frames)
    }

    /// Intern a frame list, returning its identifier.
    pub(crate) fn intern(&self, frames: Vec<usize>) -> Option<u32> {
        let _untracked = UntrackedScope::new();
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.index.get(&frames) {
            return Some(id);
        }
        if inner.stacks.len() >= MAX_STACKS {
            return None;
        }
        let id = inner.stacks.len() as u32;
        inner.stacks.push(frames.clone());
        inner.index.insert(frames, id);
        Some(id)
    }

    /// Human readable form of stack `id`.
    ///
    /// Frames are copied out first so symbolization runs without the lock.
    pub(crate) fn resolve(&self, id: u32) -> Option<String> {
        let _untracked = UntrackedScope::new();
        let frames = self.inner.lock().stacks.get(id as usize).cloned()?;
        Some(resolve_frames(&frames))
    }

    /// Number of distinct stacks.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().stacks.len()
    }
}
