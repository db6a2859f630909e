//! Call frame stack
//!
//! Index 0 always holds the global frame and can never be popped. Regions
//! that push frames record [`CallFrameStack::depth`] on entry and restore it
//! with [`CallFrameStack::pop_automatic_to`] on every exit path.

use tracing::debug;

use super::{FrameArena, FrameFlags, FrameId};
use crate::error::EngineError;
use crate::namespaces::{NamespaceId, NamespaceTree};

/// One slot of the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    pub frame: FrameId,
    /// Pushed implicitly by an operation rather than by `scope open`
    pub automatic: bool,
    /// The stack owns the frame and frees it when the entry is popped
    pub owned: bool,
}

#[derive(Debug)]
pub struct CallFrameStack {
    entries: Vec<StackEntry>,
}

impl CallFrameStack {
    pub fn new(global: FrameId) -> Self {
        Self {
            entries: vec![StackEntry {
                frame: global,
                automatic: false,
                owned: false,
            }],
        }
    }

    /* ===================== Push / Pop ===================== */

    /// Push a frame explicitly (e.g. `scope open`)
    pub fn push(&mut self, frame: FrameId) {
        self.entries.push(StackEntry {
            frame,
            automatic: false,
            owned: false,
        });
    }

    /// Push a frame owned elsewhere as an automatic entry
    pub fn push_automatic(&mut self, frame: FrameId) {
        self.entries.push(StackEntry {
            frame,
            automatic: true,
            owned: false,
        });
    }

    /// Push a transient frame; it is freed when popped
    pub fn push_transient(&mut self, frame: FrameId) {
        self.entries.push(StackEntry {
            frame,
            automatic: true,
            owned: true,
        });
    }

    pub fn pop(&mut self, frames: &mut FrameArena) -> Result<FrameId, EngineError> {
        if self.entries.len() <= 1 {
            return Err(EngineError::EmptyStack);
        }
        let entry = self.entries.pop().ok_or(EngineError::EmptyStack)?;
        release(entry, frames);
        Ok(entry.frame)
    }

    /// Pop until the depth equals `mark`
    ///
    /// Never pops below `mark` or the global frame, so it is safe to call when
    /// an inner handler already unwound some or all of the frames. Returns
    /// the last frame popped.
    pub fn pop_automatic_to(&mut self, mark: usize, frames: &mut FrameArena) -> Option<FrameId> {
        let mark = mark.max(1);
        let mut last = None;
        while self.entries.len() > mark {
            let Some(entry) = self.entries.pop() else {
                break;
            };
            if !entry.automatic {
                debug!(frame = ?entry.frame, "closing explicitly opened frame during unwind");
            }
            release(entry, frames);
            last = Some(entry.frame);
        }
        last
    }

    /// Indices of explicitly opened scope frames that can be closed, topmost
    /// first
    ///
    /// Only entries above the last automatic entry qualify; anything below
    /// belongs to an enclosing region that will unwind it.
    pub fn closable_scopes(&self, frames: &FrameArena) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .take_while(|(_, entry)| !entry.automatic)
            .filter(|(_, entry)| frames.get(entry.frame).is_some_and(|frame| frame.is_scope()))
            .map(|(index, _)| index)
            .collect()
    }

    /// Remove the explicit entry at `index`
    pub fn close_at(&mut self, index: usize, frames: &mut FrameArena) -> Result<FrameId, EngineError> {
        if index == 0 || index >= self.entries.len() {
            return Err(EngineError::EmptyStack);
        }
        let entry = self.entries.remove(index);
        release(entry, frames);
        Ok(entry.frame)
    }

    /* ===================== Queries ===================== */

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&StackEntry> {
        self.entries.get(index)
    }

    pub fn peek(&self) -> FrameId {
        self.entries[self.entries.len() - 1].frame
    }

    pub fn global(&self) -> FrameId {
        self.entries[0].frame
    }

    /// Entries from the top of the stack down to the global frame
    pub fn iter_top_down(&self) -> impl Iterator<Item = &StackEntry> {
        self.entries.iter().rev()
    }

    pub fn contains(&self, frame: FrameId) -> bool {
        self.entries.iter().any(|entry| entry.frame == frame)
    }

    /// Frame that variable reads and writes go to
    ///
    /// Tracking frames are skipped; a namespace overlay resolves to the
    /// namespace's own variable frame.
    pub fn current_variable_frame(&self, frames: &FrameArena, namespaces: &NamespaceTree) -> FrameId {
        for entry in self.iter_top_down() {
            let Some(frame) = frames.get(entry.frame) else {
                continue;
            };
            if frame.flags.contains(FrameFlags::TRACKING) {
                continue;
            }
            if frame.flags.contains(FrameFlags::USE_NAMESPACE) {
                if let Some(target) = frame.namespace.and_then(|ns| namespaces.frame_of(ns)) {
                    return target;
                }
                continue;
            }
            return entry.frame;
        }
        self.global()
    }

    /// Namespace of the nearest frame that carries one
    pub fn current_namespace(&self, frames: &FrameArena) -> Option<NamespaceId> {
        self.iter_top_down()
            .filter_map(|entry| frames.get(entry.frame))
            .find_map(|frame| frame.namespace)
    }

    /// Index of the topmost scope frame, optionally matching `name`
    pub fn find_scope(&self, frames: &FrameArena, name: Option<&str>) -> Option<usize> {
        self.entries.iter().rposition(|entry| {
            frames.get(entry.frame).is_some_and(|frame| {
                frame.is_scope()
                    && !frame.flags.contains(FrameFlags::TRACKING)
                    && name.map_or(true, |wanted| frame.name == wanted)
            })
        })
    }

    /// True when any live frame on the stack overlays `namespace`
    pub fn references_namespace(&self, frames: &FrameArena, namespace: NamespaceId) -> bool {
        self.entries
            .iter()
            .skip(1)
            .filter_map(|entry| frames.get(entry.frame))
            .any(|frame| frame.namespace == Some(namespace))
    }
}

fn release(entry: StackEntry, frames: &mut FrameArena) {
    if entry.owned {
        frames.remove(entry.frame);
    }
}
