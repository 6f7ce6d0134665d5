use std::collections::VecDeque;

use crate::display::{DisplayEvent, DisplayKind};
use crate::segmenter::segment;

/// FIFO of display events waiting for playback. Insertion order is display
/// order; there is no priority and no reordering.
///
/// The queue is owned by a single session task, which is its only mutator.
#[derive(Debug, Default)]
pub struct DisplayQueue {
    items: VecDeque<DisplayEvent>,
}

impl DisplayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: DisplayEvent) {
        self.items.push_back(event);
    }

    pub fn dequeue_next(&mut self) -> Option<DisplayEvent> {
        self.items.pop_front()
    }

    /// Enqueues `content` under `title`, split into segments of at most
    /// `max_len` characters. Blank content enqueues one label-only event.
    ///
    /// Returns how many events were enqueued.
    pub fn enqueue_content(
        &mut self,
        kind: DisplayKind,
        title: &str,
        content: Option<&str>,
        max_len: usize,
    ) -> usize {
        let segments = content
            .map(|text| segment(title, text, max_len))
            .unwrap_or_default();
        if segments.is_empty() {
            self.enqueue(DisplayEvent::label(kind, title));
            return 1;
        }
        let count = segments.len();
        for seg in segments {
            self.enqueue(DisplayEvent::new(kind, seg.title, Some(seg.text)));
        }
        count
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
