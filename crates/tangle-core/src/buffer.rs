// Copyright 2025 The Tangle Developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License.You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

/// A committed region inside a `MonoBuffer`, as (offset, length).
///
/// Spans stay valid for the lifetime of the buffer because they index rather
/// than point; growing the backing store never invalidates them.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Span {
    pub offset: u32,
    pub len: u32,
}

impl Span {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.offset as usize + self.len as usize
    }
}

/// An append-only buffer for accumulating jagged array payloads.
///
/// Data is staged into a tail region item by item, then either committed
/// (yielding a `Span` that names it forever) or discarded (releasing the
/// staged items for reuse). Committed data never moves or disappears until
/// `clear`.
#[derive(Clone, Debug, Default)]
pub struct MonoBuffer<T> {
    items: Vec<T>,
    committed: usize,
}

impl<T: Copy> MonoBuffer<T> {
    #[must_use]
    pub fn new() -> Self {
        MonoBuffer {
            items: Vec::new(),
            committed: 0,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        MonoBuffer {
            items: Vec::with_capacity(capacity),
            committed: 0,
        }
    }

    /// Makes room for at least `additional` more staged items.
    pub fn ensure_available(&mut self, additional: usize) {
        self.items.reserve(additional);
    }

    /// Stages one item.
    pub fn append_tail(&mut self, item: T) {
        self.items.push(item);
    }

    /// Stages a run of items.
    pub fn extend_tail(&mut self, items: &[T]) {
        self.items.extend_from_slice(items);
    }

    /// Throws away the staged items.
    pub fn discard_tail(&mut self) {
        self.items.truncate(self.committed);
    }

    /// Truncates the staged tail to `len` items.
    pub fn truncate_tail(&mut self, len: usize) {
        debug_assert!(len <= self.tail_len());
        self.items.truncate(self.committed + len);
    }

    /// Turns the staged items into committed data.
    pub fn commit_tail(&mut self) -> Span {
        let span = Span {
            offset: self.committed as u32,
            len: (self.items.len() - self.committed) as u32,
        };
        self.committed = self.items.len();
        span
    }

    /// Copies already-committed data to the end of the buffer and commits the
    /// copy. The tail must be empty.
    pub fn take_copy(&mut self, span: Span) -> Span {
        assert_eq!(self.tail_len(), 0);
        self.append_tail_copy(span);
        self.commit_tail()
    }

    /// Stages a copy of already-committed data onto the tail.
    pub fn append_tail_copy(&mut self, span: Span) {
        let start = span.offset as usize;
        debug_assert!(span.end() <= self.committed);
        self.items.extend_from_within(start..start + span.len());
    }

    #[must_use]
    pub fn view(&self, span: Span) -> &[T] {
        &self.items[span.offset as usize..span.end()]
    }

    #[must_use]
    pub fn tail(&self) -> &[T] {
        &self.items[self.committed..]
    }

    pub fn tail_mut(&mut self) -> &mut [T] {
        &mut self.items[self.committed..]
    }

    #[must_use]
    pub fn tail_len(&self) -> usize {
        self.items.len() - self.committed
    }

    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.committed = 0;
    }
}
