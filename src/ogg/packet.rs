// Packet model
//
// Pages live in a PageArena owned by the stream; packets refer to them by
// PageId plus a byte range, so one page can end a packet and begin the next
// without either packet owning it.

use std::collections::VecDeque;

use serde::Serialize;

use crate::ogg::Page;

/// Position of a page in the arena, counted from the first page read
pub type PageId = usize;

/// Assembler progress for the tracked stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssemblerState {
    /// Next lacing value starts a new packet
    AwaitingPacketStart,
    /// A packet is open and continues on the next page
    AccumulatingContinuation,
    /// A packet was just emitted
    PacketComplete,
}

/// Part of a packet carried by one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub page: PageId,
    /// Byte offset of the fragment inside the page payload
    pub offset: usize,
    pub length: usize,
    /// Index of the first lacing value covering this fragment
    pub segment_start: usize,
    /// One past the last lacing value covering this fragment
    pub segment_end: usize,
}

/// Logical packet assembled from one or more pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Packet {
    fragments: Vec<Fragment>,
    len: usize,
}

impl Packet {
    pub(crate) fn push(&mut self, fragment: Fragment) {
        self.len += fragment.length;
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Total payload length across fragments
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first_page(&self) -> Option<PageId> {
        self.fragments.first().map(|f| f.page)
    }

    pub fn last_page(&self) -> Option<PageId> {
        self.fragments.last().map(|f| f.page)
    }

    /// Inclusive range of pages the packet spans
    pub fn page_range(&self) -> Option<(PageId, PageId)> {
        Some((self.first_page()?, self.last_page()?))
    }

    /// Copy the packet payload out of the arena.
    ///
    /// Returns `None` if a referenced page has been released.
    pub fn payload(&self, arena: &PageArena) -> Option<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len);
        for fragment in &self.fragments {
            let page = arena.get(fragment.page)?;
            data.extend_from_slice(page.payload().get(fragment.offset..fragment.offset + fragment.length)?);
        }
        Some(data)
    }
}

/// Pages read so far, addressed by PageId
#[derive(Debug, Default)]
pub struct PageArena {
    first: PageId,
    pages: VecDeque<Page>,
}

impl PageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, page: Page) -> PageId {
        self.pages.push_back(page);
        self.first + self.pages.len() - 1
    }

    pub fn get(&self, id: PageId) -> Option<&Page> {
        id.checked_sub(self.first).and_then(|i| self.pages.get(i))
    }

    /// Id the next pushed page will get
    pub fn next_id(&self) -> PageId {
        self.first + self.pages.len()
    }

    /// Oldest page still held
    pub fn first_id(&self) -> PageId {
        self.first
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Drop every page older than id
    pub fn release_before(&mut self, id: PageId) {
        while self.first < id && !self.pages.is_empty() {
            self.pages.pop_front();
            self.first += 1;
        }
    }

    /// Drop all pages; ids keep counting up
    pub fn clear(&mut self) {
        self.first += self.pages.len();
        self.pages.clear();
    }

    /// Pages in [first, last], or `None` if any is missing
    pub fn span(&self, first: PageId, last: PageId) -> Option<Vec<&Page>> {
        (first..=last).map(|id| self.get(id)).collect()
    }
}
