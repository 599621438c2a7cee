//! A view of one hash bucket's entry chain
//!
//! A bucket is a contiguous run of entries ending at a terminator record. A
//! zero in the bucket offset table means the bucket was never written; no
//! real chain can start at offset zero because that word holds the bucket
//! count.

use std::cell::RefCell;

use crate::codec::Decompressor;
use crate::entry::Entry;
use crate::error::{PakError, Result};
use crate::mem_ops::{WORD_LEN, get_word};

pub struct Bucket<'a, D> {
    buf: &'a [u8],
    data_end: usize,
    head: Option<usize>,
    decomp: &'a RefCell<D>,
}

impl<'a, D: Decompressor> Bucket<'a, D> {
    /// Loads bucket `index` from the offset table. The caller (the archive)
    /// guarantees the table slot itself is in bounds.
    pub(crate) fn open(
        buf: &'a [u8],
        data_end: usize,
        index: usize,
        decomp: &'a RefCell<D>,
    ) -> Result<Self> {
        let slot = WORD_LEN * (1 + index);
        let offset = get_word(&buf[slot..]) as usize;
        if offset == 0 {
            return Ok(Self {
                buf,
                data_end,
                head: None,
                decomp,
            });
        }
        if offset >= data_end {
            return Err(PakError::OffsetOutOfBounds {
                offset,
                end: data_end,
            });
        }
        Ok(Self {
            buf,
            data_end,
            head: Some(offset),
            decomp,
        })
    }

    /// Linear scan for `name`. Names are the unique key, so the first match
    /// is the only match.
    pub fn find(&self, name: &str) -> Result<Option<Entry<'a, D>>> {
        let Some(mut pos) = self.head else {
            return Ok(None);
        };
        loop {
            let entry = Entry::parse(self.buf, self.data_end, pos, self.decomp)?;
            if entry.is_terminator() {
                return Ok(None);
            }
            if entry.name() == name {
                return Ok(Some(entry));
            }
            pos = entry.next_pos();
        }
    }

    /// Forward iterator over the chain, terminator excluded.
    pub fn entries(&self) -> Entries<'a, D> {
        Entries {
            buf: self.buf,
            data_end: self.data_end,
            pos: self.head,
            decomp: self.decomp,
        }
    }
}

/// Iterator over a bucket's entries. A corrupt record surfaces as an `Err`
/// item and ends the iteration.
pub struct Entries<'a, D> {
    buf: &'a [u8],
    data_end: usize,
    pos: Option<usize>,
    decomp: &'a RefCell<D>,
}

impl<'a, D: Decompressor> Iterator for Entries<'a, D> {
    type Item = Result<Entry<'a, D>>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.pos?;
        match Entry::parse(self.buf, self.data_end, pos, self.decomp) {
            Ok(entry) if entry.is_terminator() => {
                self.pos = None;
                None
            }
            Ok(entry) => {
                self.pos = Some(entry.next_pos());
                Some(Ok(entry))
            }
            Err(err) => {
                self.pos = None;
                Some(Err(err))
            }
        }
    }
}
