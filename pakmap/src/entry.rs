//! A view of one named, compressed record inside the mapping
//!
//! An [`Entry`] is parsed, not constructed: building one walks the record's
//! header against the data-region bounds, so every accessor on a live view
//! is infallible. Entries borrow the mapping and a shared decompressor and
//! never own payload bytes.

use std::cell::RefCell;

use crate::codec::Decompressor;
use crate::error::{PakError, Result};
use crate::mem_ops::{WORD_LEN, align_up, get_word};

/// On-disk layout at `pos`:
/// `[size: W][name bytes…][NUL][data: size bytes][pad to W]`.
pub struct Entry<'a, D> {
    buf: &'a [u8],
    pos: usize,
    name: &'a str,
    payload_len: usize,
    decomp: &'a RefCell<D>,
}

impl<'a, D: Decompressor> Entry<'a, D> {
    /// Validates the record starting at `pos`: the size word and the
    /// NUL-terminated name must sit inside the data region, the declared
    /// payload must not overrun it, and the name must be UTF-8.
    pub(crate) fn parse(
        buf: &'a [u8],
        data_end: usize,
        pos: usize,
        decomp: &'a RefCell<D>,
    ) -> Result<Self> {
        if pos + WORD_LEN > data_end {
            return Err(PakError::EntryOutOfBounds { pos, end: data_end });
        }
        let payload_len = get_word(&buf[pos..]) as usize;
        let name_start = pos + WORD_LEN;
        let name_len = buf[name_start..data_end]
            .iter()
            .position(|&b| b == 0)
            .ok_or(PakError::UnterminatedName(name_start))?;
        let data_start = name_start + name_len + 1;
        if data_start + payload_len > data_end {
            return Err(PakError::EntryOutOfBounds { pos, end: data_end });
        }
        let name = std::str::from_utf8(&buf[name_start..name_start + name_len])
            .map_err(|_| PakError::InvalidName(name_start))?;
        Ok(Self {
            buf,
            pos,
            name,
            payload_len,
            decomp,
        })
    }

    /// A bucket chain ends at a record with a zero size and an empty name.
    pub(crate) fn is_terminator(&self) -> bool {
        self.payload_len == 0 && self.name.is_empty()
    }

    /// Absolute offset of this record in the archive.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Compressed payload length in bytes.
    pub fn file_size(&self) -> usize {
        self.payload_len
    }

    /// Entry name: the source-relative path, forward-slash separated.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The compressed payload.
    pub fn file_data(&self) -> &'a [u8] {
        let data_start = self.pos + WORD_LEN + self.name.len() + 1;
        &self.buf[data_start..data_start + self.payload_len]
    }

    /// Total record length including padding; the distance to the next
    /// record in the chain. Always a multiple of the word width.
    pub fn in_memory_size(&self) -> usize {
        align_up(WORD_LEN + self.name.len() + 1 + self.payload_len)
    }

    /// Original (uncompressed) length, read from the payload's frame header.
    pub fn decompressed_size(&self) -> Result<usize> {
        self.decomp.borrow().decompressed_size(self.file_data())
    }

    /// Decompresses the payload into a fresh buffer.
    pub fn retrieve(&self) -> Result<Vec<u8>> {
        let len = self.decompressed_size()?;
        let mut out = vec![0u8; len];
        let written = self.retrieve_into(&mut out)?;
        out.truncate(written);
        Ok(out)
    }

    /// Decompresses the payload into `dst` and returns the bytes written.
    /// `dst` must hold at least [`decompressed_size`](Self::decompressed_size)
    /// bytes.
    pub fn retrieve_into(&self, dst: &mut [u8]) -> Result<usize> {
        self.decomp.borrow_mut().decompress(self.file_data(), dst)
    }

    pub(crate) fn next_pos(&self) -> usize {
        self.pos + self.in_memory_size()
    }
}
