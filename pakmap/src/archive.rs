//! Top-level archive reader and builder
//!
//! Layout, all words little-endian and all offsets absolute:
//!
//! ```text
//! [bucket_count: W][offset table: count x W][bucket chains...]
//! [dict bytes...][dict_len: W][flag=1]     -- trailer with dictionary
//! [flag=0]                                 -- trailer without
//! ```
//!
//! Opening reads only the trailer (to install the dictionary) and the
//! header word; every other byte is touched lazily by lookups. Building
//! sizes the file to the worst case up front, writes every chain through
//! the mapping, then truncates to the bytes actually used.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::bucket::Bucket;
use crate::codec::{Compressor, Decompressor};
use crate::entry::Entry;
use crate::error::{PakError, Result};
use crate::hasher::Hasher;
use crate::mapping::MemMapper;
use crate::mem_ops::{WORD_LEN, Word, align_up, get_word, put_word};
use crate::metadata::DirectoryMetadata;

/// Read-mode archive over an immutable mapping.
///
/// The mapping and hasher are freely shareable, but the decompressor is
/// stateful; use one `Archive` (with its own decompressor) per thread.
pub struct Archive<M, D, H> {
    mapper: M,
    decomp: RefCell<D>,
    hasher: H,
    bucket_count: usize,
    dict_len: usize,
    data_end: usize,
}

impl<M: MemMapper, D: Decompressor, H: Hasher> Archive<M, D, H> {
    /// Opens a complete archive for reading. Installs the embedded
    /// dictionary (if the trailer carries one) on `decomp` and validates
    /// the trailer and bucket table bounds; entry data is only validated
    /// as it is reached.
    pub fn open(mapper: M, mut decomp: D, hasher: H) -> Result<Self> {
        let len = mapper.len();
        if len == 0 {
            return Err(PakError::EmptyArchive);
        }
        let buf = mapper.as_slice();
        let (dict_len, data_end) = match buf[len - 1] {
            0 => (0, len - 1),
            1 => {
                if len < 1 + WORD_LEN {
                    return Err(PakError::Format(
                        "archive too short for a dictionary trailer".into(),
                    ));
                }
                let dict_len = get_word(&buf[len - 1 - WORD_LEN..]) as usize;
                let trailer = 1 + WORD_LEN + dict_len;
                if trailer > len {
                    return Err(PakError::Format(format!(
                        "dictionary length {dict_len} exceeds the archive"
                    )));
                }
                let dict_start = len - trailer;
                decomp.use_dictionary(&buf[dict_start..dict_start + dict_len])?;
                (dict_len, dict_start)
            }
            flag => return Err(PakError::FutureVersion(flag)),
        };

        if WORD_LEN > data_end {
            return Err(PakError::Format("archive too short for a header".into()));
        }
        let bucket_count = get_word(buf) as usize;
        let table_end = WORD_LEN * (bucket_count + 1);
        if table_end > data_end {
            return Err(PakError::Format(format!(
                "bucket table of {bucket_count} buckets exceeds the archive"
            )));
        }
        debug!(len, bucket_count, dict_len, "opened archive");

        Ok(Self {
            mapper,
            decomp: RefCell::new(decomp),
            hasher,
            bucket_count,
            dict_len,
            data_end,
        })
    }

    /// Number of buckets in the offset table.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Counts buckets that hold no entries.
    pub fn empty_buckets(&self) -> Result<usize> {
        let mut empty = 0;
        for bucket in self.buckets() {
            if bucket?.entries().next().is_none() {
                empty += 1;
            }
        }
        Ok(empty)
    }

    /// Embedded dictionary length, 0 when the archive carries none.
    pub fn dictionary_size(&self) -> usize {
        self.dict_len
    }

    /// Total archive length in bytes.
    pub fn size(&self) -> usize {
        self.mapper.len()
    }

    /// Resolves `name` to its entry: one hash, one bucket, one linear scan.
    pub fn lookup(&self, name: &str) -> Result<Option<Entry<'_, D>>> {
        if self.bucket_count == 0 {
            return Ok(None);
        }
        let id = self
            .hasher
            .bucket_of(self.hasher.hash(name.as_bytes()), self.bucket_count);
        trace!(name, bucket = id, "lookup");
        self.bucket(id)?.find(name)
    }

    /// The bucket at `index`.
    pub fn bucket(&self, index: usize) -> Result<Bucket<'_, D>> {
        if index >= self.bucket_count {
            return Err(PakError::BucketOutOfRange {
                index,
                count: self.bucket_count,
            });
        }
        Bucket::open(self.mapper.as_slice(), self.data_end, index, &self.decomp)
    }

    /// Forward iteration over all buckets in table order.
    pub fn buckets(&self) -> Buckets<'_, M, D, H> {
        Buckets {
            archive: self,
            index: 0,
        }
    }
}

/// Iterator over an archive's buckets.
pub struct Buckets<'a, M, D, H> {
    archive: &'a Archive<M, D, H>,
    index: usize,
}

impl<'a, M: MemMapper, D: Decompressor, H: Hasher> Iterator for Buckets<'a, M, D, H> {
    type Item = Result<Bucket<'a, D>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.archive.bucket_count() {
            return None;
        }
        let bucket = self.archive.bucket(self.index);
        self.index += 1;
        Some(bucket)
    }
}

/// Builds an archive from the regular files under `source`.
///
/// The mapping is sized to the worst case first and truncated to the exact
/// used length at the end, so no write ever remaps mid-build. If `comp`
/// carries a dictionary it is embedded in the trailer; train or install one
/// before calling. On error the mapping is left in an indeterminate state
/// and the caller should delete the partial file.
pub fn build_archive<M, C, H>(source: &Path, hasher: &H, mapper: &mut M, comp: &mut C) -> Result<()>
where
    M: MemMapper,
    C: Compressor,
    H: Hasher,
{
    let meta = DirectoryMetadata::scan(hasher, comp, source)?;
    let worst = meta.total_required_space();
    if worst as u128 > Word::MAX as u128 {
        return Err(PakError::Usage(format!(
            "archive would need {worst} bytes, more than the {WORD_LEN}-byte size word can address"
        )));
    }
    debug!(
        files = meta.file_count(),
        buckets = meta.buckets().len(),
        worst,
        "building archive"
    );
    mapper.resize(worst)?;

    let used;
    {
        let buf = mapper.as_mut_slice()?;
        put_word(buf, meta.buckets().len() as Word);
        // A zero slot marks an unused bucket, so the table must not carry
        // stale bytes.
        buf[WORD_LEN..meta.data_start()].fill(0);

        let mut next_free = meta.data_start();
        for (id, files) in meta.buckets().iter().enumerate() {
            if files.is_empty() {
                continue;
            }
            put_word(&mut buf[WORD_LEN * (1 + id)..], next_free as Word);
            // The chain is well-formed from the moment it exists.
            write_terminator(buf, next_free);
            for file in files {
                let data = fs::read(&file.path)?;
                next_free += populate(buf, next_free, &file.name, &data, file.bound, comp)?;
            }
            next_free += write_terminator(buf, next_free);
            trace!(bucket = id, entries = files.len(), end = next_free, "wrote bucket");
        }

        let mut pos = next_free;
        if let Some(dict) = comp.dictionary() {
            buf[pos..pos + dict.len()].copy_from_slice(dict);
            pos += dict.len();
            put_word(&mut buf[pos..], dict.len() as Word);
            pos += WORD_LEN;
            buf[pos] = 1;
        } else {
            buf[pos] = 0;
        }
        used = pos + 1;
    }

    debug!(used, reclaimed = worst - used, "finished archive");
    mapper.resize(used)
}

/// Writes one entry record at `pos`: name, compressed payload, size word,
/// then zeroes. Returns the record's aligned length.
fn populate<C: Compressor>(
    buf: &mut [u8],
    pos: usize,
    name: &str,
    src: &[u8],
    bound: usize,
    comp: &mut C,
) -> Result<usize> {
    let name_start = pos + WORD_LEN;
    buf[name_start..name_start + name.len()].copy_from_slice(name.as_bytes());
    buf[name_start + name.len()] = 0;
    let data_start = name_start + name.len() + 1;
    let written = comp.compress(src, &mut buf[data_start..data_start + bound])?;
    put_word(&mut buf[pos..], written as Word);

    let total = align_up(WORD_LEN + name.len() + 1 + written);
    // Zero the alignment padding, plus up to a word-and-one guard past the
    // record, so a name scan that runs into the padding always terminates.
    let guard = (WORD_LEN + 1).min(bound - written);
    buf[data_start + written..pos + total + guard].fill(0);
    Ok(total)
}

/// Writes a terminator record (size 0, empty name) at `pos` and returns its
/// aligned length.
fn write_terminator(buf: &mut [u8], pos: usize) -> usize {
    let total = align_up(WORD_LEN + 1);
    buf[pos..pos + total].fill(0);
    total
}
