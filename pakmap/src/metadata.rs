//! Source tree scanning and archive layout arithmetic
//!
//! A build walks the source directory once up front to learn every entry's
//! name, bucket, and worst-case compressed size. The resulting totals size
//! the mapping before a single byte is written; nothing is re-measured mid
//! build, so no pointer into the mapping is ever invalidated by a resize.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::codec::Compressor;
use crate::error::{PakError, Result};
use crate::hasher::Hasher;
use crate::mem_ops::{WORD_LEN, Word};

/// One regular file discovered under the source root.
#[derive(Debug)]
pub struct SourceFile {
    /// Entry name: the path relative to the root, forward-slash separated
    /// on every host.
    pub name: String,
    /// Absolute path for reading the bytes at build time.
    pub path: PathBuf,
    /// Size on disk.
    pub size: u64,
    /// Worst-case compressed size of this file.
    pub bound: usize,
}

/// Bucket assignments and worst-case size totals for one source tree.
pub struct DirectoryMetadata {
    buckets: Vec<Vec<SourceFile>>,
    file_count: usize,
    total_bound: usize,
    total_name_bytes: usize,
    total_padding: usize,
    dict_len: usize,
}

impl DirectoryMetadata {
    /// Walks `root` recursively, keeping regular files only, and assigns
    /// each to its bucket. The walk order is deterministic (sorted by file
    /// name), which fixes the entry order within each bucket.
    pub fn scan<H: Hasher, C: Compressor>(hasher: &H, comp: &C, root: &Path) -> Result<Self> {
        let mut files = Vec::new();
        let mut total_bound = 0usize;
        let mut total_name_bytes = 0usize;
        let mut total_padding = 0usize;

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map_err(io::Error::from)?.len();
            let rel = entry.path().strip_prefix(root).map_err(|_| {
                PakError::Usage(format!("{:?} escapes the source root", entry.path()))
            })?;
            let name = relative_name(rel)?;
            let bound = comp.compress_bound(size as usize);
            if bound as u128 > Word::MAX as u128 {
                return Err(PakError::Usage(format!(
                    "{name} is too large for a {}-byte size word",
                    WORD_LEN
                )));
            }
            total_bound += bound;
            total_name_bytes += name.len() + 1;
            let unaligned = WORD_LEN + name.len() + 1 + bound;
            let rem = unaligned % WORD_LEN;
            if rem != 0 {
                total_padding += WORD_LEN - rem;
            }
            files.push(SourceFile {
                name,
                path: entry.into_path(),
                size,
                bound,
            });
        }

        let file_count = files.len();
        let bucket_count = hasher.buckets_for(file_count);
        let mut buckets: Vec<Vec<SourceFile>> = (0..bucket_count).map(|_| Vec::new()).collect();
        for file in files {
            let id = hasher.bucket_of(hasher.hash(file.name.as_bytes()), bucket_count);
            buckets[id].push(file);
        }
        debug!(file_count, bucket_count, "scanned source tree");

        Ok(Self {
            buckets,
            file_count,
            total_bound,
            total_name_bytes,
            total_padding,
            dict_len: comp.dictionary().map_or(0, |dict| dict.len()),
        })
    }

    /// Worst-case archive size: header, offset table, every entry at its
    /// compress bound with name and padding, one terminator per bucket,
    /// the dictionary trailer, and the flag byte.
    pub fn total_required_space(&self) -> usize {
        let mut total = WORD_LEN; // bucket count
        total += WORD_LEN * self.buckets.len(); // bucket offset table
        total += WORD_LEN * self.file_count; // size prefix per entry
        total += self.total_name_bytes; // names, NUL included
        total += self.total_bound; // payloads at worst case
        total += self.total_padding; // alignment padding at worst case
        total += 2 * WORD_LEN * self.buckets.len(); // terminator per bucket
        if self.dict_len > 0 {
            total += self.dict_len + WORD_LEN; // dictionary plus length word
        }
        total + 1 // trailer flag
    }

    /// First byte after the bucket offset table.
    pub fn data_start(&self) -> usize {
        WORD_LEN * (self.buckets.len() + 1)
    }

    /// Files grouped by bucket, in bucket-id order.
    pub fn buckets(&self) -> &[Vec<SourceFile>] {
        &self.buckets
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }
}

fn relative_name(rel: &Path) -> Result<String> {
    let mut name = String::new();
    for component in rel.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            PakError::Usage(format!("source path {rel:?} is not valid UTF-8"))
        })?;
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(part);
    }
    Ok(name)
}
