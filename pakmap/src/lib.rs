//! Memory-mappable static asset archives.
//!
//! `pakmap` packs a directory tree of regular files into a single compressed
//! container and serves individual files back out by name. The file is its
//! own index: a bucket-count word, a hash-bucket offset table, packed entry
//! chains, and an optional shared-dictionary trailer. A reader resolves a
//! name with one bucket lookup plus a short linear scan over the mapped
//! bytes; nothing is parsed up front and no index is rebuilt in memory.
//!
//! ## Usage
//!
//! Build an archive from a directory, then open it for lookups:
//!
//! ```no_run
//! use pakmap::{Archive, FileMapping, Xxh3Hasher, ZstdCompressor, ZstdDecompressor};
//!
//! # fn main() -> pakmap::Result<()> {
//! let hasher = Xxh3Hasher::default();
//! let mut comp = ZstdCompressor::new(3)?;
//! let mut out = FileMapping::create("assets.pak".as_ref())?;
//! pakmap::build_archive("assets/".as_ref(), &hasher, &mut out, &mut comp)?;
//!
//! let mapping = FileMapping::open("assets.pak".as_ref())?;
//! let archive = Archive::open(mapping, ZstdDecompressor::new()?, hasher)?;
//! if let Some(entry) = archive.lookup("textures/grass.png")? {
//!     let bytes = entry.retrieve()?;
//!     assert_eq!(bytes.len(), entry.decompressed_size()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! An [`Archive`] is a pure reader over an immutable mapping. Share one per
//! thread: the mapping bytes are reusable everywhere, but the decompressor
//! context inside is stateful, so each thread opens its own `Archive` with
//! its own [`Decompressor`].

pub mod archive;
pub mod bucket;
pub mod codec;
pub mod entry;
pub mod error;
pub mod hasher;
pub mod mapping;
pub mod mem_ops;
pub mod metadata;

pub use archive::{Archive, Buckets, build_archive};
pub use bucket::{Bucket, Entries};
pub use codec::{Compressor, Decompressor, ZstdCompressor, ZstdDecompressor};
pub use entry::Entry;
pub use error::{PakError, Result};
pub use hasher::{DEFAULT_LOAD_FACTOR, Hasher, Xxh3Hasher};
pub use mapping::{FileMapping, MemMapper};
pub use mem_ops::{WORD_LEN, Word};
pub use metadata::{DirectoryMetadata, SourceFile};
