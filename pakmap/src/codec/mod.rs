//! Byte-range compression and decompression
//!
//! The archive core is generic over these two capability sets. The only hard
//! requirement on an implementation is that compressed frames are
//! self-describing: [`Decompressor::decompressed_size`] must recover the
//! original length from the frame alone, because the container stores no
//! other metadata about an entry's payload.

mod zstd;

pub use zstd::{
    STRATEGY_MAX, STRATEGY_MIN, ZstdCompressor, ZstdDecompressor, compress_level_range,
    default_compress_level, strategy_help,
};

use std::path::Path;

use crate::error::Result;

/// Write-side codec capabilities.
pub trait Compressor {
    /// Worst-case compressed length for `len` input bytes.
    fn compress_bound(&self, len: usize) -> usize;

    /// Compresses `src` into `dst` as one self-contained frame and returns
    /// the number of bytes written. `dst` must hold at least
    /// [`compress_bound`](Self::compress_bound) of `src.len()` bytes.
    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Trains a shared dictionary from the regular files under `samples` and
    /// installs it. `Ok(false)` means no dictionary could be produced (for
    /// example, too little sample data); that is not an error.
    fn train_dictionary(&mut self, samples: &Path) -> Result<bool> {
        let _ = samples;
        Ok(false)
    }

    /// The currently installed dictionary, if any.
    fn dictionary(&self) -> Option<&[u8]> {
        None
    }

    /// Installs `dict` as the compression dictionary.
    fn use_dictionary(&mut self, dict: &[u8]) -> Result<()>;
}

/// Read-side codec capabilities.
pub trait Decompressor {
    /// Original length of the frame in `src`, read from the frame header.
    /// Fails if the frame does not carry its decompressed size.
    fn decompressed_size(&self, src: &[u8]) -> Result<usize>;

    /// Decompresses the frame in `src` into `dst` and returns the number of
    /// bytes written. `dst` must hold at least
    /// [`decompressed_size`](Self::decompressed_size) bytes.
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Installs `dict` as the decompression dictionary.
    fn use_dictionary(&mut self, dict: &[u8]) -> Result<()>;
}

impl<C: Compressor + ?Sized> Compressor for Box<C> {
    fn compress_bound(&self, len: usize) -> usize {
        (**self).compress_bound(len)
    }

    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        (**self).compress(src, dst)
    }

    fn train_dictionary(&mut self, samples: &Path) -> Result<bool> {
        (**self).train_dictionary(samples)
    }

    fn dictionary(&self) -> Option<&[u8]> {
        (**self).dictionary()
    }

    fn use_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        (**self).use_dictionary(dict)
    }
}

impl<D: Decompressor + ?Sized> Decompressor for Box<D> {
    fn decompressed_size(&self, src: &[u8]) -> Result<usize> {
        (**self).decompressed_size(src)
    }

    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        (**self).decompress(src, dst)
    }

    fn use_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        (**self).use_dictionary(dict)
    }
}
