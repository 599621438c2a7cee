//! Default codec: zstd with optional trained dictionaries
//!
//! Every entry payload is a complete zstd frame carrying its own content
//! size, which is what lets a reader size its output buffer from the mapped
//! bytes alone. Dictionaries are trained from the source tree the same way
//! the archive is built from it, then embedded in the archive trailer.

use std::io;
use std::ops::RangeInclusive;
use std::path::Path;

use tracing::{debug, trace};
use walkdir::WalkDir;
use zstd::bulk;
use zstd::zstd_safe::{self, CParameter, Strategy};

use crate::error::{PakError, Result};

/// Strategy 0 leaves the choice to the codec.
pub const STRATEGY_MIN: i32 = 0;
pub const STRATEGY_MAX: i32 = 9;

/// Training needs room for the dictionary header even on tiny inputs.
const MIN_DICT_CAPACITY: usize = 256;

/// Valid compression levels, as reported by the codec.
pub fn compress_level_range() -> RangeInclusive<i32> {
    zstd::compression_level_range()
}

pub fn default_compress_level() -> i32 {
    zstd::DEFAULT_COMPRESSION_LEVEL
}

/// One line per strategy value, for CLI help output.
pub fn strategy_help() -> &'static str {
    "0 (let the codec decide)\n\
     1 (fast)\n\
     2 (dfast)\n\
     3 (greedy)\n\
     4 (lazy)\n\
     5 (lazy2)\n\
     6 (btlazy2)\n\
     7 (btopt)\n\
     8 (btultra)\n\
     9 (btultra2)"
}

fn codec_err(what: &str, err: io::Error) -> PakError {
    PakError::Codec(format!("{what}: {err}"))
}

fn strategy_value(strategy: i32) -> Result<Strategy> {
    Ok(match strategy {
        1 => Strategy::ZSTD_fast,
        2 => Strategy::ZSTD_dfast,
        3 => Strategy::ZSTD_greedy,
        4 => Strategy::ZSTD_lazy,
        5 => Strategy::ZSTD_lazy2,
        6 => Strategy::ZSTD_btlazy2,
        7 => Strategy::ZSTD_btopt,
        8 => Strategy::ZSTD_btultra,
        9 => Strategy::ZSTD_btultra2,
        other => {
            return Err(PakError::Usage(format!(
                "compression strategy {other} out of range ({STRATEGY_MIN}..={STRATEGY_MAX})"
            )));
        }
    })
}

/// Write-side zstd context.
pub struct ZstdCompressor {
    cctx: bulk::Compressor<'static>,
    level: i32,
    strategy: i32,
    dict_ratio: f64,
    dict: Option<Vec<u8>>,
}

impl ZstdCompressor {
    /// Dictionary size as a fraction of the training input when none is
    /// given; 0.01 targets a dictionary 1% of the sample bytes.
    pub const DEFAULT_DICT_RATIO: f64 = 0.01;

    pub fn new(level: i32) -> Result<Self> {
        Self::with_dict_ratio(level, Self::DEFAULT_DICT_RATIO)
    }

    pub fn with_dict_ratio(level: i32, dict_ratio: f64) -> Result<Self> {
        let mut this = Self {
            cctx: bulk::Compressor::new(level).map_err(|e| codec_err("compressor setup", e))?,
            level,
            strategy: 0,
            dict_ratio,
            dict: None,
        };
        this.configure()?;
        Ok(this)
    }

    /// Selects a compression strategy; 0 restores the codec default.
    pub fn set_strategy(&mut self, strategy: i32) -> Result<()> {
        if strategy != 0 {
            strategy_value(strategy)?;
        }
        self.strategy = strategy;
        self.rebuild()
    }

    /// Recreates the compression context from the current level, strategy
    /// and dictionary. zstd pins dictionary parameters at load time, so a
    /// changed setting means a fresh context.
    fn rebuild(&mut self) -> Result<()> {
        self.cctx = match &self.dict {
            Some(dict) => bulk::Compressor::with_dictionary(self.level, dict),
            None => bulk::Compressor::new(self.level),
        }
        .map_err(|e| codec_err("compressor setup", e))?;
        self.configure()
    }

    fn configure(&mut self) -> Result<()> {
        // The frame must carry its content size; readers have no other way
        // to learn an entry's decompressed length.
        self.cctx
            .include_contentsize(true)
            .map_err(|e| codec_err("compressor setup", e))?;
        if self.strategy != 0 {
            self.cctx
                .set_parameter(CParameter::Strategy(strategy_value(self.strategy)?))
                .map_err(|e| codec_err("compressor setup", e))?;
        }
        Ok(())
    }
}

impl super::Compressor for ZstdCompressor {
    fn compress_bound(&self, len: usize) -> usize {
        zstd_safe::compress_bound(len)
    }

    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let written = self
            .cctx
            .compress_to_buffer(src, dst)
            .map_err(|e| codec_err("compression failed", e))?;
        trace!(src = src.len(), written, "compressed frame");
        Ok(written)
    }

    fn train_dictionary(&mut self, samples: &Path) -> Result<bool> {
        let mut data = Vec::new();
        let mut sizes = Vec::new();
        for entry in WalkDir::new(samples).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            sizes.push(bytes.len());
            data.extend_from_slice(&bytes);
        }
        if data.is_empty() {
            return Ok(false);
        }
        let capacity = ((data.len() as f64 * self.dict_ratio) as usize).max(MIN_DICT_CAPACITY);
        match zstd::dict::from_continuous(&data, &sizes, capacity) {
            Ok(dict) => {
                debug!(
                    samples = sizes.len(),
                    input = data.len(),
                    dict = dict.len(),
                    "trained dictionary"
                );
                self.dict = Some(dict);
                self.rebuild()?;
                Ok(true)
            }
            Err(err) => {
                debug!(samples = sizes.len(), "dictionary training failed: {err}");
                Ok(false)
            }
        }
    }

    fn dictionary(&self) -> Option<&[u8]> {
        self.dict.as_deref()
    }

    fn use_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        self.dict = Some(dict.to_vec());
        self.rebuild()
    }
}

/// Read-side zstd context.
pub struct ZstdDecompressor {
    dctx: bulk::Decompressor<'static>,
}

impl ZstdDecompressor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dctx: bulk::Decompressor::new().map_err(|e| codec_err("decompressor setup", e))?,
        })
    }
}

impl super::Decompressor for ZstdDecompressor {
    fn decompressed_size(&self, src: &[u8]) -> Result<usize> {
        match zstd_safe::get_frame_content_size(src) {
            Ok(Some(len)) => Ok(len as usize),
            Ok(None) => Err(PakError::Codec(
                "frame does not carry its decompressed size".into(),
            )),
            Err(_) => Err(PakError::Codec("not a valid compressed frame".into())),
        }
    }

    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        self.dctx
            .decompress_to_buffer(src, dst)
            .map_err(|e| codec_err("decompression failed", e))
    }

    fn use_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        self.dctx = bulk::Decompressor::with_dictionary(dict)
            .map_err(|e| codec_err("decompressor setup", e))?;
        Ok(())
    }
}
