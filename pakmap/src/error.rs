//! Error types for archive operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PakError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("empty file is not an archive")]
    EmptyArchive,

    #[error("future version: unknown trailer flag {0:#04x}")]
    FutureVersion(u8),

    #[error("bucket index {index} out of range ({count} buckets)")]
    BucketOutOfRange { index: usize, count: usize },

    #[error("bucket offset {offset:#x} lies outside the data region (end {end:#x})")]
    OffsetOutOfBounds { offset: usize, end: usize },

    #[error("entry at {pos:#x} overruns the data region (end {end:#x})")]
    EntryOutOfBounds { pos: usize, end: usize },

    #[error("entry name at {0:#x} is missing its NUL terminator")]
    UnterminatedName(usize),

    #[error("entry name at {0:#x} is not valid UTF-8")]
    InvalidName(usize),

    #[error("invalid archive format: {0}")]
    Format(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, PakError>;
