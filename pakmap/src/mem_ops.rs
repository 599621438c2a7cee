//! Little-endian encoding of the archive size word
//!
//! Every integer that touches the mapping goes through [`put_word`] and
//! [`get_word`]; nothing reinterprets mapped bytes as a native integer, so
//! archives are byte-identical across host endianness.

use byteorder::{ByteOrder, LittleEndian};

#[cfg(all(feature = "word16", feature = "word64"))]
compile_error!("features `word16` and `word64` are mutually exclusive");

/// The archive size word. Selected at compile time; 32-bit by default.
#[cfg(feature = "word16")]
pub type Word = u16;
#[cfg(all(feature = "word64", not(feature = "word16")))]
pub type Word = u64;
#[cfg(not(any(feature = "word16", feature = "word64")))]
pub type Word = u32;

/// Width of [`Word`] in bytes.
pub const WORD_LEN: usize = std::mem::size_of::<Word>();

/// Writes `value` into the first `WORD_LEN` bytes of `buf`, little-endian.
pub fn put_word(buf: &mut [u8], value: Word) {
    LittleEndian::write_uint(&mut buf[..WORD_LEN], u64::from(value), WORD_LEN);
}

/// Reads a little-endian [`Word`] from the first `WORD_LEN` bytes of `buf`.
pub fn get_word(buf: &[u8]) -> Word {
    LittleEndian::read_uint(&buf[..WORD_LEN], WORD_LEN) as Word
}

/// Rounds `len` up to the next multiple of [`WORD_LEN`].
pub fn align_up(len: usize) -> usize {
    let rem = len % WORD_LEN;
    if rem == 0 { len } else { len + (WORD_LEN - rem) }
}
