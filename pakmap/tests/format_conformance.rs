//! Raw on-disk format checks: these walk the archive bytes with an
//! independent little-endian decoder rather than through the library.

use std::fs;
use std::path::{Path, PathBuf};

use pakmap::{
    Archive, FileMapping, PakError, WORD_LEN, Xxh3Hasher, ZstdCompressor, ZstdDecompressor,
    build_archive,
};
use tempfile::TempDir;

fn read_word(buf: &[u8], pos: usize) -> usize {
    let mut value = 0u64;
    for i in (0..WORD_LEN).rev() {
        value = (value << 8) | u64::from(buf[pos + i]);
    }
    value as usize
}

fn write_tree(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, bytes) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }
    dir
}

fn small_tree() -> TempDir {
    write_tree(&[
        ("file1.txt", b"This is a test string".as_slice()),
        ("file2.txt", b"This is \xBD binary".as_slice()),
        ("file3.txt", b"Another string".as_slice()),
    ])
}

fn build(source: &Path) -> (TempDir, PathBuf) {
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("test.pak");
    let hasher = Xxh3Hasher::default();
    let mut comp = ZstdCompressor::new(3).unwrap();
    let mut mapper = FileMapping::create(&path).unwrap();
    build_archive(source, &hasher, &mut mapper, &mut comp).unwrap();
    (out, path)
}

fn open(path: &Path) -> Archive<FileMapping, ZstdDecompressor, Xxh3Hasher> {
    Archive::open(
        FileMapping::open(path).unwrap(),
        ZstdDecompressor::new().unwrap(),
        Xxh3Hasher::default(),
    )
    .unwrap()
}

/// Walks every chain in the raw bytes: each record must start on a word
/// boundary and every padding byte up to the next record must be zero.
#[test]
fn entries_are_word_aligned_with_zero_padding() {
    let source = small_tree();
    let (_out, path) = build(source.path());
    let buf = fs::read(&path).unwrap();

    let bucket_count = read_word(&buf, 0);
    let mut records = 0;
    for id in 0..bucket_count {
        let mut pos = read_word(&buf, WORD_LEN * (1 + id));
        if pos == 0 {
            continue;
        }
        loop {
            assert_eq!(pos % WORD_LEN, 0, "record at {pos:#x} is misaligned");
            let size = read_word(&buf, pos);
            let name_start = pos + WORD_LEN;
            let name_len = buf[name_start..]
                .iter()
                .position(|&b| b == 0)
                .expect("name missing NUL");
            let payload_end = name_start + name_len + 1 + size;
            let mut total = WORD_LEN + name_len + 1 + size;
            if total % WORD_LEN != 0 {
                total += WORD_LEN - total % WORD_LEN;
            }
            for (i, byte) in buf[payload_end..pos + total].iter().enumerate() {
                assert_eq!(*byte, 0, "padding byte {i} after {pos:#x} is not zero");
            }
            if size == 0 && name_len == 0 {
                break;
            }
            records += 1;
            pos += total;
        }
    }
    assert_eq!(records, 3);
}

#[test]
fn trailer_flag_is_zero_without_a_dictionary() {
    let source = small_tree();
    let (_out, path) = build(source.path());
    let buf = fs::read(&path).unwrap();
    assert_eq!(*buf.last().unwrap(), 0);
}

#[test]
fn empty_buckets_have_zero_offsets_and_no_entries() {
    let source = small_tree();
    let (_out, path) = build(source.path());
    let buf = fs::read(&path).unwrap();

    let archive = open(&path);
    let bucket_count = read_word(&buf, 0);
    assert_eq!(archive.bucket_count(), bucket_count);
    for id in 0..bucket_count {
        let offset = read_word(&buf, WORD_LEN * (1 + id));
        let entries = archive.bucket(id).unwrap().entries().count();
        if offset == 0 {
            assert_eq!(entries, 0, "bucket {id} has a zero offset but entries");
        } else {
            assert!(entries > 0, "bucket {id} was written but holds nothing");
        }
    }
}

#[test]
fn future_version_flag_is_rejected_and_reversible() {
    let source = small_tree();
    let (_out, path) = build(source.path());

    let mut buf = fs::read(&path).unwrap();
    *buf.last_mut().unwrap() = 2;
    fs::write(&path, &buf).unwrap();

    let result = Archive::open(
        FileMapping::open(&path).unwrap(),
        ZstdDecompressor::new().unwrap(),
        Xxh3Hasher::default(),
    );
    match result {
        Err(PakError::FutureVersion(2)) => {}
        Err(other) => panic!("expected a future-version rejection, got {other}"),
        Ok(_) => panic!("opened an archive from the future"),
    }
    let message = match Archive::open(
        FileMapping::open(&path).unwrap(),
        ZstdDecompressor::new().unwrap(),
        Xxh3Hasher::default(),
    ) {
        Err(err) => err.to_string(),
        Ok(_) => panic!("opened an archive from the future"),
    };
    assert!(message.contains("future version"), "message was {message:?}");

    *buf.last_mut().unwrap() = 0;
    fs::write(&path, &buf).unwrap();
    let archive = open(&path);
    assert!(archive.lookup("file1.txt").unwrap().is_some());
}

#[test]
fn repeated_builds_are_bit_identical() {
    let source = small_tree();
    let (_out1, path1) = build(source.path());
    let (_out2, path2) = build(source.path());

    let buf1 = fs::read(&path1).unwrap();
    let buf2 = fs::read(&path2).unwrap();
    assert_eq!(buf1, buf2);

    let archive1 = open(&path1);
    let archive2 = open(&path2);
    assert_eq!(archive1.bucket_count(), archive2.bucket_count());
    for name in ["file1.txt", "file2.txt", "file3.txt"] {
        let offset1 = archive1.lookup(name).unwrap().unwrap().offset();
        let offset2 = archive2.lookup(name).unwrap().unwrap().offset();
        assert_eq!(offset1, offset2, "{name} moved between builds");
    }
}

#[test]
fn truncated_bucket_table_is_rejected() {
    let source = small_tree();
    let (_out, path) = build(source.path());

    // Claim far more buckets than the file can hold.
    let mut buf = fs::read(&path).unwrap();
    let huge = buf.len();
    for i in 0..WORD_LEN {
        buf[i] = ((huge >> (8 * i)) & 0xFF) as u8;
    }
    fs::write(&path, &buf).unwrap();

    let result = Archive::open(
        FileMapping::open(&path).unwrap(),
        ZstdDecompressor::new().unwrap(),
        Xxh3Hasher::default(),
    );
    assert!(matches!(result, Err(PakError::Format(_))));
}

#[test]
fn corrupt_bucket_offset_is_rejected_at_the_bucket() {
    let source = small_tree();
    let (_out, path) = build(source.path());
    let mut buf = fs::read(&path).unwrap();

    // Point the first non-empty bucket far outside the file.
    let bucket_count = read_word(&buf, 0);
    let slot = (0..bucket_count)
        .map(|id| WORD_LEN * (1 + id))
        .find(|&slot| read_word(&buf, slot) != 0)
        .expect("an occupied bucket");
    for i in 0..WORD_LEN {
        buf[slot + i] = 0xFF;
    }
    fs::write(&path, &buf).unwrap();

    let archive = open(&path);
    let bad = (0..bucket_count).any(|id| {
        matches!(
            archive.bucket(id),
            Err(PakError::OffsetOutOfBounds { .. })
        )
    });
    assert!(bad, "no bucket reported the corrupt offset");
}
