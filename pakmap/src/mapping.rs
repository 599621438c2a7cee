//! Memory-mapped file backing for archives
//!
//! The build path sizes the file to the worst case, writes through the
//! mapping, then truncates down to the bytes actually used. Remapping
//! invalidates any view into the old mapping, so [`MemMapper::resize`] is
//! only called at the defined points of a build: before the first write and
//! after the last.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Mmap, MmapMut};
use tracing::debug;

use crate::error::{PakError, Result};

/// A contiguous, optionally resizable byte view of a backing file.
pub trait MemMapper {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_slice(&self) -> &[u8];

    /// Writable view; fails on read-only mappings.
    fn as_mut_slice(&mut self) -> Result<&mut [u8]>;

    /// Truncates (or extends, zero-filled) the backing file to `new_len`
    /// and remaps. Any slice taken before this call is invalidated by the
    /// borrow it holds.
    fn resize(&mut self, new_len: usize) -> Result<()>;
}

enum MapState {
    Unmapped,
    ReadOnly(Mmap),
    Writable(MmapMut),
}

/// Default [`MemMapper`] over a real file.
pub struct FileMapping {
    file: File,
    state: MapState,
    writable: bool,
}

impl FileMapping {
    /// Maps an existing file read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let state = if len == 0 {
            MapState::Unmapped
        } else {
            MapState::ReadOnly(unsafe { Mmap::map(&file)? })
        };
        debug!(?path, len, "mapped archive read-only");
        Ok(Self {
            file,
            state,
            writable: false,
        })
    }

    /// Creates (or truncates) a file for building. The mapping starts empty;
    /// the builder's first `resize` makes it writable at full size.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        debug!(?path, "created archive backing file");
        Ok(Self {
            file,
            state: MapState::Unmapped,
            writable: true,
        })
    }
}

impl MemMapper for FileMapping {
    fn len(&self) -> usize {
        match &self.state {
            MapState::Unmapped => 0,
            MapState::ReadOnly(map) => map.len(),
            MapState::Writable(map) => map.len(),
        }
    }

    fn as_slice(&self) -> &[u8] {
        match &self.state {
            MapState::Unmapped => &[],
            MapState::ReadOnly(map) => map,
            MapState::Writable(map) => map,
        }
    }

    fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        match &mut self.state {
            MapState::Writable(map) => Ok(&mut map[..]),
            MapState::Unmapped if self.writable => Ok(&mut []),
            _ => Err(PakError::Usage("mapping is read-only".into())),
        }
    }

    fn resize(&mut self, new_len: usize) -> Result<()> {
        if !self.writable {
            return Err(PakError::Usage("cannot resize a read-only mapping".into()));
        }
        // Unmap before truncating; shrinking under a live mapping is UB on
        // some platforms.
        self.state = MapState::Unmapped;
        self.file.set_len(new_len as u64)?;
        if new_len > 0 {
            self.state = MapState::Writable(unsafe { MmapMut::map_mut(&self.file)? });
        }
        debug!(new_len, "resized mapping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resize_write_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.pak");

        let mut mapping = FileMapping::create(&path).unwrap();
        assert_eq!(mapping.len(), 0);
        mapping.resize(16).unwrap();
        mapping.as_mut_slice().unwrap()[..4].copy_from_slice(b"pak!");
        mapping.resize(4).unwrap();
        assert_eq!(mapping.as_slice(), b"pak!");
        drop(mapping);

        let reopened = FileMapping::open(&path).unwrap();
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.as_slice(), b"pak!");
    }

    #[test]
    fn grown_regions_are_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.pak");

        let mut mapping = FileMapping::create(&path).unwrap();
        mapping.resize(8).unwrap();
        mapping.as_mut_slice().unwrap().fill(0xFF);
        mapping.resize(4).unwrap();
        mapping.resize(12).unwrap();
        assert_eq!(&mapping.as_slice()[4..], &[0u8; 8]);
    }

    #[test]
    fn read_only_mappings_refuse_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.pak");
        std::fs::write(&path, b"data").unwrap();

        let mut mapping = FileMapping::open(&path).unwrap();
        assert!(mapping.as_mut_slice().is_err());
        assert!(mapping.resize(8).is_err());
        assert_eq!(mapping.as_slice(), b"data");
    }
}
