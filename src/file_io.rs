//! Positional I/O on the single data file.
//!
//! Owns the OS file handle, the magic header, and truncation for `clear`. Reads and
//! writes are positional (`pread`/`pwrite` semantics via [`std::os::unix::fs::FileExt`]),
//! which is what lets disjoint slots be touched concurrently from different threads
//! without an extra lock: the kernel serializes access to the underlying inode, and the
//! Slot invariants guarantee no two live regions overlap.

use crate::slot::{Slot, HEADER_SIZE, MAGIC};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Owns the data file and provides positional record I/O.
pub struct FileBackend {
	file: File,
	path: PathBuf,
}

impl FileBackend {
	/// Opens (creating if necessary) the data file at `path`, creating parent directories
	/// as needed.
	pub fn open_or_create(path: &Path) -> std::io::Result<Self> {
		let file = OpenOptions::new()
			.create(true)
			.read(true)
			.write(true)
			.open(path)?;
		Ok(Self {
			file,
			path: path.to_path_buf(),
		})
	}

	/// Path to the underlying data file, for logging.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Current length of the file in bytes.
	pub fn len(&self) -> std::io::Result<u64> {
		Ok(self.file.metadata()?.len())
	}

	/// Reads the first 4 bytes and compares them to [`MAGIC`].
	pub fn has_magic(&self) -> std::io::Result<bool> {
		if self.len()? < 4 {
			return Ok(false);
		}
		let mut buf = [0u8; 4];
		self.file.read_exact_at(&mut buf, 0)?;
		Ok(&buf == MAGIC)
	}

	/// Writes the magic header at offset 0.
	pub fn write_magic(&self) -> std::io::Result<()> {
		self.file.write_all_at(MAGIC, 0)
	}

	/// Truncates the file to zero bytes and rewrites the magic header.
	pub fn reset(&self) -> std::io::Result<()> {
		self.file.set_len(0)?;
		self.write_magic()
	}

	/// Writes a slot's full record (header, key bytes, value bytes) in a single positional
	/// write.
	pub fn write_record(&self, slot: &Slot, key: &[u8], value: &[u8]) -> std::io::Result<()> {
		let mut buf = Vec::with_capacity(slot.size as usize);
		buf.extend_from_slice(&slot.size.to_be_bytes());
		buf.extend_from_slice(&slot.key_len.to_be_bytes());
		buf.extend_from_slice(&slot.data_len.to_be_bytes());
		buf.extend_from_slice(&slot.expiry_time.to_be_bytes());
		buf.extend_from_slice(key);
		buf.extend_from_slice(value);
		self.file.write_all_at(&buf, slot.offset)
	}

	/// Overwrites just the 4-byte `keyLen` field with zero, marking the slot dead on disk.
	pub fn mark_free(&self, slot_offset: u64) -> std::io::Result<()> {
		self.file.write_all_at(&[0u8; 4], slot_offset + 4)
	}

	/// Reads the fixed 20-byte header at `offset`. Returns `Ok(None)` on a short read
	/// (end of file reached mid-header or exactly at it), which `rebuild_index` treats as
	/// the end of the scan rather than an error.
	pub fn read_header(&self, offset: u64) -> std::io::Result<Option<[u8; HEADER_SIZE as usize]>> {
		let mut buf = [0u8; HEADER_SIZE as usize];
		match self.file.read_exact_at(&mut buf, offset) {
			Ok(()) => Ok(Some(buf)),
			Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Reads `len` bytes at `offset` (used for key bytes during rebuild).
	pub fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
		let mut buf = vec![0u8; len];
		self.file.read_exact_at(&mut buf, offset)?;
		Ok(buf)
	}

	/// Reads a slot's value bytes.
	pub fn read_value(&self, slot: &Slot) -> std::io::Result<Vec<u8>> {
		self.read_at(slot.data_offset(), slot.data_len as usize)
	}
}

/// Decodes a 20-byte header into its four fields: `(size, key_len, data_len, expiry_time)`.
pub fn decode_header(buf: &[u8; HEADER_SIZE as usize]) -> (u32, u32, u32, i64) {
	let size = u32::from_be_bytes(buf[0..4].try_into().unwrap());
	let key_len = u32::from_be_bytes(buf[4..8].try_into().unwrap());
	let data_len = u32::from_be_bytes(buf[8..12].try_into().unwrap());
	let expiry_time = i64::from_be_bytes(buf[12..20].try_into().unwrap());
	(size, key_len, data_len, expiry_time)
}
