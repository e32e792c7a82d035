//! The superblock: the image's global header, loaded once at mount time and
//! re-persisted on every allocator mutation.
//!
//! It lives at block 0 and is encoded through the same explicit
//! little-endian codec as every other on-disk record (see the `layout`
//! module doc comment for why).

use std::fs::File;

use crate::error::{Errno, Result};
use crate::io;
use crate::layout::{self, FreePage, Inode, Mode, Nodeinfo};

/// Sentinel magic identifying a formatted image.
pub const MAGIC: u32 = 0xdcc6_05f5;

/// The smallest block size this store will format or mount. Chosen so an
/// inode header plus one link slot, and a nodeinfo header plus a one-byte
/// name, both comfortably fit.
pub const MIN_BLOCK_SIZE: u32 = 64;
/// The smallest image this store will format: enough for the superblock,
/// root inode, root nodeinfo and at least one free block.
pub const MIN_BLOCK_COUNT: u64 = 4;

pub const SUPERBLOCK_BLK: u64 = 0;
pub const ROOT_INODE_BLK: u64 = 1;
pub const ROOT_INFO_BLK: u64 = 2;
pub const FREE_LIST_BLK: u64 = 3;

/// The fixed on-disk width of the superblock record, independent of
/// `blksz` — mounting reads exactly this many bytes from offset 0 before
/// `blksz` itself is known.
const RECORD_SIZE: usize = 4 + 4 + 8 + 8 + 8 + 8;

/// The in-memory mount handle: the persisted fields plus nothing else —
/// the backing file descriptor is kept separately by [`crate::store::Store`]
/// since it is a transient handle, never itself persisted to the image.
#[derive(Debug, Clone)]
pub struct Superblock {
	pub magic: u32,
	pub blksz: u32,
	pub blks: u64,
	pub freeblks: u64,
	pub root: u64,
	pub freelist: u64,
}

impl Superblock {
	fn encode(&self) -> [u8; RECORD_SIZE] {
		let mut buf = [0u8; RECORD_SIZE];
		buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
		buf[4..8].copy_from_slice(&self.blksz.to_le_bytes());
		buf[8..16].copy_from_slice(&self.blks.to_le_bytes());
		buf[16..24].copy_from_slice(&self.freeblks.to_le_bytes());
		buf[24..32].copy_from_slice(&self.root.to_le_bytes());
		buf[32..40].copy_from_slice(&self.freelist.to_le_bytes());
		buf
	}

	fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
		Self {
			magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
			blksz: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
			blks: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
			freeblks: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
			root: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
			freelist: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
		}
	}

	/// Fails [`Errno::BadFileDescriptor`] unless the magic matches — every
	/// operation past mount time calls this first.
	pub fn check_magic(&self) -> Result<()> {
		if self.magic != MAGIC {
			return Err(Errno::BadFileDescriptor);
		}
		Ok(())
	}

	pub fn max_links(&self) -> u64 {
		layout::max_links(self.blksz)
	}

	pub fn max_name(&self) -> u64 {
		layout::max_name(self.blksz)
	}
}

/// Writes the superblock's full block, zero-padded past the record.
pub fn persist(file: &File, sb: &Superblock) -> Result<()> {
	let mut buf = vec![0u8; sb.blksz as usize];
	buf[..RECORD_SIZE].copy_from_slice(&sb.encode());
	io::write_block(file, sb.blksz, SUPERBLOCK_BLK, &buf)
}

/// Validates that `file` is large enough to hold `blks >= MIN_BLOCK_COUNT`
/// blocks of `blksz` bytes, without writing anything. Split out of
/// [`format`] so a caller can reject an undersized image before taking any
/// exclusive lock on it.
pub fn check_size(file: &File, blksz: u32) -> Result<u64> {
	let len = file.metadata()?.len();
	let blks = len / blksz as u64;
	if blks < MIN_BLOCK_COUNT {
		return Err(Errno::NoSpace);
	}
	Ok(blks)
}

/// Formats a fresh image: writes the superblock, root inode, root
/// nodeinfo and initializes the free list.
pub fn format(file: &File, blksz: u32) -> Result<Superblock> {
	if blksz < MIN_BLOCK_SIZE {
		return Err(Errno::InvalidArgument);
	}
	let blks = check_size(file, blksz)?;

	let sb = Superblock {
		magic: MAGIC,
		blksz,
		blks,
		freeblks: blks - 3,
		root: ROOT_INODE_BLK,
		freelist: FREE_LIST_BLK,
	};
	persist(file, &sb)?;

	let root_inode = Inode::new(Mode::Dir, SUPERBLOCK_BLK, ROOT_INFO_BLK, sb.max_links());
	layout::save_inode(file, &sb, ROOT_INODE_BLK, &root_inode)?;

	let mut root_info = Nodeinfo::new(sb.max_name());
	root_info.set_name(b"/")?;
	root_info.size = 0;
	layout::save_nodeinfo(file, &sb, ROOT_INFO_BLK, &root_info)?;

	for i in sb.freelist..sb.blks {
		let next = if i == sb.blks - 1 { 0 } else { i + 1 };
		let page = FreePage { count: 0, next };
		layout::save_freepage(file, &sb, i, &page)?;
	}

	Ok(sb)
}

/// Reads and validates the superblock of an already-formatted image.
pub fn open(file: &File) -> Result<Superblock> {
	let mut buf = [0u8; RECORD_SIZE];
	use std::os::unix::fs::FileExt;
	file.read_exact_at(&mut buf, 0)?;
	let sb = Superblock::decode(&buf);
	sb.check_magic()?;
	Ok(sb)
}
