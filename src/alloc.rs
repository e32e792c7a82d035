//! The block allocator: a singly-linked on-disk free list with a cached
//! head and count in the superblock.
//!
//! Every free block holds a [`crate::layout::FreePage`] pointing at the
//! next free block; the superblock caches the head of that chain and the
//! live count so neither has to be recomputed by scanning the image.

use std::fs::File;

use crate::error::{Errno, Result};
use crate::layout::{self, FreePage};
use crate::superblock::{self, Superblock};

/// Pops the head of the free list, or returns the sentinel `0` if the list
/// is empty.
///
/// Block `0` is the superblock's own index and is never itself put on the
/// free list, which is what makes "failure = 0" safe as a sentinel here.
/// Callers that want a proper error instead should use
/// [`get_block_or_err`].
pub fn get_block(file: &File, sb: &mut Superblock) -> Result<u64> {
	sb.check_magic()?;
	if sb.freeblks == 0 {
		return Ok(0);
	}
	let blk = sb.freelist;
	let page = layout::load_freepage(file, sb, blk)?;
	sb.freelist = page.next;
	sb.freeblks -= 1;
	superblock::persist(file, sb)?;
	log::trace!("allocated block {blk}, {} free remain", sb.freeblks);
	Ok(blk)
}

/// Pushes `blk` onto the front of the free list.
pub fn put_block(file: &File, sb: &mut Superblock, blk: u64) -> Result<()> {
	sb.check_magic()?;
	let page = FreePage {
		count: 0,
		next: sb.freelist,
	};
	layout::save_freepage(file, sb, blk, &page)?;
	sb.freelist = blk;
	sb.freeblks += 1;
	superblock::persist(file, sb)?;
	log::trace!("released block {blk}, {} free now", sb.freeblks);
	Ok(())
}

/// Allocates a block, mapping exhaustion to [`Errno::NoSpace`] — the
/// convenience most callers in the file engine actually want, since the
/// raw sentinel-`0` contract of [`get_block`] is only useful to a caller
/// that wants to distinguish "no space" from other errors before it has
/// committed to anything.
pub fn get_block_or_err(file: &File, sb: &mut Superblock) -> Result<u64> {
	match get_block(file, sb)? {
		0 => Err(Errno::NoSpace),
		blk => Ok(blk),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::superblock;
	use std::fs::OpenOptions;

	fn fixture(blocks: u64) -> (tempfile::NamedTempFile, File, Superblock) {
		let tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.as_file().set_len(blocks * 64).unwrap();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(tmp.path())
			.unwrap();
		let sb = superblock::format(&file, 64).unwrap();
		(tmp, file, sb)
	}

	#[test]
	fn alloc_then_free_restores_state() {
		let (_tmp, file, mut sb) = fixture(8);
		let before = sb.freeblks;
		let before_head = sb.freelist;
		let blk = get_block(&file, &mut sb).unwrap();
		assert_ne!(blk, 0);
		assert_eq!(sb.freeblks, before - 1);
		put_block(&file, &mut sb, blk).unwrap();
		assert_eq!(sb.freeblks, before);
		assert_eq!(sb.freelist, blk);
		assert_eq!(
			layout::load_freepage(&file, &sb, blk).unwrap().next,
			before_head
		);
	}

	#[test]
	fn exhaustion_returns_sentinel_zero() {
		let (_tmp, file, mut sb) = fixture(4);
		// Exactly one free block exists beyond blocks 0..3.
		let first = get_block(&file, &mut sb).unwrap();
		assert_ne!(first, 0);
		assert_eq!(sb.freeblks, 0);
		assert_eq!(get_block(&file, &mut sb).unwrap(), 0);
	}
}
