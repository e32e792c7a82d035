//! Block-aligned byte I/O on the backing image.
//!
//! A thin shim over the backing file: seek to `blk * blksz` and transfer
//! either exactly `blksz` bytes or a caller-specified length. No
//! buffering, no caching — every block read or written here round-trips
//! to the backing file via [`std::os::unix::fs::FileExt`].

use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::error::Result;

/// Reads `buf.len()` bytes (at most `blksz`) from block `blk`.
pub fn read_block(file: &File, blksz: u32, blk: u64, buf: &mut [u8]) -> Result<()> {
	debug_assert!(buf.len() as u64 <= blksz as u64);
	let offset = blk * blksz as u64;
	file.read_exact_at(buf, offset)?;
	Ok(())
}

/// Writes `buf` (at most `blksz` bytes) to block `blk`.
pub fn write_block(file: &File, blksz: u32, blk: u64, buf: &[u8]) -> Result<()> {
	debug_assert!(buf.len() as u64 <= blksz as u64);
	let offset = blk * blksz as u64;
	file.write_all_at(buf, offset)?;
	Ok(())
}
