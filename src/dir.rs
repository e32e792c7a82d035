//! Linking and unlinking a child block into a directory, and listing a
//! directory's live entries.
//!
//! A directory holds its children's head-inode block indices directly in
//! its own `links[]` array — there is no separate directory-entry block,
//! unlike a filesystem that stores variable-length directory entries in
//! dedicated data blocks.

use std::fs::File;

use crate::error::{Errno, Result};
use crate::layout::{self, Mode, SENTINEL_EMPTY};
use crate::superblock::Superblock;

/// Places `child_blk` in the first empty slot of `parent_blk`'s `links[]`.
pub fn link_blk(file: &File, sb: &Superblock, parent_blk: u64, child_blk: u64) -> Result<()> {
	let mut inode = layout::load_inode(file, sb, parent_blk)?;
	if inode.mode != Mode::Dir {
		return Err(Errno::NotADirectory);
	}
	let mut info = layout::load_nodeinfo(file, sb, inode.meta)?;
	if info.size >= sb.max_links() {
		return Err(Errno::TooManyLinks);
	}
	let slot = inode
		.links
		.iter()
		.position(|&v| v == SENTINEL_EMPTY)
		.ok_or(Errno::TooManyLinks)?;
	inode.links[slot] = child_blk;
	info.size += 1;
	layout::save_inode(file, sb, parent_blk, &inode)?;
	layout::save_nodeinfo(file, sb, inode.meta, &info)?;
	Ok(())
}

/// Removes `child_blk` from `parent_blk`'s `links[]`, tombstoning its
/// slot. A no-op (not an error) if `child_blk` isn't present, since every
/// caller already knows the child exists via the path resolver.
pub fn unlink_blk(file: &File, sb: &Superblock, parent_blk: u64, child_blk: u64) -> Result<()> {
	let mut inode = layout::load_inode(file, sb, parent_blk)?;
	let mut info = layout::load_nodeinfo(file, sb, inode.meta)?;

	let slot = inode
		.live_slots(info.size)
		.find(|&(_, v)| v == child_blk)
		.map(|(i, _)| i);
	if let Some(i) = slot {
		inode.links[i] = SENTINEL_EMPTY;
		info.size -= 1;
		layout::save_inode(file, sb, parent_blk, &inode)?;
		layout::save_nodeinfo(file, sb, inode.meta, &info)?;
	}
	Ok(())
}

/// Lists a directory's live entries as a space-separated string, with a
/// trailing `/` on any entry that is itself a directory.
pub fn list_dir(file: &File, sb: &Superblock, dir_blk: u64) -> Result<String> {
	let inode = layout::load_inode(file, sb, dir_blk)?;
	if inode.mode != Mode::Dir {
		return Err(Errno::NotADirectory);
	}
	let info = layout::load_nodeinfo(file, sb, inode.meta)?;

	let mut parts = Vec::new();
	for (_, child_blk) in inode.live_slots(info.size) {
		let child_inode = layout::load_inode(file, sb, child_blk)?;
		let child_info = layout::load_nodeinfo(file, sb, child_inode.meta)?;
		let mut name = String::from_utf8_lossy(child_info.name()).into_owned();
		if child_inode.mode == Mode::Dir {
			name.push('/');
		}
		parts.push(name);
	}
	Ok(parts.join(" "))
}
