//! Absolute-path splitting and directory-chain resolution.
//!
//! The path grammar this store supports is deliberately narrow: absolute
//! paths only, no `.`/`..`, no relative paths. There is no `Component`
//! enum here, just a flat list of normal path segments.

use std::fs::File;

use crate::error::{Errno, Result};
use crate::layout;
use crate::superblock::Superblock;

/// Splits an absolute path into its components.
///
/// Returns `Err(())` for anything that isn't a well-formed absolute path:
/// missing leading `/`, empty string, or a component containing a space.
/// Callers decide which [`Errno`] a malformed path maps to, since that
/// differs by operation (`read`/`write`/`unlink` report
/// [`Errno::NotFound`]; `mkdir`/`rmdir` report [`Errno::NotADirectory`]).
pub fn split(path: &str) -> core::result::Result<Vec<&str>, ()> {
	if !path.starts_with('/') {
		return Err(());
	}
	let comps: Vec<&str> = path
		.trim_start_matches('/')
		.split('/')
		.filter(|c| !c.is_empty())
		.collect();
	if comps.iter().any(|c| c.contains(' ')) {
		return Err(());
	}
	Ok(comps)
}

/// Walks `components` from the root, following directory `links[]`
/// entries whose child nodeinfo name matches the next token.
///
/// Bounds every directory scan by both the live count (`nodeinfo.size`)
/// and the slot array length, skipping tombstones — see
/// [`layout::Inode::live_slots`].
pub fn find_blk(file: &File, sb: &Superblock, components: &[&str]) -> Result<u64> {
	let mut cur = sb.root;
	for token in components {
		let inode = layout::load_inode(file, sb, cur)?;
		if inode.mode != layout::Mode::Dir {
			return Err(Errno::NotADirectory);
		}
		let info = layout::load_nodeinfo(file, sb, inode.meta)?;

		let mut found = None;
		for (_, child_blk) in inode.live_slots(info.size) {
			let child_inode = layout::load_inode(file, sb, child_blk)?;
			let child_info = layout::load_nodeinfo(file, sb, child_inode.meta)?;
			if child_info.name() == token.as_bytes() {
				found = Some(child_blk);
				break;
			}
		}
		cur = found.ok_or(Errno::NotFound)?;
	}
	Ok(cur)
}
