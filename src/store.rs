//! The mounted store: ties the allocator, inode layer, path resolver and
//! directory layer together behind the ten public operations.
//!
//! [`Store::format`] and [`Store::open`] acquire an exclusive advisory
//! lock on the backing file for the lifetime of the handle. The
//! whole-file read/write engine walks a regular file's inode chain one
//! data block at a time, allocating or releasing spill inodes as the
//! chain grows or shrinks.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path as StdPath;

use crate::alloc;
use crate::error::{Errno, Result};
use crate::layout::{self, Inode, Mode, Nodeinfo, SENTINEL_EMPTY};
use crate::path;
use crate::superblock::{self, Superblock};

fn ceil_div(a: u64, b: u64) -> u64 {
	if a == 0 {
		0
	} else {
		(a + b - 1) / b
	}
}

/// Acquires a non-blocking exclusive advisory lock on `file`.
fn lock_exclusive(file: &File) -> Result<()> {
	let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
	if ret != 0 {
		let err = io::Error::last_os_error();
		return match err.raw_os_error() {
			Some(libc::EWOULDBLOCK) => Err(Errno::Busy),
			_ => Err(err.into()),
		};
	}
	Ok(())
}

fn unlock(file: &File) {
	// Best-effort: the handle is being dropped either way.
	unsafe {
		libc::flock(file.as_raw_fd(), libc::LOCK_UN);
	}
}

/// A mounted image. Holds the only cached piece of durable state (the
/// superblock) and the backing file handle under an exclusive lock for
/// the session's lifetime.
pub struct Store {
	file: File,
	sb: Superblock,
}

impl Store {
	/// Formats `path` as a fresh image with the given block size.
	pub fn format<P: AsRef<StdPath>>(path: P, blksz: u32) -> Result<Self> {
		if blksz < superblock::MIN_BLOCK_SIZE {
			return Err(Errno::InvalidArgument);
		}
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		superblock::check_size(&file, blksz)?;
		lock_exclusive(&file)?;
		let sb = superblock::format(&file, blksz)?;
		log::debug!(
			"formatted image: {} blocks of {} bytes, {} free",
			sb.blks,
			sb.blksz,
			sb.freeblks
		);
		Ok(Self { file, sb })
	}

	/// Mounts an already-formatted image.
	pub fn open<P: AsRef<StdPath>>(path: P) -> Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		lock_exclusive(&file)?;
		let sb = superblock::open(&file)?;
		log::debug!("mounted image: {} blocks of {} bytes", sb.blks, sb.blksz);
		Ok(Self { file, sb })
	}

	/// Releases the lock and closes the backing handle.
	pub fn close(self) -> Result<()> {
		unlock(&self.file);
		Ok(())
	}

	/// Allocates a block, returning the sentinel `0` on exhaustion.
	pub fn get_block(&mut self) -> Result<u64> {
		alloc::get_block(&self.file, &mut self.sb)
	}

	/// Returns a block to the free list.
	pub fn put_block(&mut self, blk: u64) -> Result<()> {
		alloc::put_block(&self.file, &mut self.sb, blk)
	}

	/// The number of blocks currently on the free list.
	pub fn free_blocks(&self) -> u64 {
		self.sb.freeblks
	}

	/// Reads up to `bufsz` bytes of `fname` into `buf`, returning the
	/// number of bytes actually copied.
	pub fn read_file(&self, fname: &str, buf: &mut [u8]) -> Result<usize> {
		self.sb.check_magic()?;
		if buf.is_empty() {
			return Ok(0);
		}
		let comps = path::split(fname).map_err(|_| Errno::NotFound)?;
		let blk = path::find_blk(&self.file, &self.sb, &comps)?;
		let head = layout::load_inode(&self.file, &self.sb, blk)?;
		if head.mode != Mode::Reg {
			return Err(Errno::IsADirectory);
		}
		let info = layout::load_nodeinfo(&self.file, &self.sb, head.meta)?;

		let n = (info.size as usize).min(buf.len());
		let l = self.sb.max_links() as usize;
		let blksz = self.sb.blksz as u64;

		let mut current = head;
		let mut copied = 0usize;
		let mut j: u64 = 0;
		while copied < n {
			let i = (j % l as u64) as usize;
			if i == 0 && j > 0 {
				if current.next == SENTINEL_EMPTY || current.next == 0 {
					break;
				}
				current = layout::load_inode(&self.file, &self.sb, current.next)?;
			}
			let data_blk = current.links[i];
			let want = (n - copied).min(blksz as usize);
			if data_blk != SENTINEL_EMPTY {
				let mut tmp = vec![0u8; blksz as usize];
				crate::io::read_block(&self.file, self.sb.blksz, data_blk, &mut tmp)?;
				buf[copied..copied + want].copy_from_slice(&tmp[..want]);
			}
			copied += want;
			j += 1;
		}
		Ok(copied)
	}

	/// Writes `buf` as the whole content of `fname`, creating it if
	/// absent and resizing it in place otherwise.
	pub fn write_file(&mut self, fname: &str, buf: &[u8]) -> Result<()> {
		self.sb.check_magic()?;
		let comps = path::split(fname).map_err(|_| Errno::NotFound)?;
		if comps.is_empty() {
			return Err(Errno::IsADirectory);
		}
		let cnt = buf.len() as u64;
		let l = self.sb.max_links();
		let blksz = self.sb.blksz as u64;

		#[derive(Clone, Copy)]
		enum Target {
			Existing { head: u64, meta: u64, used: u64, child_used: u64 },
			New { parent: u64, head: u64, meta: u64 },
		}

		let target = match path::find_blk(&self.file, &self.sb, &comps) {
			Ok(blk) => {
				let inode = layout::load_inode(&self.file, &self.sb, blk)?;
				if inode.mode != Mode::Reg {
					return Err(Errno::IsADirectory);
				}
				let info = layout::load_nodeinfo(&self.file, &self.sb, inode.meta)?;
				let used = ceil_div(info.size, blksz);
				let child_used = ceil_div(used, l).saturating_sub(if used == 0 { 0 } else { 1 });
				Target::Existing {
					head: blk,
					meta: inode.meta,
					used,
					child_used,
				}
			}
			Err(_) => {
				let (parent_comps, base) = comps.split_at(comps.len() - 1);
				let basename = base[0];
				let parent_blk = path::find_blk(&self.file, &self.sb, parent_comps)
					.map_err(|_| Errno::NotADirectory)?;
				let parent_inode = layout::load_inode(&self.file, &self.sb, parent_blk)?;
				if parent_inode.mode != Mode::Dir {
					return Err(Errno::NotADirectory);
				}
				if basename.len() as u64 > self.sb.max_name() {
					return Err(Errno::NameTooLong);
				}

				let head = alloc::get_block_or_err(&self.file, &mut self.sb)?;
				if let Err(e) = crate::dir::link_blk(&self.file, &self.sb, parent_blk, head) {
					self.put_block(head)?;
					return Err(e);
				}
				let meta = match alloc::get_block_or_err(&self.file, &mut self.sb) {
					Ok(m) => m,
					Err(e) => {
						crate::dir::unlink_blk(&self.file, &self.sb, parent_blk, head)?;
						self.put_block(head)?;
						return Err(e);
					}
				};

				let new_inode = Inode::new(Mode::Reg, parent_blk, meta, l);
				layout::save_inode(&self.file, &self.sb, head, &new_inode)?;
				let mut new_info = Nodeinfo::new(self.sb.max_name());
				new_info.set_name(basename.as_bytes())?;
				layout::save_nodeinfo(&self.file, &self.sb, meta, &new_info)?;

				Target::New {
					parent: parent_blk,
					head,
					meta,
				}
			}
		};

		let need = ceil_div(cnt, blksz);
		let child_need = ceil_div(need, l).saturating_sub(if need == 0 { 0 } else { 1 });

		let (head_blk, meta_blk, used, child_used) = match target {
			Target::Existing {
				head,
				meta,
				used,
				child_used,
			} => (head, meta, used, child_used),
			Target::New { head, meta, .. } => (head, meta, 0, 0),
		};

		let delta = need.saturating_sub(used) + child_need.saturating_sub(child_used);
		if delta > self.sb.freeblks {
			if let Target::New { parent, head, meta } = target {
				crate::dir::unlink_blk(&self.file, &self.sb, parent, head)?;
				self.put_block(meta)?;
				self.put_block(head)?;
			}
			return Err(Errno::NoSpace);
		}

		let mut info = layout::load_nodeinfo(&self.file, &self.sb, meta_blk)?;
		info.size = cnt;
		layout::save_nodeinfo(&self.file, &self.sb, meta_blk, &info)?;

		let mut current_blk = head_blk;
		let mut current = layout::load_inode(&self.file, &self.sb, head_blk)?;
		let mut j: u64 = 0;
		while j < need {
			let i = (j % l) as usize;
			if i == 0 && j > 0 {
				let next_blk = if current.next != 0 {
					current.next
				} else {
					let new_blk = alloc::get_block_or_err(&self.file, &mut self.sb)?;
					current.next = new_blk;
					layout::save_inode(&self.file, &self.sb, current_blk, &current)?;
					let child = Inode::new(Mode::Child, current_blk, head_blk, l);
					layout::save_inode(&self.file, &self.sb, new_blk, &child)?;
					new_blk
				};
				current_blk = next_blk;
				current = layout::load_inode(&self.file, &self.sb, current_blk)?;
			}

			let slot = current.links[i];
			let data_blk = if slot == SENTINEL_EMPTY {
				let nb = alloc::get_block_or_err(&self.file, &mut self.sb)?;
				current.links[i] = nb;
				nb
			} else {
				slot
			};

			let offset = j * blksz;
			let want = (cnt - offset).min(blksz) as usize;
			crate::io::write_block(
				&self.file,
				self.sb.blksz,
				data_blk,
				&buf[offset as usize..offset as usize + want],
			)?;
			j += 1;
		}
		// Reclaim any trailing slots in the current inode beyond `need`.
		let last_i = if need == 0 { 0 } else { ((need - 1) % l) as usize + 1 };
		let leftover = current.next;
		for k in last_i..current.links.len() {
			if current.links[k] != SENTINEL_EMPTY {
				self.put_block(current.links[k])?;
				current.links[k] = SENTINEL_EMPTY;
			}
		}
		current.next = 0;
		layout::save_inode(&self.file, &self.sb, current_blk, &current)?;

		// Release any leftover IMCHILD chain from a shrink.
		let mut next = leftover;
		while next != 0 {
			let child = layout::load_inode(&self.file, &self.sb, next)?;
			for &slot in &child.links {
				if slot != SENTINEL_EMPTY {
					self.put_block(slot)?;
				}
			}
			let after = child.next;
			self.put_block(next)?;
			next = after;
		}

		Ok(())
	}

	/// Removes a regular file and every block reachable from it.
	pub fn unlink(&mut self, fname: &str) -> Result<()> {
		self.sb.check_magic()?;
		let comps = path::split(fname).map_err(|_| Errno::NotFound)?;
		if comps.is_empty() {
			return Err(Errno::IsADirectory);
		}
		let head_blk = path::find_blk(&self.file, &self.sb, &comps)?;
		let head = layout::load_inode(&self.file, &self.sb, head_blk)?;
		if head.mode != Mode::Reg {
			return Err(Errno::IsADirectory);
		}

		let (parent_comps, _) = comps.split_at(comps.len() - 1);
		let parent_blk = path::find_blk(&self.file, &self.sb, parent_comps)?;
		crate::dir::unlink_blk(&self.file, &self.sb, parent_blk, head_blk)?;
		self.put_block(head.meta)?;

		let mut next = head.next;
		for &slot in &head.links {
			if slot != SENTINEL_EMPTY {
				self.put_block(slot)?;
			}
		}
		while next != 0 {
			let child = layout::load_inode(&self.file, &self.sb, next)?;
			for &slot in &child.links {
				if slot != SENTINEL_EMPTY {
					self.put_block(slot)?;
				}
			}
			let after = child.next;
			self.put_block(next)?;
			next = after;
		}
		self.put_block(head_blk)?;
		Ok(())
	}

	/// Creates an empty directory.
	pub fn mkdir(&mut self, dname: &str) -> Result<()> {
		self.sb.check_magic()?;
		let comps = path::split(dname).map_err(|_| Errno::NotADirectory)?;
		if comps.is_empty() {
			return Err(Errno::Exists);
		}
		if self.sb.freeblks < 2 {
			return Err(Errno::Busy);
		}
		if path::find_blk(&self.file, &self.sb, &comps).is_ok() {
			return Err(Errno::Exists);
		}
		let (parent_comps, base) = comps.split_at(comps.len() - 1);
		let basename = base[0];
		if basename.len() as u64 > self.sb.max_name() {
			return Err(Errno::NameTooLong);
		}
		let parent_blk =
			path::find_blk(&self.file, &self.sb, parent_comps).map_err(|_| Errno::NotADirectory)?;
		let parent_inode = layout::load_inode(&self.file, &self.sb, parent_blk)?;
		if parent_inode.mode != Mode::Dir {
			return Err(Errno::NotADirectory);
		}

		let head = alloc::get_block_or_err(&self.file, &mut self.sb)?;
		if let Err(e) = crate::dir::link_blk(&self.file, &self.sb, parent_blk, head) {
			self.put_block(head)?;
			return Err(e);
		}
		let meta = match alloc::get_block_or_err(&self.file, &mut self.sb) {
			Ok(m) => m,
			Err(e) => {
				crate::dir::unlink_blk(&self.file, &self.sb, parent_blk, head)?;
				self.put_block(head)?;
				return Err(e);
			}
		};

		let inode = Inode::new(Mode::Dir, parent_blk, meta, self.sb.max_links());
		layout::save_inode(&self.file, &self.sb, head, &inode)?;
		let mut info = Nodeinfo::new(self.sb.max_name());
		info.set_name(basename.as_bytes())?;
		info.size = 0;
		layout::save_nodeinfo(&self.file, &self.sb, meta, &info)?;

		log::debug!("mkdir {dname} -> block {head}");
		Ok(())
	}

	/// Removes an empty directory.
	pub fn rmdir(&mut self, dname: &str) -> Result<()> {
		self.sb.check_magic()?;
		let comps = path::split(dname).map_err(|_| Errno::NotADirectory)?;
		if comps.is_empty() {
			// Root is never removable.
			return Err(Errno::Busy);
		}
		let blk = path::find_blk(&self.file, &self.sb, &comps)?;
		let inode = layout::load_inode(&self.file, &self.sb, blk)?;
		if inode.mode != Mode::Dir {
			return Err(Errno::NotADirectory);
		}
		let info = layout::load_nodeinfo(&self.file, &self.sb, inode.meta)?;
		if info.size != 0 {
			return Err(Errno::DirectoryNotEmpty);
		}

		let (parent_comps, _) = comps.split_at(comps.len() - 1);
		let parent_blk = path::find_blk(&self.file, &self.sb, parent_comps)?;
		crate::dir::unlink_blk(&self.file, &self.sb, parent_blk, blk)?;
		self.put_block(inode.meta)?;
		self.put_block(blk)?;
		Ok(())
	}

	/// Lists a directory's entries.
	pub fn list_dir(&self, dname: &str) -> Result<String> {
		self.sb.check_magic()?;
		let comps = path::split(dname).map_err(|_| Errno::NotFound)?;
		let blk = path::find_blk(&self.file, &self.sb, &comps)?;
		crate::dir::list_dir(&self.file, &self.sb, blk)
	}
}

impl Drop for Store {
	fn drop(&mut self) {
		unlock(&self.file);
	}
}
