//! The closed taxonomy of errors this store can raise.
//!
//! Every public operation returns a [`Result`] rather than panicking; there
//! is no retry logic anywhere in the crate since the store is synchronous
//! and has no retriable failure modes.

use std::fmt;

/// An error raised by a store operation.
///
/// This mirrors a classic Unix errno table, but kept as a closed Rust enum
/// instead of an open set of integer constants, since this store's error
/// surface is fixed and small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
	/// `blksz` is smaller than [`crate::superblock::MIN_BLOCK_SIZE`].
	InvalidArgument,
	/// The image is too small at format time, or the free list is
	/// exhausted during a write or `mkdir`.
	NoSpace,
	/// The image is already locked, or `mkdir` lacks the two free blocks
	/// it needs as headroom.
	Busy,
	/// The superblock magic is missing or does not match.
	BadFileDescriptor,
	/// A path component is missing.
	NotFound,
	/// A non-final path component is not a directory, or a parent
	/// directory is missing.
	NotADirectory,
	/// A file operation targets a directory.
	IsADirectory,
	/// `rmdir` was called on a non-empty directory.
	DirectoryNotEmpty,
	/// `mkdir` was called on a path that already exists.
	Exists,
	/// A directory's link array is full.
	TooManyLinks,
	/// A basename is longer than `max_name(sb)`.
	NameTooLong,
	/// The underlying I/O failed; the original [`std::io::ErrorKind`] is
	/// kept around instead of being discarded, so callers can distinguish
	/// e.g. a truncated image from a permissions failure.
	Io(std::io::ErrorKind),
}

/// The result type returned by every store operation.
pub type Result<T> = core::result::Result<T, Errno>;

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidArgument => write!(f, "invalid argument"),
			Self::NoSpace => write!(f, "no space left on device"),
			Self::Busy => write!(f, "device or resource busy"),
			Self::BadFileDescriptor => write!(f, "bad file descriptor"),
			Self::NotFound => write!(f, "no such file or directory"),
			Self::NotADirectory => write!(f, "not a directory"),
			Self::IsADirectory => write!(f, "is a directory"),
			Self::DirectoryNotEmpty => write!(f, "directory not empty"),
			Self::Exists => write!(f, "file exists"),
			Self::TooManyLinks => write!(f, "too many links"),
			Self::NameTooLong => write!(f, "file name too long"),
			Self::Io(kind) => write!(f, "I/O error: {kind}"),
		}
	}
}

impl std::error::Error for Errno {}

impl From<std::io::Error> for Errno {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err.kind())
	}
}
