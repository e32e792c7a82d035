//! End-to-end scenarios, run against a 64-block, 512-byte-block image.

use blockfs::{Errno, Store};

const BLKSZ: u32 = 512;
const BLOCKS: u64 = 64;

fn fresh_image(blocks: u64) -> (tempfile::TempPath, Store) {
	static INIT_LOGGER: std::sync::Once = std::sync::Once::new();
	INIT_LOGGER.call_once(|| {
		let _ = env_logger::builder().is_test(true).try_init();
	});

	let tmp = tempfile::NamedTempFile::new().unwrap();
	tmp.as_file().set_len(blocks * BLKSZ as u64).unwrap();
	let path = tmp.into_temp_path();
	let store = Store::format(&path, BLKSZ).unwrap();
	(path, store)
}

#[test]
fn scenario_1_format_open_list_root_empty() {
	let (_p, store) = fresh_image(BLOCKS);
	assert_eq!(store.list_dir("/").unwrap(), "");
}

#[test]
fn scenario_2_nested_mkdir_and_list() {
	let (_p, mut store) = fresh_image(BLOCKS);
	store.mkdir("/a").unwrap();
	store.mkdir("/a/b").unwrap();
	assert_eq!(store.list_dir("/a").unwrap(), "b/");
	assert_eq!(store.list_dir("/").unwrap(), "a/");
}

#[test]
fn scenario_3_write_then_read_small_file() {
	let (_p, mut store) = fresh_image(BLOCKS);
	store.mkdir("/a").unwrap();
	store.write_file("/a/f", b"hello").unwrap();
	let mut buf = [0u8; 5];
	assert_eq!(store.read_file("/a/f", &mut buf).unwrap(), 5);
	assert_eq!(&buf, b"hello");
}

#[test]
fn scenario_4_large_file_spills_one_child_and_unlink_restores_space() {
	// L = (512 - 25) / 8 = 60 link slots per inode at this block size.
	let (_p, mut store) = fresh_image(512);
	let l = 60u64;
	let len = (l * BLKSZ as u64 + 10) as usize;
	let buf: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();

	let before = store.free_blocks();
	store.write_file("/big", &buf).unwrap();

	let mut read_back = vec![0u8; len];
	let n = store.read_file("/big", &mut read_back).unwrap();
	assert_eq!(n, len);
	assert_eq!(read_back, buf);

	store.unlink("/big").unwrap();
	assert_eq!(store.free_blocks(), before);
}

#[test]
fn scenario_5_mkdir_exists_then_rmdir_sequence() {
	let (_p, mut store) = fresh_image(BLOCKS);
	store.mkdir("/a").unwrap();
	assert_eq!(store.mkdir("/a"), Err(Errno::Exists));
	store.mkdir("/a/b").unwrap();
	store.rmdir("/a/b").unwrap();
	store.rmdir("/a").unwrap();
}

#[test]
fn scenario_6_directory_link_array_fills_up() {
	// blksz=64 gives L=4, a small enough array to exhaust in a test.
	let tmp = tempfile::NamedTempFile::new().unwrap();
	tmp.as_file().set_len(4096 * 64).unwrap();
	let path = tmp.into_temp_path();
	let mut store = Store::format(&path, 64).unwrap();

	for i in 0..4 {
		store.mkdir(&format!("/d{i}")).unwrap();
	}
	assert_eq!(store.mkdir("/overflow"), Err(Errno::TooManyLinks));
}

#[test]
fn round_trip_overwrite_is_full_replace_not_append() {
	let (_p, mut store) = fresh_image(BLOCKS);
	store.write_file("/f", b"hello world").unwrap();
	store.write_file("/f", b"hi").unwrap();
	let mut buf = [0u8; 32];
	let n = store.read_file("/f", &mut buf).unwrap();
	assert_eq!(&buf[..n], b"hi");
}

#[test]
fn mkdir_rmdir_round_trip_restores_freeblks() {
	let (_p, mut store) = fresh_image(BLOCKS);
	let before = store.free_blocks();
	store.mkdir("/a").unwrap();
	store.rmdir("/a").unwrap();
	assert_eq!(store.free_blocks(), before);
}

#[test]
fn rmdir_nonempty_directory_fails_and_state_unchanged() {
	let (_p, mut store) = fresh_image(BLOCKS);
	store.mkdir("/a").unwrap();
	store.mkdir("/a/b").unwrap();
	assert_eq!(store.rmdir("/a"), Err(Errno::DirectoryNotEmpty));
	assert_eq!(store.list_dir("/a").unwrap(), "b/");
}

#[test]
fn write_exceeding_freeblks_fails_and_leaves_no_trace() {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	tmp.as_file().set_len(8 * BLKSZ as u64).unwrap();
	let path = tmp.into_temp_path();
	let mut store = Store::format(&path, BLKSZ).unwrap();

	let too_big = vec![0u8; 100 * BLKSZ as usize];
	assert_eq!(store.write_file("/f", &too_big), Err(Errno::NoSpace));
	assert_eq!(store.list_dir("/").unwrap(), "");
}

#[test]
fn name_length_boundary() {
	let (_p, mut store) = fresh_image(BLOCKS);
	let max = BLKSZ as usize - 8;
	let ok_name = "a".repeat(max);
	store.write_file(&format!("/{ok_name}"), b"x").unwrap();

	let too_long = "a".repeat(max + 1);
	assert_eq!(
		store.write_file(&format!("/{too_long}"), b"x"),
		Err(Errno::NameTooLong)
	);
}

#[test]
fn reopen_after_close_preserves_contents() {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	tmp.as_file().set_len(BLOCKS * BLKSZ as u64).unwrap();
	let path = tmp.into_temp_path();

	{
		let mut store = Store::format(&path, BLKSZ).unwrap();
		store.mkdir("/a").unwrap();
		store.write_file("/a/f", b"persisted").unwrap();
		store.close().unwrap();
	}

	let store = Store::open(&path).unwrap();
	let mut buf = [0u8; 9];
	assert_eq!(store.read_file("/a/f", &mut buf).unwrap(), 9);
	assert_eq!(&buf, b"persisted");
}

#[test]
fn second_open_of_locked_image_fails_busy() {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	tmp.as_file().set_len(BLOCKS * BLKSZ as u64).unwrap();
	let path = tmp.into_temp_path();
	let _store = Store::format(&path, BLKSZ).unwrap();

	assert!(matches!(Store::open(&path), Err(Errno::Busy)));
}
