//! Exercises the concrete scenarios from the container format's testable-properties list
//! directly against the `Volume` API, backed by an in-memory device so the suite runs without
//! touching the filesystem or a real FUSE mount.

use monofs::device::MemoryDevice;
use monofs::errno;
use monofs::file_io::blocks_for_size;
use monofs::layout::{N_DATA, N_DIR, N_OPEN};
use monofs::volume::Volume;

fn fresh() -> Volume<MemoryDevice> {
    Volume::format(MemoryDevice::formatted()).unwrap()
}

#[test]
fn s1_create_close_reopen_close_unlink_reopen() {
    let mut vol = fresh();
    vol.create("/file", 0, 0, 0o644).unwrap();
    vol.open("/file").unwrap();
    vol.release("/file");
    vol.open("/file").unwrap();
    vol.release("/file");
    vol.unlink("/file").unwrap();
    assert!(vol.open("/file").is_err());
}

#[test]
fn s2_overwrite_inside_existing_content() {
    let mut vol = fresh();
    vol.create("/file", 0, 0, 0o644).unwrap();
    vol.write("/file", 0, b"abcde").unwrap();
    vol.write("/file", 1, b"xyz").unwrap();
    let mut buf = [0u8; 5];
    vol.read("/file", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"axyze");
}

#[test]
fn s3_overwrite_tail_of_existing_content() {
    let mut vol = fresh();
    vol.create("/file", 0, 0, 0o644).unwrap();
    vol.write("/file", 0, b"abcde").unwrap();
    vol.write("/file", 3, b"xyz").unwrap();
    let mut buf = [0u8; 6];
    vol.read("/file", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"abcxyz");
}

#[test]
fn s4_write_past_current_end_leaves_a_gap() {
    let mut vol = fresh();
    vol.create("/file", 0, 0, 0o644).unwrap();
    vol.write("/file", 0, b"abcde").unwrap();
    vol.write("/file", 7, b"xyz").unwrap();

    let mut head = [0u8; 5];
    vol.read("/file", 0, &mut head).unwrap();
    assert_eq!(&head, b"abcde");

    let mut tail = [0u8; 3];
    vol.read("/file", 7, &mut tail).unwrap();
    assert_eq!(&tail, b"xyz");
}

#[test]
fn s5_truncate_down_then_down_again() {
    let mut vol = fresh();
    vol.create("/file", 0, 0, 0o644).unwrap();
    let data = vec![0xABu8; 1024];
    vol.write("/file", 0, &data).unwrap();

    vol.truncate("/file", 512).unwrap();
    assert_eq!(vol.getattr("/file").unwrap().size, 512);

    vol.truncate("/file", 256).unwrap();
    assert_eq!(vol.getattr("/file").unwrap().size, 256);
}

#[test]
fn s6_many_files_written_in_interleaved_strides_read_back_identically() {
    let mut vol = fresh();
    let file_count = 64usize.min(N_DIR);
    let names: Vec<String> = (0..file_count).map(|i| format!("/f{i}")).collect();
    let expected: Vec<Vec<u8>> = (0..file_count)
        .map(|i| (0..1024u32).map(|b| ((b + i as u32) % 256) as u8).collect())
        .collect();

    for name in &names {
        vol.create(name, 0, 0, 0o644).unwrap();
    }

    // Interleave: each file gets one 16-byte stride per round, round-robin across files.
    const STRIDE: usize = 16;
    for round in 0..(1024 / STRIDE) {
        for (i, name) in names.iter().enumerate() {
            let offset = round * STRIDE;
            let chunk = &expected[i][offset..offset + STRIDE];
            vol.write(name, offset as i64, chunk).unwrap();
        }
    }

    for (i, name) in names.iter().enumerate() {
        let mut buf = vec![0u8; 1024];
        vol.read(name, 0, &mut buf).unwrap();
        assert_eq!(buf, expected[i], "file {name} diverged");
    }
}

#[test]
fn s7_the_n_open_plus_one_th_open_is_emfile() {
    let mut vol = fresh();
    let count = N_OPEN.min(N_DIR);
    for i in 0..count {
        let name = format!("/f{i}");
        vol.create(&name, 0, 0, 0o644).unwrap();
        vol.open(&name).unwrap();
    }

    // Unlinking a still-open file frees its directory slot without releasing its open-registry
    // entry, so a brand-new file can be created even though the registry stays at capacity.
    vol.unlink("/f0").unwrap();
    vol.create("/overflow", 0, 0, 0o644).unwrap();

    assert_eq!(vol.open("/overflow").unwrap_err(), errno::EMFILE);
}

#[test]
fn s8_write_past_total_capacity_short_returns() {
    let mut vol = fresh();
    vol.create("/file", 0, 0, 0o644).unwrap();

    let capacity = N_DATA as usize * 512;
    let data = vec![0x5Au8; capacity + 512];
    let written = vol.write("/file", 0, &data).unwrap();
    assert_eq!(written, capacity);

    let mut buf = vec![0u8; capacity];
    let read = vol.read("/file", 0, &mut buf).unwrap();
    assert_eq!(read, capacity);
    assert!(buf.iter().all(|&b| b == 0x5A));
}

#[test]
fn s9_partial_prefix_overwrite_preserves_tail() {
    let mut vol = fresh();
    vol.create("/a", 0, 0, 0o644).unwrap();
    let r: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
    vol.write("/a", 0, &r).unwrap();

    let w: Vec<u8> = (0..768u32).map(|i| (255 - (i % 256)) as u8).collect();
    vol.write("/a", 0, &w).unwrap();

    let mut buf = vec![0u8; 2048];
    vol.read("/a", 0, &mut buf).unwrap();
    assert_eq!(&buf[..768], &w[..]);
    assert_eq!(&buf[768..], &r[768..]);
}

#[test]
fn s10_two_files_written_independently_never_cross_contaminate() {
    let mut vol = fresh();
    vol.create("/a", 0, 0, 0o644).unwrap();
    vol.create("/b", 0, 0, 0o644).unwrap();

    vol.write("/a", 0, &vec![1u8; 768]).unwrap();
    vol.write("/b", 0, &vec![2u8; 768]).unwrap();
    vol.write("/a", 0, &vec![1u8; 2048]).unwrap();
    vol.write("/b", 0, &vec![2u8; 2048]).unwrap();

    let mut buf_a = vec![0u8; 2048];
    vol.read("/a", 0, &mut buf_a).unwrap();
    assert!(buf_a.iter().all(|&b| b == 1));

    let mut buf_b = vec![0u8; 2048];
    vol.read("/b", 0, &mut buf_b).unwrap();
    assert!(buf_b.iter().all(|&b| b == 2));
}

#[test]
fn unlinking_one_file_leaves_others_untouched() {
    let mut vol = fresh();
    vol.create("/a", 0, 0, 0o644).unwrap();
    vol.create("/b", 0, 0, 0o644).unwrap();
    vol.write("/a", 0, &vec![1u8; 1500]).unwrap();
    vol.write("/b", 0, &vec![2u8; 900]).unwrap();

    vol.unlink("/a").unwrap();
    let attr = vol.getattr("/b").unwrap();
    assert_eq!(attr.size, 900);
    let mut buf = vec![0u8; 900];
    vol.read("/b", 0, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 2));

    // The freed blocks are available again: a file that needs them all can be written.
    vol.create("/c", 0, 0, 0o644).unwrap();
    let big = vec![3u8; blocks_for_size(1500) as usize * 512];
    vol.write("/c", 0, &big).unwrap();
    assert_eq!(vol.getattr("/c").unwrap().size, big.len() as u64);
}

#[test]
fn directory_count_bound_is_enforced() {
    let mut vol = fresh();
    for i in 0..N_DIR {
        vol.create(&format!("/f{i}"), 0, 0, 0o644).unwrap();
    }
    assert_eq!(
        vol.create("/overflow", 0, 0, 0o644).unwrap_err(),
        errno::ENOSPC
    );
}
