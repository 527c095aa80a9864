use std::fs;
use std::path::PathBuf;

use libfs::fsck::{run_fsck, VolumeBackend};
use libfs::{
    FsError, InodeKind, Volume, DIRENT_SIZE, INODE_TABLE_START_SECTOR, MAX_FILE_SIZE,
    MAX_OPEN_FILES, SECTOR_SIZE,
};

fn temp_image(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "libfs-props-{}-{}.img",
        std::process::id(),
        name
    ));
    let _ = fs::remove_file(&path);
    path
}

fn pattern(len: usize, seed: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + seed) % 253) as u8).collect()
}

fn assert_clean(vol: &Volume) {
    let rep = run_fsck(&VolumeBackend::new(vol)).unwrap();
    assert!(rep.is_clean(), "{:?}", rep.errors);
}

#[test]
fn contents_survive_sync_and_reboot() {
    let path = temp_image("persist");
    let data = pattern(3 * SECTOR_SIZE + 17, 5);
    {
        let mut vol = Volume::boot(&path).unwrap();
        vol.dir_create("/docs").unwrap();
        vol.file_create("/docs/a.bin").unwrap();
        let fd = vol.file_open("/docs/a.bin").unwrap();
        assert_eq!(vol.file_write(fd, &data).unwrap(), data.len());
        vol.file_close(fd).unwrap();
        vol.sync().unwrap();
    }

    let mut vol = Volume::boot(&path).unwrap();
    assert_eq!(vol.open_files(), 0);
    assert_eq!(vol.stat("/docs/a.bin").unwrap().size, data.len() as u64);
    let fd = vol.file_open("/docs/a.bin").unwrap();
    let mut back = vec![0u8; data.len() + 10];
    assert_eq!(vol.file_read(fd, &mut back).unwrap(), data.len());
    assert_eq!(&back[..data.len()], &data[..]);
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

#[test]
fn unsynced_changes_are_lost() {
    let path = temp_image("nosync");
    {
        let mut vol = Volume::boot(&path).unwrap();
        vol.file_create("/tmp").unwrap();
    }
    let vol = Volume::boot(&path).unwrap();
    assert!(matches!(vol.stat("/tmp"), Err(FsError::NotFound(_))));
    let _ = fs::remove_file(&path);
}

#[test]
fn reads_match_writes_at_every_size() {
    let path = temp_image("sizes");
    let mut vol = Volume::boot(&path).unwrap();
    let sizes = [1, SECTOR_SIZE - 1, SECTOR_SIZE, SECTOR_SIZE + 1, 5 * SECTOR_SIZE + 3, MAX_FILE_SIZE];

    for (i, &len) in sizes.iter().enumerate() {
        let name = format!("/f{}", i);
        let data = pattern(len, i);
        vol.file_create(&name).unwrap();
        let fd = vol.file_open(&name).unwrap();
        assert_eq!(vol.file_write(fd, &data).unwrap(), len);
        assert_eq!(vol.file_seek(fd, 0).unwrap(), 0);

        let mut back = vec![0u8; len];
        assert_eq!(vol.file_read(fd, &mut back).unwrap(), len);
        assert_eq!(back, data);
        assert_eq!(vol.file_read(fd, &mut back).unwrap(), 0);
        vol.file_close(fd).unwrap();
    }
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

#[test]
fn overwrite_in_the_middle_keeps_size() {
    let path = temp_image("overwrite");
    let mut vol = Volume::boot(&path).unwrap();
    vol.file_create("/f").unwrap();
    let fd = vol.file_open("/f").unwrap();
    vol.file_write(fd, &[b'a'; 1000]).unwrap();
    vol.file_seek(fd, 510).unwrap();
    vol.file_write(fd, b"XYZW").unwrap();
    assert_eq!(vol.stat("/f").unwrap().size, 1000);

    vol.file_seek(fd, 508).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(vol.file_read(fd, &mut buf).unwrap(), 8);
    assert_eq!(&buf, b"aaXYZWaa");
    let _ = fs::remove_file(&path);
}

#[test]
fn writes_past_the_maximum_fail() {
    let path = temp_image("toobig");
    let mut vol = Volume::boot(&path).unwrap();
    vol.file_create("/f").unwrap();
    let fd = vol.file_open("/f").unwrap();
    vol.file_write(fd, &vec![1u8; MAX_FILE_SIZE - 4]).unwrap();
    assert!(matches!(
        vol.file_write(fd, &[0u8; 8]),
        Err(FsError::FileTooBig { .. })
    ));
    assert_eq!(vol.stat("/f").unwrap().size, (MAX_FILE_SIZE - 4) as u64);
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

#[test]
fn seek_stays_inside_the_file() {
    let path = temp_image("seek");
    let mut vol = Volume::boot(&path).unwrap();
    vol.file_create("/f").unwrap();
    let fd = vol.file_open("/f").unwrap();
    vol.file_write(fd, b"0123456789").unwrap();

    assert_eq!(vol.file_seek(fd, 10).unwrap(), 10);
    assert!(matches!(
        vol.file_seek(fd, 11),
        Err(FsError::SeekOutOfBounds { offset: 11, size: 10 })
    ));
    assert!(matches!(vol.file_seek(fd, -1), Err(FsError::SeekOutOfBounds { .. })));
    assert!(matches!(vol.file_seek(fd + 1, 0), Err(FsError::BadDescriptor(_))));
    let _ = fs::remove_file(&path);
}

#[test]
fn unlink_rules() {
    let path = temp_image("unlink");
    let mut vol = Volume::boot(&path).unwrap();
    vol.dir_create("/a").unwrap();
    vol.file_create("/a/f").unwrap();

    assert!(matches!(vol.dir_unlink("/a"), Err(FsError::DirectoryNotEmpty)));
    assert!(matches!(vol.dir_unlink("/"), Err(FsError::RootDirectoryProtected)));

    let fd = vol.file_open("/a/f").unwrap();
    assert!(matches!(vol.file_unlink("/a/f"), Err(FsError::FileInUse)));
    vol.file_close(fd).unwrap();
    assert!(matches!(vol.file_close(fd), Err(FsError::BadDescriptor(_))));

    vol.file_unlink("/a/f").unwrap();
    vol.dir_unlink("/a").unwrap();
    assert_eq!(vol.dir_size("/").unwrap(), 0);

    let stats = vol.stats().unwrap();
    assert_eq!(stats.free_sectors, stats.data_sectors);
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

#[test]
fn directory_sizes_count_entries() {
    let path = temp_image("dirsize");
    let mut vol = Volume::boot(&path).unwrap();
    vol.dir_create("/a").unwrap();
    vol.dir_create("/a/b").unwrap();
    vol.file_create("/a/c").unwrap();

    assert_eq!(vol.dir_size("/").unwrap(), DIRENT_SIZE);
    assert_eq!(vol.dir_size("/a").unwrap(), 2 * DIRENT_SIZE);
    assert_eq!(vol.dir_size("/a/b").unwrap(), 0);

    let mut buf = vec![0u8; vol.dir_size("/a").unwrap()];
    assert_eq!(vol.dir_read("/a", &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"b\0");
    assert!(matches!(
        vol.dir_read("/a", &mut buf[..DIRENT_SIZE]),
        Err(FsError::BufferTooSmall { .. })
    ));
    let _ = fs::remove_file(&path);
}

#[test]
fn nested_directories_unlink_inside_out() {
    let path = temp_image("nested");
    let mut vol = Volume::boot(&path).unwrap();
    let fresh = vol.stats().unwrap();

    vol.dir_create("/a").unwrap();
    vol.dir_create("/a/b").unwrap();
    assert_eq!(vol.dir_size("/a").unwrap(), DIRENT_SIZE);
    assert!(matches!(vol.dir_unlink("/a"), Err(FsError::DirectoryNotEmpty)));

    vol.dir_unlink("/a/b").unwrap();
    assert_eq!(vol.dir_size("/a").unwrap(), 0);
    vol.dir_unlink("/a").unwrap();

    assert!(matches!(vol.stat("/a"), Err(FsError::NotFound(_))));
    assert_eq!(vol.stats().unwrap(), fresh);
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

/// Sobrescribe 4 bytes del registro del inodo `ino` en la imagen guardada.
fn patch_inode_field(path: &PathBuf, ino: usize, field_offset: usize, value: u32) {
    let mut image = fs::read(path).unwrap();
    let at = INODE_TABLE_START_SECTOR * SECTOR_SIZE + ino * 128 + field_offset;
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
    fs::write(path, image).unwrap();
}

#[test]
fn fsck_reports_an_oversized_directory() {
    let path = temp_image("oversized");
    {
        let mut vol = Volume::boot(&path).unwrap();
        vol.dir_create("/d").unwrap();
        vol.sync().unwrap();
    }
    patch_inode_field(&path, 0, 0, 10_000);

    let vol = Volume::boot(&path).unwrap();
    // "/d" está en el primer grupo; un nombre ausente obliga a recorrerlos todos.
    assert_eq!(vol.stat("/d").unwrap().kind, InodeKind::Directory);
    assert!(matches!(vol.stat("/x"), Err(FsError::CorruptDirectory { .. })));
    assert!(matches!(vol.dir_list("/"), Err(FsError::CorruptDirectory { .. })));

    let rep = run_fsck(&VolumeBackend::new(&vol)).unwrap();
    assert!(!rep.inodes_ok);
    assert!(rep.errors.iter().any(|e| e.starts_with("Directorio 0: 10000 entradas")));
    assert!(rep.errors.iter().any(|e| e.contains("Inodo 1 huérfano")));
    let _ = fs::remove_file(&path);
}

#[test]
fn fsck_reports_an_unknown_inode_kind() {
    let path = temp_image("badkind");
    {
        let mut vol = Volume::boot(&path).unwrap();
        vol.file_create("/f").unwrap();
        vol.sync().unwrap();
    }
    patch_inode_field(&path, 1, 4, 7);

    let vol = Volume::boot(&path).unwrap();
    let rep = run_fsck(&VolumeBackend::new(&vol)).unwrap();
    assert_eq!(
        rep.errors,
        vec!["Inodo 1: tipo desconocido".to_string()]
    );
    let _ = fs::remove_file(&path);
}

#[test]
fn swap_delete_keeps_remaining_entries() {
    let path = temp_image("swap");
    let mut vol = Volume::boot(&path).unwrap();
    for i in 0..60 {
        vol.file_create(&format!("/n{}", i)).unwrap();
    }
    for i in (0..60).step_by(3) {
        vol.file_unlink(&format!("/n{}", i)).unwrap();
    }

    let mut names: Vec<String> = vol.dir_list("/").unwrap().into_iter().map(|e| e.name).collect();
    names.sort();
    let mut expected: Vec<String> = (0..60).filter(|i| i % 3 != 0).map(|i| format!("n{}", i)).collect();
    expected.sort();
    assert_eq!(names, expected);
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

#[test]
fn open_table_has_a_fixed_size() {
    let path = temp_image("fdlimit");
    let mut vol = Volume::boot(&path).unwrap();
    vol.file_create("/f").unwrap();
    let fds: Vec<_> = (0..MAX_OPEN_FILES).map(|_| vol.file_open("/f").unwrap()).collect();
    assert!(matches!(vol.file_open("/f"), Err(FsError::TooManyOpenFiles)));
    vol.file_close(fds[7]).unwrap();
    assert_eq!(vol.file_open("/f").unwrap(), fds[7]);
    let _ = fs::remove_file(&path);
}

#[test]
fn filling_the_disk_fails_cleanly() {
    let path = temp_image("full");
    let mut vol = Volume::boot(&path).unwrap();
    let chunk = pattern(MAX_FILE_SIZE, 9);

    let mut full = false;
    for i in 0..1000 {
        let name = format!("/big{}", i);
        match vol.file_create(&name) {
            Ok(()) => {}
            Err(FsError::OutOfSpace) => {
                full = true;
                break;
            }
            Err(e) => panic!("create {}: {}", name, e),
        }
        let fd = vol.file_open(&name).unwrap();
        let result = vol.file_write(fd, &chunk);
        vol.file_close(fd).unwrap();
        match result {
            Ok(n) => assert_eq!(n, MAX_FILE_SIZE),
            Err(FsError::OutOfSpace) => {
                full = true;
                break;
            }
            Err(e) => panic!("write {}: {}", name, e),
        }
    }
    assert!(full);
    assert_eq!(vol.stats().unwrap().free_sectors, 0);
    assert_clean(&vol);

    // Lo escrito antes de llenarse sigue intacto
    let fd = vol.file_open("/big0").unwrap();
    let mut back = vec![0u8; MAX_FILE_SIZE];
    assert_eq!(vol.file_read(fd, &mut back).unwrap(), MAX_FILE_SIZE);
    assert_eq!(back, chunk);
    vol.file_close(fd).unwrap();

    // Borrar un archivo devuelve espacio suficiente para otro
    vol.file_unlink("/big1").unwrap();
    vol.file_create("/again").unwrap();
    let fd = vol.file_open("/again").unwrap();
    assert_eq!(vol.file_write(fd, &chunk[..SECTOR_SIZE]).unwrap(), SECTOR_SIZE);
    assert_clean(&vol);
    let _ = fs::remove_file(&path);
}

#[test]
fn names_and_paths_are_validated() {
    let path = temp_image("names");
    let mut vol = Volume::boot(&path).unwrap();
    assert!(matches!(vol.file_create("rel"), Err(FsError::RelativePath(_))));
    assert!(matches!(vol.file_create("/bad name"), Err(FsError::IllegalName(_))));
    assert!(matches!(
        vol.file_create("/abcdefghijklmnop"),
        Err(FsError::NameTooLong(_))
    ));
    vol.file_create("/abcdefghijklmno").unwrap();
    let long = format!("/{}", "a/".repeat(128));
    assert!(matches!(vol.dir_create(&long), Err(FsError::NameTooLong(_))));
    assert_eq!(vol.stat("/abcdefghijklmno").unwrap().kind, InodeKind::File);
    let _ = fs::remove_file(&path);
}
