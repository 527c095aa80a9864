// src/dir.rs
//
// Entradas de directorio: registros (nombre, inodo) empaquetados
// DIRENTS_PER_SECTOR por sector, direccionados por posición. La posición `p`
// vive en el grupo `p / DIRENTS_PER_SECTOR`, es decir en el sector
// `dir.data[grupo]`.

use log::debug;

use crate::bitmap::Bitmap;
use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::layout::{
    decode, dirent_location, encode_into, DirEntryDisk, InodeDisk, InodeKind, Sector,
    DIRENTS_PER_SECTOR, DIRENT_SIZE, MAX_DIR_ENTRIES, SECTOR_SIZE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
    pub kind: InodeKind,
}

// --------- Recorrido ---------

/// Sector del grupo `group`; un puntero en 0 o fuera del arreglo es un
/// directorio roto, nunca el superblock.
fn group_sector(dir: &InodeDisk, group: usize) -> Result<usize> {
    match dir.data.get(group) {
        Some(&s) if s != 0 => Ok(s as usize),
        _ => Err(FsError::CorruptDirectory {
            group,
            size: dir.size,
        }),
    }
}

/// Recorre las entradas válidas en orden de posición hasta que `pred`
/// devuelva true; devuelve esa posición y su entrada.
fn scan<D, F>(dev: &D, dir: &InodeDisk, mut pred: F) -> Result<Option<(usize, DirEntryDisk)>>
where
    D: BlockDevice + ?Sized,
    F: FnMut(&DirEntryDisk) -> bool,
{
    let size = dir.size as usize;
    let mut buf: Sector = [0; SECTOR_SIZE];

    for group in 0..(size + DIRENTS_PER_SECTOR - 1) / DIRENTS_PER_SECTOR {
        dev.read_sector(group_sector(dir, group)?, &mut buf)?;
        let valid = (size - group * DIRENTS_PER_SECTOR).min(DIRENTS_PER_SECTOR);
        for slot in 0..valid {
            let off = slot * DIRENT_SIZE;
            let entry: DirEntryDisk = decode(&buf[off..off + DIRENT_SIZE])?;
            if pred(&entry) {
                return Ok(Some((group * DIRENTS_PER_SECTOR + slot, entry)));
            }
        }
    }
    Ok(None)
}

pub fn find_entry<D: BlockDevice + ?Sized>(dev: &D, dir: &InodeDisk, name: &str) -> Result<Option<u32>> {
    Ok(scan(dev, dir, |e| e.name_is(name))?.map(|(_, e)| e.inode))
}

pub fn list_entries<D: BlockDevice + ?Sized>(dev: &D, dir: &InodeDisk) -> Result<Vec<DirEntryDisk>> {
    let mut out = Vec::with_capacity(dir.size as usize);
    scan(dev, dir, |e| {
        out.push(*e);
        false
    })?;
    Ok(out)
}

/// Copia los registros crudos de las entradas válidas en `out`, sector por
/// sector. `out` debe tener espacio para `size * DIRENT_SIZE` bytes.
pub fn read_raw<D: BlockDevice + ?Sized>(dev: &D, dir: &InodeDisk, out: &mut [u8]) -> Result<usize> {
    let size = dir.size as usize;
    let needed = size * DIRENT_SIZE;
    if out.len() < needed {
        return Err(FsError::BufferTooSmall {
            needed,
            got: out.len(),
        });
    }

    let mut buf: Sector = [0; SECTOR_SIZE];
    let mut copied = 0;
    for group in 0..(size + DIRENTS_PER_SECTOR - 1) / DIRENTS_PER_SECTOR {
        dev.read_sector(group_sector(dir, group)?, &mut buf)?;
        let valid = (size - group * DIRENTS_PER_SECTOR).min(DIRENTS_PER_SECTOR);
        let bytes = valid * DIRENT_SIZE;
        out[copied..copied + bytes].copy_from_slice(&buf[..bytes]);
        copied += bytes;
    }
    Ok(size)
}

// --------- Mutación ---------

/// Agrega la entrada en la posición `dir.size`. Si la posición abre un grupo
/// nuevo se reserva un sector de datos. El llamador persiste `dir`.
pub fn append_entry<D: BlockDevice + ?Sized>(
    dev: &mut D,
    dir: &mut InodeDisk,
    name: &str,
    child: u32,
) -> Result<()> {
    let pos = dir.size as usize;
    if pos >= MAX_DIR_ENTRIES {
        return Err(FsError::OutOfSpace);
    }

    let (group, offset) = dirent_location(pos);
    let mut buf: Sector = [0; SECTOR_SIZE];
    if offset == 0 {
        let sector = Bitmap::sector_map()
            .first_unused(dev)?
            .ok_or(FsError::OutOfSpace)?;
        dir.data[group] = sector as u32;
        debug!("dir: sector {} nuevo para el grupo {}", sector, group);
    } else {
        dev.read_sector(group_sector(dir, group)?, &mut buf)?;
    }

    encode_into(&DirEntryDisk::new(name, child), &mut buf[offset..offset + DIRENT_SIZE])?;
    dev.write_sector(dir.data[group] as usize, &buf)?;
    dir.size += 1;
    debug!(
        "dir: entrada {} (name = {:?}, inode = {}) en el sector {}",
        pos, name, child, dir.data[group]
    );
    Ok(())
}

/// Quita la entrada que apunta a `child`: la última entrada ocupa su lugar y
/// el tamaño baja en uno. Si el último grupo queda vacío su sector se libera.
/// El llamador persiste `dir`.
pub fn remove_entry<D: BlockDevice + ?Sized>(dev: &mut D, dir: &mut InodeDisk, child: u32) -> Result<()> {
    let (pos, _) = scan(dev, dir, |e| e.inode == child)?
        .ok_or_else(|| FsError::NotFound(format!("entrada del inodo {child}")))?;

    let last = dir.size as usize - 1;
    let (last_group, last_off) = dirent_location(last);
    let mut last_buf: Sector = [0; SECTOR_SIZE];
    dev.read_sector(group_sector(dir, last_group)?, &mut last_buf)?;

    if pos != last {
        let moved: DirEntryDisk = decode(&last_buf[last_off..last_off + DIRENT_SIZE])?;
        let (group, off) = dirent_location(pos);
        if group == last_group {
            encode_into(&moved, &mut last_buf[off..off + DIRENT_SIZE])?;
        } else {
            let mut buf: Sector = [0; SECTOR_SIZE];
            dev.read_sector(group_sector(dir, group)?, &mut buf)?;
            encode_into(&moved, &mut buf[off..off + DIRENT_SIZE])?;
            dev.write_sector(dir.data[group] as usize, &buf)?;
        }
        debug!("dir: entrada {} movida a la posición {}", last, pos);
    }

    encode_into(&DirEntryDisk::empty(), &mut last_buf[last_off..last_off + DIRENT_SIZE])?;
    dev.write_sector(dir.data[last_group] as usize, &last_buf)?;
    dir.size -= 1;

    if last_off == 0 {
        Bitmap::sector_map().reset(dev, dir.data[last_group] as usize)?;
        debug!("dir: liberado el sector {} del grupo {}", dir.data[last_group], last_group);
        dir.data[last_group] = 0;
    }
    Ok(())
}
