// src/inode.rs
use log::{debug, warn};

use crate::bitmap::Bitmap;
use crate::dir;
use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::layout::{
    decode, encode_into, inode_location, InodeDisk, InodeKind, Sector, INODE_SIZE, MAX_FILES,
    SECTOR_SIZE,
};

fn check_ino(ino: u32) -> Result<()> {
    if ino as usize >= MAX_FILES {
        return Err(FsError::InvalidInode(ino));
    }
    Ok(())
}

/// Registro `ino` extraído de un sector de la tabla ya leído.
pub fn inode_in_sector(sector: &Sector, ino: u32) -> Result<InodeDisk> {
    let (_, off) = inode_location(ino);
    decode(&sector[off..off + INODE_SIZE])
}

pub fn load_inode<D: BlockDevice + ?Sized>(dev: &D, ino: u32) -> Result<InodeDisk> {
    check_ino(ino)?;
    let (sector, _) = inode_location(ino);
    let mut buf: Sector = [0; SECTOR_SIZE];
    dev.read_sector(sector, &mut buf)?;
    inode_in_sector(&buf, ino)
}

/// Reescribe sólo el registro `ino` dentro de su sector.
pub fn store_inode<D: BlockDevice + ?Sized>(dev: &mut D, ino: u32, inode: &InodeDisk) -> Result<()> {
    check_ino(ino)?;
    let (sector, off) = inode_location(ino);
    let mut buf: Sector = [0; SECTOR_SIZE];
    dev.read_sector(sector, &mut buf)?;
    encode_into(inode, &mut buf[off..off + INODE_SIZE])?;
    dev.write_sector(sector, &buf)?;
    Ok(())
}

/// Crea un inodo de tipo `kind` y lo enlaza como `name` dentro de `parent`.
pub fn add_inode<D: BlockDevice + ?Sized>(
    dev: &mut D,
    kind: InodeKind,
    parent: u32,
    name: &str,
) -> Result<u32> {
    let inodes = Bitmap::inode_map();
    let child = match inodes.first_unused(dev)? {
        Some(ino) => ino as u32,
        None => {
            warn!("add_inode: la tabla de inodos está llena");
            return Err(FsError::OutOfInodes);
        }
    };
    store_inode(dev, child, &InodeDisk::empty(kind))?;
    debug!("add_inode: inodo {} ({:?}) reservado", child, kind);

    if let Err(e) = link(dev, parent, name, child) {
        // Sin enlace el inodo quedaría inalcanzable: se devuelve su bit.
        inodes.reset(dev, child as usize)?;
        return Err(e);
    }
    Ok(child)
}

fn link<D: BlockDevice + ?Sized>(dev: &mut D, parent: u32, name: &str, child: u32) -> Result<()> {
    let mut dir_inode = load_inode(dev, parent)?;
    if !dir_inode.is_dir() {
        return Err(FsError::NotADirectory);
    }
    dir::append_entry(dev, &mut dir_inode, name, child)?;
    store_inode(dev, parent, &dir_inode)?;
    debug!(
        "add_inode: {:?} -> {} enlazado en {} (size = {})",
        name, child, parent, dir_inode.size
    );
    Ok(())
}

/// Libera `child` (sus sectores, su registro y su bit) y lo quita de `parent`.
pub fn remove_inode<D: BlockDevice + ?Sized>(
    dev: &mut D,
    kind: InodeKind,
    parent: u32,
    child: u32,
) -> Result<()> {
    let inode = load_inode(dev, child)?;
    if inode.kind != kind {
        return Err(match kind {
            InodeKind::File => FsError::NotAFile,
            InodeKind::Directory => FsError::NotADirectory,
        });
    }
    if inode.is_dir() && inode.size > 0 {
        return Err(FsError::DirectoryNotEmpty);
    }

    let sectors = Bitmap::sector_map();
    for s in inode.sectors() {
        sectors.reset(dev, s as usize)?;
        debug!("remove_inode: liberado el sector {} del inodo {}", s, child);
    }

    // Un registro en cero equivale a un archivo vacío sin sectores.
    store_inode(dev, child, &InodeDisk::empty(InodeKind::File))?;
    Bitmap::inode_map().reset(dev, child as usize)?;

    let mut dir_inode = load_inode(dev, parent)?;
    if !dir_inode.is_dir() {
        return Err(FsError::NotADirectory);
    }
    dir::remove_entry(dev, &mut dir_inode, child)?;
    store_inode(dev, parent, &dir_inode)?;
    debug!(
        "remove_inode: inodo {} quitado de {} (size = {})",
        child, parent, dir_inode.size
    );
    Ok(())
}
