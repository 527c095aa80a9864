// src/path.rs
use log::debug;

use crate::dir;
use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::inode::inode_in_sector;
use crate::layout::{inode_location, InodeDisk, Sector, MAX_NAME, MAX_PATH, ROOT_INODE, SECTOR_SIZE};

/// Resultado de seguir una ruta absoluta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub parent: u32,
    /// `None` si el último componente no existe dentro de `parent`.
    pub child: Option<u32>,
    pub name: String,
}

/// Letras, dígitos, `.`, `-` y `_`; a lo sumo `MAX_NAME - 1` bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME - 1 {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    let legal = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if name.is_empty() || !legal {
        return Err(FsError::IllegalName(name.to_string()));
    }
    Ok(())
}

/// Un único sector de la tabla de inodos en memoria.
struct InodeCache {
    sector: usize,
    buf: Sector,
}

impl InodeCache {
    fn new<D: BlockDevice + ?Sized>(dev: &D, ino: u32) -> Result<Self> {
        let (sector, _) = inode_location(ino);
        let mut buf: Sector = [0; SECTOR_SIZE];
        dev.read_sector(sector, &mut buf)?;
        Ok(Self { sector, buf })
    }

    fn inode<D: BlockDevice + ?Sized>(&mut self, dev: &D, ino: u32) -> Result<InodeDisk> {
        let (sector, _) = inode_location(ino);
        if sector != self.sector {
            dev.read_sector(sector, &mut self.buf)?;
            self.sector = sector;
            debug!("follow_path: cargado el sector {} de la tabla", sector);
        }
        inode_in_sector(&self.buf, ino)
    }
}

/// Recorre `path` desde la raíz. `/` resuelve a padre = hijo = raíz.
pub fn follow_path<D: BlockDevice + ?Sized>(dev: &D, path: &str) -> Result<Resolved> {
    if !path.starts_with('/') {
        return Err(FsError::RelativePath(path.to_string()));
    }
    if path.len() > MAX_PATH - 1 {
        return Err(FsError::NameTooLong(path.to_string()));
    }

    let mut cache = InodeCache::new(dev, ROOT_INODE)?;
    let mut parent = ROOT_INODE;
    let mut child = Some(ROOT_INODE);
    let mut name = String::from("/");

    for token in path.split('/').filter(|t| !t.is_empty()) {
        validate_name(token)?;
        let current = child.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let dir_inode = cache.inode(dev, current)?;
        if !dir_inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        parent = current;
        child = dir::find_entry(dev, &dir_inode, token)?;
        name = token.to_string();
    }

    debug!(
        "follow_path: {:?} -> parent = {}, child = {:?}",
        path, parent, child
    );
    Ok(Resolved {
        parent,
        child,
        name,
    })
}
