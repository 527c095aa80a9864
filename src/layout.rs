//! Disposición del volumen en el disco y registros que viven en él.
//!
//! ```text
//! | superblock | bitmap de inodos | bitmap de sectores | tabla de inodos | datos ... |
//! ```
//!
//! Todo se deriva de constantes de compilación. Los registros se codifican con
//! bincode (enteros fijos little-endian, arreglos sin prefijo de largo).

use serde::{Deserialize, Serialize};

use crate::error::Result;

// -----------------------------------------------------------------------------
// Geometría
// -----------------------------------------------------------------------------

pub const SECTOR_SIZE: usize = 512;
pub const TOTAL_SECTORS: usize = 10_000;
pub const MAX_FILES: usize = 1000;
pub const MAX_SECTORS_PER_FILE: usize = 30;

/// Largo de un nombre en disco, incluyendo el NUL final.
pub const MAX_NAME: usize = 16;
pub const MAX_PATH: usize = 256;
pub const MAX_OPEN_FILES: usize = 256;

pub const OS_MAGIC: u32 = 0xDEAD_BEEF;
pub const FS_VERSION: u32 = 1;

pub const ROOT_INODE: u32 = 0;

pub type Sector = [u8; SECTOR_SIZE];

// -------------------- Regiones --------------------

pub const SUPERBLOCK_START_SECTOR: usize = 0;

pub const INODE_BITMAP_START_SECTOR: usize = 1;
pub const INODE_BITMAP_SIZE: usize = (MAX_FILES + 7) / 8;
pub const INODE_BITMAP_SECTORS: usize = (INODE_BITMAP_SIZE + SECTOR_SIZE - 1) / SECTOR_SIZE;

pub const SECTOR_BITMAP_START_SECTOR: usize = INODE_BITMAP_START_SECTOR + INODE_BITMAP_SECTORS;
pub const SECTOR_BITMAP_SIZE: usize = (TOTAL_SECTORS + 7) / 8;
pub const SECTOR_BITMAP_SECTORS: usize = (SECTOR_BITMAP_SIZE + SECTOR_SIZE - 1) / SECTOR_SIZE;

pub const INODE_TABLE_START_SECTOR: usize = SECTOR_BITMAP_START_SECTOR + SECTOR_BITMAP_SECTORS;
pub const INODE_SIZE: usize = 8 + 4 * MAX_SECTORS_PER_FILE;
pub const INODES_PER_SECTOR: usize = SECTOR_SIZE / INODE_SIZE;
pub const INODE_TABLE_SECTORS: usize = (MAX_FILES + INODES_PER_SECTOR - 1) / INODES_PER_SECTOR;

pub const DATABLOCK_START_SECTOR: usize = INODE_TABLE_START_SECTOR + INODE_TABLE_SECTORS;

pub const DIRENT_SIZE: usize = MAX_NAME + 4;
pub const DIRENTS_PER_SECTOR: usize = SECTOR_SIZE / DIRENT_SIZE;

pub const MAX_FILE_SIZE: usize = MAX_SECTORS_PER_FILE * SECTOR_SIZE;
pub const MAX_DIR_ENTRIES: usize = MAX_SECTORS_PER_FILE * DIRENTS_PER_SECTOR;

// -----------------------------------------------------------------------------
// Registros en disco
// -----------------------------------------------------------------------------

/// El magic va primero: los primeros 4 bytes del sector 0.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperblockDisk {
    pub magic: u32,
    pub version: u32,
    pub sector_size: u32,
    pub total_sectors: u32,
    pub max_files: u32,
    pub max_sectors_per_file: u32,
    pub inode_table_start: u32,
    pub data_start: u32,
}

impl SuperblockDisk {
    /// Superblock que describe la geometría compilada.
    pub fn current() -> Self {
        Self {
            magic: OS_MAGIC,
            version: FS_VERSION,
            sector_size: SECTOR_SIZE as u32,
            total_sectors: TOTAL_SECTORS as u32,
            max_files: MAX_FILES as u32,
            max_sectors_per_file: MAX_SECTORS_PER_FILE as u32,
            inode_table_start: INODE_TABLE_START_SECTOR as u32,
            data_start: DATABLOCK_START_SECTOR as u32,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

/// `size` son bytes para archivos y cantidad de entradas para directorios.
/// Un índice 0 en `data` significa "sin asignar": el sector 0 es el superblock.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct InodeDisk {
    pub size: u32,
    pub kind: InodeKind,
    pub data: [u32; MAX_SECTORS_PER_FILE],
}

impl InodeDisk {
    pub fn empty(kind: InodeKind) -> Self {
        Self {
            size: 0,
            kind,
            data: [0; MAX_SECTORS_PER_FILE],
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    /// Sectores de datos asignados, en orden.
    pub fn sectors(&self) -> impl Iterator<Item = u32> + '_ {
        self.data.iter().copied().filter(|&s| s != 0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntryDisk {
    pub name: [u8; MAX_NAME],
    pub inode: u32,
}

impl DirEntryDisk {
    pub fn new(name: &str, inode: u32) -> Self {
        let mut raw = [0u8; MAX_NAME];
        let len = name.len().min(MAX_NAME - 1);
        raw[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self { name: raw, inode }
    }

    pub fn empty() -> Self {
        Self {
            name: [0; MAX_NAME],
            inode: 0,
        }
    }

    pub fn name(&self) -> String {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    pub fn name_is(&self, name: &str) -> bool {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
        &self.name[..len] == name.as_bytes()
    }
}

// -----------------------------------------------------------------------------
// Direccionamiento
// -----------------------------------------------------------------------------

/// Sector de la tabla y desplazamiento en bytes del inodo `ino`.
pub fn inode_location(ino: u32) -> (usize, usize) {
    let ino = ino as usize;
    let sector = INODE_TABLE_START_SECTOR + ino / INODES_PER_SECTOR;
    (sector, (ino % INODES_PER_SECTOR) * INODE_SIZE)
}

/// Grupo (índice en `data`) y desplazamiento en bytes de la entrada `pos`.
pub fn dirent_location(pos: usize) -> (usize, usize) {
    (pos / DIRENTS_PER_SECTOR, (pos % DIRENTS_PER_SECTOR) * DIRENT_SIZE)
}

pub fn decode<'a, T: Deserialize<'a>>(buf: &'a [u8]) -> Result<T> {
    Ok(bincode::deserialize(buf)?)
}

pub fn encode_into<T: Serialize>(val: &T, buf: &mut [u8]) -> Result<()> {
    bincode::serialize_into(buf, val)?;
    Ok(())
}
