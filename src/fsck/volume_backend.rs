/*Backend del fsck sobre un volumen montado: lee directamente del disco en
memoria, sin pasar por la tabla de archivos abiertos. */

use super::{fsck_backend::FsckBackend, fsck_types::*};
use crate::bitmap::Bitmap;
use crate::dir;
use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::fs::Volume;
use crate::inode::{inode_in_sector, load_inode};
use crate::layout::{
    decode, inode_location, Sector, SuperblockDisk, INODE_SIZE, MAX_FILES, MAX_SECTORS_PER_FILE,
    ROOT_INODE, SECTOR_SIZE, SUPERBLOCK_START_SECTOR,
};

fn le_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// Campos de un registro cuyo tipo no se pudo decodificar: size, tipo, punteros.
fn raw_inode(raw: &[u8]) -> Inode {
    Inode {
        is_dir: false,
        bad_kind: true,
        size: le_u32(raw, 0),
        data: (0..MAX_SECTORS_PER_FILE).map(|i| le_u32(raw, 8 + 4 * i)).collect(),
    }
}

pub struct VolumeBackend<'a> {
    volume: &'a Volume,
}

impl<'a> VolumeBackend<'a> {
    pub fn new(volume: &'a Volume) -> Self {
        Self { volume }
    }
}

impl FsckBackend for VolumeBackend<'_> {
    fn load_superblock(&self) -> Result<Superblock> {
        let mut buf: Sector = [0; SECTOR_SIZE];
        self.volume
            .device()
            .read_sector(SUPERBLOCK_START_SECTOR, &mut buf)?;
        let sb: SuperblockDisk = decode(&buf)?;
        Ok(Superblock {
            magic: sb.magic,
            version: sb.version,
            num_inodes: sb.max_files,
            num_sectors: sb.total_sectors,
            root_inode: ROOT_INODE,
            data_start: sb.data_start,
        })
    }

    fn load_all_inodes(&self) -> Result<Vec<Inode>> {
        let dev = self.volume.device();
        let mut buf: Sector = [0; SECTOR_SIZE];
        let mut loaded = None;
        let mut out = Vec::with_capacity(MAX_FILES);

        for ino in 0..MAX_FILES as u32 {
            let (sector, off) = inode_location(ino);
            if loaded != Some(sector) {
                dev.read_sector(sector, &mut buf)?;
                loaded = Some(sector);
            }
            let inode = match inode_in_sector(&buf, ino) {
                Ok(inode) => Inode {
                    is_dir: inode.is_dir(),
                    bad_kind: false,
                    size: inode.size,
                    data: inode.data.to_vec(),
                },
                // Tipo ilegible: se reporta el inodo en vez de abortar.
                Err(FsError::Codec(_)) => raw_inode(&buf[off..off + INODE_SIZE]),
                Err(e) => return Err(e),
            };
            out.push(inode);
        }
        Ok(out)
    }

    fn read_dir(&self, ino: u32) -> Result<Vec<Dirent>> {
        let inode = load_inode(self.volume.device(), ino)?;
        Ok(dir::list_entries(self.volume.device(), &inode)?
            .into_iter()
            .map(|e| Dirent {
                inode: e.inode,
                name: e.name(),
            })
            .collect())
    }

    fn load_inode_bitmap(&self) -> Result<Vec<bool>> {
        Bitmap::inode_map().to_vec(self.volume.device())
    }

    fn load_sector_bitmap(&self) -> Result<Vec<bool>> {
        Bitmap::sector_map().to_vec(self.volume.device())
    }
}
