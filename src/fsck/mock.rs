/*Backend en memoria para probar el fsck sin un disco: cada prueba arma el
estado (sano o roto) que quiere revisar. */

use super::{fsck_backend::FsckBackend, fsck_types::*};
use crate::error::Result;
use crate::layout::{
    DATABLOCK_START_SECTOR, DIRENTS_PER_SECTOR, FS_VERSION, MAX_SECTORS_PER_FILE, OS_MAGIC,
};

pub struct MockBackend {
    pub superblock: Superblock,
    pub inodes: Vec<Inode>,
    pub dirs: Vec<Vec<Dirent>>,
    pub inode_bitmap: Vec<bool>,
    pub sector_bitmap: Vec<bool>,
}

impl MockBackend {
    /// Volumen recién formateado con `num_inodes` inodos y `num_sectors` sectores.
    pub fn formatted(num_inodes: usize, num_sectors: usize) -> Self {
        let empty = Inode {
            is_dir: false,
            bad_kind: false,
            size: 0,
            data: vec![0; MAX_SECTORS_PER_FILE],
        };
        let mut inodes = vec![empty; num_inodes];
        inodes[0].is_dir = true;

        let mut inode_bitmap = vec![false; num_inodes];
        inode_bitmap[0] = true;
        let mut sector_bitmap = vec![false; num_sectors];
        sector_bitmap[..DATABLOCK_START_SECTOR].fill(true);

        Self {
            superblock: Superblock {
                magic: OS_MAGIC,
                version: FS_VERSION,
                num_inodes: num_inodes as u32,
                num_sectors: num_sectors as u32,
                root_inode: 0,
                data_start: DATABLOCK_START_SECTOR as u32,
            },
            inodes,
            dirs: vec![Vec::new(); num_inodes],
            inode_bitmap,
            sector_bitmap,
        }
    }

    /// Enlaza un inodo nuevo en `parent`, con sus sectores de datos. El grupo
    /// de entradas del padre se reserva como lo haría el volumen.
    pub fn add(&mut self, parent: u32, name: &str, ino: u32, is_dir: bool, size: u32, sectors: &[u32]) {
        let parent_size = self.inodes[parent as usize].size as usize;
        if parent_size % DIRENTS_PER_SECTOR == 0 {
            let free = self.first_free_sector();
            self.inodes[parent as usize].data[parent_size / DIRENTS_PER_SECTOR] = free;
            self.sector_bitmap[free as usize] = true;
        }

        let inode = &mut self.inodes[ino as usize];
        inode.is_dir = is_dir;
        inode.size = size;
        for (i, &s) in sectors.iter().enumerate() {
            inode.data[i] = s;
            self.sector_bitmap[s as usize] = true;
        }
        self.inode_bitmap[ino as usize] = true;
        self.dirs[parent as usize].push(Dirent {
            inode: ino,
            name: name.into(),
        });
        self.inodes[parent as usize].size += 1;
    }

    pub fn first_free_sector(&self) -> u32 {
        self.sector_bitmap.iter().position(|&used| !used).unwrap() as u32
    }
}

impl FsckBackend for MockBackend {
    fn load_superblock(&self) -> Result<Superblock> {
        Ok(self.superblock.clone())
    }

    fn load_all_inodes(&self) -> Result<Vec<Inode>> {
        Ok(self.inodes.clone())
    }

    fn read_dir(&self, ino: u32) -> Result<Vec<Dirent>> {
        Ok(self.dirs.get(ino as usize).cloned().unwrap_or_default())
    }

    fn load_inode_bitmap(&self) -> Result<Vec<bool>> {
        Ok(self.inode_bitmap.clone())
    }

    fn load_sector_bitmap(&self) -> Result<Vec<bool>> {
        Ok(self.sector_bitmap.clone())
    }
}
