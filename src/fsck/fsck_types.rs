/*Estructuras que el fsck necesita del volumen, ya decodificadas:
superblock, inodos, entradas de directorio y el reporte de errores. */

#[derive(Debug, Clone)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub num_inodes: u32,
    pub num_sectors: u32,
    pub root_inode: u32,
    pub data_start: u32,
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub is_dir: bool,
    /// El registro trae un tipo que no es archivo ni directorio.
    pub bad_kind: bool,
    pub size: u32,
    /// Arreglo completo de punteros, 0 = sin asignar.
    pub data: Vec<u32>,
}

impl Inode {
    pub fn allocated(&self) -> impl Iterator<Item = u32> + '_ {
        self.data.iter().copied().filter(|&s| s != 0)
    }
}

#[derive(Debug, Clone)]
pub struct Dirent {
    pub inode: u32,
    pub name: String,
}

#[derive(Debug)]
pub struct FsckReport {
    pub sectors_ok: bool,
    pub inodes_ok: bool,
    pub errors: Vec<String>,
}

impl FsckReport {
    pub fn new() -> Self {
        Self {
            sectors_ok: true,
            inodes_ok: true,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for FsckReport {
    fn default() -> Self {
        Self::new()
    }
}
