/*Interfaz con la que el fsck lee el volumen. Hay dos implementaciones:
el volumen real (volume_backend) y un mock en memoria para las pruebas. */

use super::fsck_types::*;
use crate::error::Result;

pub trait FsckBackend {
    fn load_superblock(&self) -> Result<Superblock>;
    /// Todos los registros de la tabla, usados o no.
    fn load_all_inodes(&self) -> Result<Vec<Inode>>;
    fn read_dir(&self, ino: u32) -> Result<Vec<Dirent>>;
    fn load_inode_bitmap(&self) -> Result<Vec<bool>>;
    fn load_sector_bitmap(&self) -> Result<Vec<bool>>;
}
