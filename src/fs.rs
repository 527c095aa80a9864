use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::bitmap::Bitmap;
use crate::dir::{self, DirEntry};
use crate::disk::{BlockDevice, Disk, DiskError};
use crate::error::{FsError, Result};
use crate::file::{self, Fd, OpenFileTable};
use crate::inode::{add_inode, load_inode, remove_inode, store_inode};
use crate::layout::{
    decode, encode_into, InodeDisk, InodeKind, Sector, SuperblockDisk, DATABLOCK_START_SECTOR,
    DIRENT_SIZE, INODE_TABLE_SECTORS, INODE_TABLE_START_SECTOR, MAX_FILES, OS_MAGIC, ROOT_INODE,
    SECTOR_SIZE, SUPERBLOCK_START_SECTOR, TOTAL_SECTORS,
};
use crate::path::{follow_path, Resolved};

// -----------------------------------------------------------------------------
// Vistas públicas
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: u32,
    pub kind: InodeKind,
    /// Bytes para archivos, cantidad de entradas para directorios.
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_sectors: u64,
    pub data_sectors: u64,
    pub free_sectors: u64,
    pub max_files: u64,
    pub free_inodes: u64,
}

// -------------------- Estado del volumen montado --------------------

/// Un volumen montado: el disco en memoria, la imagen que lo respalda y la
/// tabla de archivos abiertos. Cada operación toma `&mut self`, así que hay un
/// único llamador a la vez; para compartirlo entre hilos va detrás de un Mutex.
pub struct Volume {
    disk: Disk,
    image: PathBuf,
    files: OpenFileTable,
}

impl Volume {
    /// Monta el volumen guardado en `image`.
    /// - Si la imagen no existe, formatea un volumen nuevo y lo guarda
    /// - Si existe, valida tamaño, magic y geometría
    /// - En ambos casos la tabla de archivos abiertos arranca vacía
    pub fn boot(image: impl AsRef<Path>) -> Result<Self> {
        let image = image.as_ref().to_path_buf();
        let mut disk = Disk::new();
        debug!("boot: disco inicializado");

        match disk.load(&image) {
            Ok(()) => {
                info!("boot: imagen {:?} cargada", image);
                check_superblock(&disk)?;
            }
            Err(DiskError::ImageMissing(_)) => {
                info!("boot: {:?} no existe, se formatea un volumen nuevo", image);
                format(&mut disk)?;
                disk.save(&image)?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            disk,
            image,
            files: OpenFileTable::new(),
        })
    }

    /// Guarda el disco completo en la imagen.
    pub fn sync(&self) -> Result<()> {
        self.disk.save(&self.image)?;
        info!("sync: imagen {:?} guardada", self.image);
        Ok(())
    }

    pub fn image_path(&self) -> &Path {
        &self.image
    }

    pub(crate) fn device(&self) -> &Disk {
        &self.disk
    }

    // --------- Archivos ---------

    pub fn file_create(&mut self, path: &str) -> Result<()> {
        debug!("file_create({:?})", path);
        self.create(InodeKind::File, path)
    }

    pub fn file_unlink(&mut self, path: &str) -> Result<()> {
        debug!("file_unlink({:?})", path);
        let r = follow_path(&self.disk, path)?;
        let child = existing(&r, path)?;
        if self.files.is_open(child) {
            warn!("file_unlink: {:?} está abierto", path);
            return Err(FsError::FileInUse);
        }
        remove_inode(&mut self.disk, InodeKind::File, r.parent, child)
    }

    pub fn file_open(&mut self, path: &str) -> Result<Fd> {
        debug!("file_open({:?})", path);
        let r = follow_path(&self.disk, path)?;
        let child = r.child.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let inode = load_inode(&self.disk, child)?;
        if inode.is_dir() {
            return Err(FsError::NotAFile);
        }
        let fd = self.files.open(child, inode.size as u64)?;
        debug!("file_open: fd = {} (inodo {}, size = {})", fd, child, inode.size);
        Ok(fd)
    }

    /// Lee hasta `buf.len()` bytes desde el cursor. 0 indica fin de archivo.
    pub fn file_read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let handle = *self.files.get(fd)?;
        if handle.cursor == handle.size {
            return Ok(0);
        }
        let inode = load_inode(&self.disk, handle.inode)?;
        let n = file::read_at(&self.disk, handle.inode, &inode, handle.cursor, handle.size, buf)?;
        self.files.get_mut(fd)?.cursor += n as u64;
        debug!("file_read: fd = {} leídos {} bytes", fd, n);
        Ok(n)
    }

    pub fn file_write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let handle = *self.files.get(fd)?;
        let mut inode = load_inode(&self.disk, handle.inode)?;
        let n = file::write_at(&mut self.disk, handle.inode, &mut inode, handle.cursor, buf)?;
        self.files.get_mut(fd)?.cursor += n as u64;
        self.files.refresh_size(handle.inode, inode.size as u64);
        debug!(
            "file_write: fd = {} escritos {} bytes (size = {})",
            fd, n, inode.size
        );
        Ok(n)
    }

    /// Mueve el cursor; sólo se aceptan offsets dentro de `0..=size`.
    pub fn file_seek(&mut self, fd: Fd, offset: i64) -> Result<u64> {
        let handle = self.files.get_mut(fd)?;
        if offset < 0 || offset as u64 > handle.size {
            return Err(FsError::SeekOutOfBounds {
                offset,
                size: handle.size,
            });
        }
        handle.cursor = offset as u64;
        Ok(handle.cursor)
    }

    pub fn file_close(&mut self, fd: Fd) -> Result<()> {
        debug!("file_close({})", fd);
        self.files.close(fd)
    }

    // --------- Directorios ---------

    pub fn dir_create(&mut self, path: &str) -> Result<()> {
        debug!("dir_create({:?})", path);
        self.create(InodeKind::Directory, path)
    }

    pub fn dir_unlink(&mut self, path: &str) -> Result<()> {
        debug!("dir_unlink({:?})", path);
        let r = follow_path(&self.disk, path)?;
        let child = existing(&r, path)?;
        remove_inode(&mut self.disk, InodeKind::Directory, r.parent, child)
    }

    /// Bytes que ocupan las entradas del directorio (entradas × DIRENT_SIZE).
    pub fn dir_size(&self, path: &str) -> Result<usize> {
        let (_, inode) = self.directory(path)?;
        Ok(inode.size as usize * DIRENT_SIZE)
    }

    /// Copia los registros crudos del directorio en `buf` y devuelve la
    /// cantidad de entradas.
    pub fn dir_read(&self, path: &str, buf: &mut [u8]) -> Result<usize> {
        let (_, inode) = self.directory(path)?;
        dir::read_raw(&self.disk, &inode, buf)
    }

    /// Igual que `dir_read` pero con las entradas ya decodificadas.
    pub fn dir_list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let (_, inode) = self.directory(path)?;
        dir::list_entries(&self.disk, &inode)?
            .into_iter()
            .map(|e| {
                Ok(DirEntry {
                    inode: e.inode,
                    name: e.name(),
                    kind: load_inode(&self.disk, e.inode)?.kind,
                })
            })
            .collect()
    }

    // --------- Consultas ---------

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let r = follow_path(&self.disk, path)?;
        let child = r.child.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        self.stat_inode(child)
    }

    pub fn stat_inode(&self, ino: u32) -> Result<Stat> {
        if !Bitmap::inode_map().is_set(&self.disk, ino as usize)? {
            return Err(FsError::NotFound(format!("inodo {ino}")));
        }
        let inode = load_inode(&self.disk, ino)?;
        Ok(Stat {
            inode: ino,
            kind: inode.kind,
            size: inode.size as u64,
        })
    }

    pub fn stats(&self) -> Result<VolumeStats> {
        let used_sectors = Bitmap::sector_map().count_set(&self.disk)?;
        let used_inodes = Bitmap::inode_map().count_set(&self.disk)?;
        Ok(VolumeStats {
            total_sectors: TOTAL_SECTORS as u64,
            data_sectors: (TOTAL_SECTORS - DATABLOCK_START_SECTOR) as u64,
            free_sectors: (TOTAL_SECTORS - used_sectors) as u64,
            max_files: MAX_FILES as u64,
            free_inodes: (MAX_FILES - used_inodes) as u64,
        })
    }

    pub fn open_files(&self) -> usize {
        self.files.open_count()
    }

    // --------- Auxiliares ---------

    fn create(&mut self, kind: InodeKind, path: &str) -> Result<()> {
        let r = follow_path(&self.disk, path)?;
        if r.child.is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let ino = add_inode(&mut self.disk, kind, r.parent, &r.name)?;
        debug!("{:?} creado como {:?} (inodo {})", path, kind, ino);
        Ok(())
    }

    fn directory(&self, path: &str) -> Result<(u32, InodeDisk)> {
        let r = follow_path(&self.disk, path)?;
        let child = r.child.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let inode = load_inode(&self.disk, child)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((child, inode))
    }
}

/// Hijo ya existente y distinto de la raíz; para los unlink.
fn existing(r: &Resolved, path: &str) -> Result<u32> {
    match r.child {
        None => Err(FsError::NotFound(path.to_string())),
        Some(ROOT_INODE) => Err(FsError::RootDirectoryProtected),
        Some(child) => Ok(child),
    }
}

// -----------------------------------------------------------------------------
// Formato y validación
// -----------------------------------------------------------------------------

/// Escribe un volumen vacío: superblock, bitmaps, tabla de inodos con la raíz.
fn format(disk: &mut Disk) -> Result<()> {
    let mut buf: Sector = [0; SECTOR_SIZE];
    encode_into(&SuperblockDisk::current(), &mut buf)?;
    disk.write_sector(SUPERBLOCK_START_SECTOR, &buf)?;
    debug!("format: superblock (sector {})", SUPERBLOCK_START_SECTOR);

    Bitmap::inode_map().init(disk, 1)?;
    Bitmap::sector_map().init(disk, DATABLOCK_START_SECTOR)?;
    debug!("format: bitmaps listos, {} sectores reservados", DATABLOCK_START_SECTOR);

    let zero: Sector = [0; SECTOR_SIZE];
    for i in 0..INODE_TABLE_SECTORS {
        disk.write_sector(INODE_TABLE_START_SECTOR + i, &zero)?;
    }
    store_inode(disk, ROOT_INODE, &InodeDisk::empty(InodeKind::Directory))?;
    info!(
        "format: tabla de inodos (start = {}, num = {}), datos desde el sector {}",
        INODE_TABLE_START_SECTOR, INODE_TABLE_SECTORS, DATABLOCK_START_SECTOR
    );
    Ok(())
}

fn check_superblock(disk: &Disk) -> Result<()> {
    let mut buf: Sector = [0; SECTOR_SIZE];
    disk.read_sector(SUPERBLOCK_START_SECTOR, &mut buf)?;

    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != OS_MAGIC {
        return Err(FsError::BadMagic {
            expected: OS_MAGIC,
            found: magic,
        });
    }

    let sb: SuperblockDisk = decode(&buf)?;
    let expected = SuperblockDisk::current();
    if sb != expected {
        return Err(FsError::BadGeometry(format!(
            "imagen {:?}, compilado {:?}",
            sb, expected
        )));
    }
    Ok(())
}
