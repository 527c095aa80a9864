// src/error.rs
use libc::{
    EBADF, EBUSY, EEXIST, EFBIG, EINVAL, EIO, EISDIR, EMFILE, ENAMETOOLONG, ENOENT, ENOSPC,
    ENOTDIR, ENOTEMPTY, EPERM, ERANGE,
};
use thiserror::Error;

use crate::disk::DiskError;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no existe: {0}")]
    NotFound(String),
    #[error("ya existe: {0}")]
    AlreadyExists(String),
    #[error("no es un directorio")]
    NotADirectory,
    #[error("no es un archivo")]
    NotAFile,
    #[error("directorio no vacío")]
    DirectoryNotEmpty,
    #[error("nombre ilegal: {0:?}")]
    IllegalName(String),
    #[error("nombre demasiado largo: {0:?}")]
    NameTooLong(String),
    #[error("la ruta no es absoluta: {0:?}")]
    RelativePath(String),
    #[error("demasiados archivos abiertos")]
    TooManyOpenFiles,
    #[error("descriptor inválido: {0}")]
    BadDescriptor(usize),
    #[error("el archivo está abierto")]
    FileInUse,
    #[error("archivo demasiado grande ({requested} bytes, máximo {max})")]
    FileTooBig { requested: u64, max: u64 },
    #[error("espacio insuficiente")]
    OutOfSpace,
    #[error("no quedan inodos libres")]
    OutOfInodes,
    #[error("seek fuera de rango (offset = {offset}, tamaño = {size})")]
    SeekOutOfBounds { offset: i64, size: u64 },
    #[error("buffer demasiado pequeño ({needed} bytes requeridos, {got} disponibles)")]
    BufferTooSmall { needed: usize, got: usize },
    #[error("el directorio raíz no se puede borrar")]
    RootDirectoryProtected,
    #[error("el magic del superblock no coincide (esperado = {expected:#X}, leído = {found:#X})")]
    BadMagic { expected: u32, found: u32 },
    #[error("inodo inválido: {0}")]
    InvalidInode(u32),
    #[error("inodo {0} corrupto")]
    CorruptInode(u32),
    #[error("directorio corrupto: el grupo {group} no tiene sector (size = {size})")]
    CorruptDirectory { group: usize, size: u32 },
    #[error("bit fuera de rango: {0}")]
    BitOutOfRange(usize),
    #[error("geometría del disco incompatible: {0}")]
    BadGeometry(String),
    #[error("error de disco: {0}")]
    Disk(#[from] DiskError),
    #[error("registro corrupto: {0}")]
    Codec(#[from] bincode::Error),
}

impl FsError {
    pub fn as_errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => ENOENT,
            FsError::AlreadyExists(_) => EEXIST,
            FsError::NotADirectory => ENOTDIR,
            FsError::NotAFile => EISDIR,
            FsError::DirectoryNotEmpty => ENOTEMPTY,
            FsError::IllegalName(_) | FsError::RelativePath(_) => EINVAL,
            FsError::NameTooLong(_) => ENAMETOOLONG,
            FsError::TooManyOpenFiles => EMFILE,
            FsError::BadDescriptor(_) => EBADF,
            FsError::FileInUse => EBUSY,
            FsError::FileTooBig { .. } => EFBIG,
            FsError::OutOfSpace | FsError::OutOfInodes => ENOSPC,
            FsError::SeekOutOfBounds { .. } => EINVAL,
            FsError::BufferTooSmall { .. } => ERANGE,
            FsError::RootDirectoryProtected => EPERM,
            FsError::BadMagic { .. }
            | FsError::BitOutOfRange(_)
            | FsError::InvalidInode(_)
            | FsError::CorruptInode(_)
            | FsError::CorruptDirectory { .. }
            | FsError::BadGeometry(_)
            | FsError::Disk(_)
            | FsError::Codec(_) => EIO,
        }
    }
}
