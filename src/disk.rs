// src/disk.rs
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::layout::{Sector, SECTOR_SIZE, TOTAL_SECTORS};

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("sector fuera de rango: {0}")]
    OutOfRange(usize),
    #[error("no existe la imagen {0:?}")]
    ImageMissing(PathBuf),
    #[error("la imagen {path:?} mide {found} bytes, se esperaban {expected}")]
    ImageSize {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("E/S sobre la imagen {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Acceso por sectores completos.
pub trait BlockDevice {
    fn read_sector(&self, index: usize, buf: &mut Sector) -> Result<(), DiskError>;
    fn write_sector(&mut self, index: usize, buf: &Sector) -> Result<(), DiskError>;
}

/// Disco simulado en memoria, respaldado por un archivo imagen.
pub struct Disk {
    bytes: Vec<u8>,
}

impl Disk {
    /// Disco nuevo con todos los sectores en cero.
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; SECTOR_SIZE * TOTAL_SECTORS],
        }
    }

    /// Carga la imagen completa. Distingue "no existe" del resto de errores.
    pub fn load(&mut self, path: &Path) -> Result<(), DiskError> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DiskError::ImageMissing(path.to_path_buf()),
            _ => DiskError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        if data.len() != self.bytes.len() {
            return Err(DiskError::ImageSize {
                path: path.to_path_buf(),
                expected: self.bytes.len(),
                found: data.len(),
            });
        }

        self.bytes = data;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), DiskError> {
        let io_err = |source| DiskError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::create(path).map_err(io_err)?;
        file.write_all(&self.bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)
    }

    fn range(&self, index: usize) -> Result<std::ops::Range<usize>, DiskError> {
        if index >= TOTAL_SECTORS {
            return Err(DiskError::OutOfRange(index));
        }
        let start = index * SECTOR_SIZE;
        Ok(start..start + SECTOR_SIZE)
    }
}

impl Default for Disk {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for Disk {
    fn read_sector(&self, index: usize, buf: &mut Sector) -> Result<(), DiskError> {
        let range = self.range(index)?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_sector(&mut self, index: usize, buf: &Sector) -> Result<(), DiskError> {
        let range = self.range(index)?;
        self.bytes[range].copy_from_slice(buf);
        Ok(())
    }
}
