//! Bitmaps guardados en sectores consecutivos, un bit por recurso.
//!
//! El bit `i` vive en el sector `start + i / BITS_PER_SECTOR`; dentro del
//! sector los bits se numeran desde el más significativo de cada byte.

use log::{debug, warn};

use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::layout::{
    Sector, INODE_BITMAP_SECTORS, INODE_BITMAP_START_SECTOR, MAX_FILES, SECTOR_BITMAP_SECTORS,
    SECTOR_BITMAP_START_SECTOR, SECTOR_SIZE, TOTAL_SECTORS,
};

pub const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;

#[derive(Clone, Copy, Debug)]
pub struct Bitmap {
    start: usize,
    sectors: usize,
    nbits: usize,
}

/// (sector relativo, byte, máscara) del bit `bit`.
fn decompose(bit: usize) -> (usize, usize, u8) {
    let sector = bit / BITS_PER_SECTOR;
    let rest = bit % BITS_PER_SECTOR;
    (sector, rest / 8, 0x80 >> (rest % 8))
}

impl Bitmap {
    pub const fn new(start: usize, sectors: usize, nbits: usize) -> Self {
        Self {
            start,
            sectors,
            nbits,
        }
    }

    /// Un bit por inodo de la tabla.
    pub const fn inode_map() -> Self {
        Self::new(INODE_BITMAP_START_SECTOR, INODE_BITMAP_SECTORS, MAX_FILES)
    }

    /// Un bit por sector del disco.
    pub const fn sector_map() -> Self {
        Self::new(SECTOR_BITMAP_START_SECTOR, SECTOR_BITMAP_SECTORS, TOTAL_SECTORS)
    }

    pub fn capacity(&self) -> usize {
        self.nbits
    }

    /// Deja en uno los primeros `reserved` bits y en cero todo lo demás,
    /// escribiendo exactamente `sectors` sectores.
    pub fn init<D: BlockDevice + ?Sized>(&self, dev: &mut D, reserved: usize) -> Result<()> {
        debug!(
            "bitmap: init start={} sectores={} reservados={}",
            self.start, self.sectors, reserved
        );
        for i in 0..self.sectors {
            let mut buf: Sector = [0; SECTOR_SIZE];
            let here = reserved
                .saturating_sub(i * BITS_PER_SECTOR)
                .min(BITS_PER_SECTOR);
            let (full, rest) = (here / 8, here % 8);
            buf[..full].fill(0xFF);
            if rest > 0 {
                buf[full] = 0xFF << (8 - rest);
            }
            dev.write_sector(self.start + i, &buf)?;
        }
        Ok(())
    }

    /// Busca el primer bit libre, lo marca y devuelve su índice global.
    /// `None` si el bitmap está lleno.
    pub fn first_unused<D: BlockDevice + ?Sized>(&self, dev: &mut D) -> Result<Option<usize>> {
        let mut buf: Sector = [0; SECTOR_SIZE];
        for i in 0..self.sectors {
            let first = i * BITS_PER_SECTOR;
            if first >= self.nbits {
                break;
            }
            let bits_here = (self.nbits - first).min(BITS_PER_SECTOR);
            dev.read_sector(self.start + i, &mut buf)?;

            for byte in 0..(bits_here + 7) / 8 {
                if buf[byte] == 0xFF {
                    continue;
                }
                let local = byte * 8 + buf[byte].leading_ones() as usize;
                if local >= bits_here {
                    break;
                }
                buf[byte] |= 0x80 >> (local % 8);
                dev.write_sector(self.start + i, &buf)?;
                debug!("bitmap {}: asignado bit {}", self.start, first + local);
                return Ok(Some(first + local));
            }
        }
        Ok(None)
    }

    /// Limpia el bit `ibit` en el sector que realmente lo contiene.
    pub fn reset<D: BlockDevice + ?Sized>(&self, dev: &mut D, ibit: usize) -> Result<()> {
        let (sector, byte, mask) = self.locate(ibit)?;
        let mut buf: Sector = [0; SECTOR_SIZE];
        dev.read_sector(sector, &mut buf)?;
        buf[byte] &= !mask;
        dev.write_sector(sector, &buf)?;
        debug!("bitmap {}: liberado bit {}", self.start, ibit);
        Ok(())
    }

    pub fn is_set<D: BlockDevice + ?Sized>(&self, dev: &D, ibit: usize) -> Result<bool> {
        let (sector, byte, mask) = self.locate(ibit)?;
        let mut buf: Sector = [0; SECTOR_SIZE];
        dev.read_sector(sector, &mut buf)?;
        Ok(buf[byte] & mask != 0)
    }

    /// Todos los bits, en orden; para fsck y estadísticas.
    pub fn to_vec<D: BlockDevice + ?Sized>(&self, dev: &D) -> Result<Vec<bool>> {
        let mut bits = Vec::with_capacity(self.nbits);
        let mut buf: Sector = [0; SECTOR_SIZE];
        for i in 0..self.sectors {
            dev.read_sector(self.start + i, &mut buf)?;
            for local in 0..BITS_PER_SECTOR {
                if bits.len() == self.nbits {
                    return Ok(bits);
                }
                bits.push(buf[local / 8] & (0x80 >> (local % 8)) != 0);
            }
        }
        Ok(bits)
    }

    pub fn count_set<D: BlockDevice + ?Sized>(&self, dev: &D) -> Result<usize> {
        Ok(self.to_vec(dev)?.into_iter().filter(|&b| b).count())
    }

    fn locate(&self, ibit: usize) -> Result<(usize, usize, u8)> {
        if ibit >= self.nbits {
            warn!("bitmap {}: bit {} fuera de rango ({})", self.start, ibit, self.nbits);
            return Err(FsError::BitOutOfRange(ibit));
        }
        let (sector, byte, mask) = decompose(ibit);
        Ok((self.start + sector, byte, mask))
    }
}
