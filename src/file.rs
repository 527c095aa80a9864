// src/file.rs
use log::{debug, warn};

use crate::bitmap::Bitmap;
use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::inode::store_inode;
use crate::layout::{InodeDisk, Sector, MAX_FILE_SIZE, MAX_OPEN_FILES, SECTOR_SIZE};

pub type Fd = usize;

/// Archivo abierto: sólo vive en memoria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: u32,
    pub size: u64,
    pub cursor: u64,
}

pub struct OpenFileTable {
    slots: Vec<Option<OpenFile>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_OPEN_FILES],
        }
    }

    pub fn open(&mut self, inode: u32, size: u64) -> Result<Fd> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)?;
        self.slots[fd] = Some(OpenFile {
            inode,
            size,
            cursor: 0,
        });
        Ok(fd)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::BadDescriptor(fd))
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.get(fd)?;
        self.slots[fd] = None;
        Ok(())
    }

    pub fn is_open(&self, inode: u32) -> bool {
        self.slots.iter().flatten().any(|f| f.inode == inode)
    }

    /// Todos los descriptores del inodo ven el tamaño nuevo.
    pub fn refresh_size(&mut self, inode: u32, size: u64) {
        for f in self.slots.iter_mut().flatten() {
            if f.inode == inode {
                f.size = size;
            }
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Lectura y escritura por rangos de bytes
// -----------------------------------------------------------------------------

fn data_sector(inode: &InodeDisk, ino: u32, index: usize) -> Result<usize> {
    match inode.data.get(index) {
        Some(&s) if s != 0 => Ok(s as usize),
        _ => Err(FsError::CorruptInode(ino)),
    }
}

/// Copia hasta `out.len()` bytes desde `cursor` sin pasar de `size`,
/// recorriendo tantos sectores como haga falta. 0 significa EOF.
pub fn read_at<D: BlockDevice + ?Sized>(
    dev: &D,
    ino: u32,
    inode: &InodeDisk,
    cursor: u64,
    size: u64,
    out: &mut [u8],
) -> Result<usize> {
    let total = out.len().min(size.saturating_sub(cursor) as usize);
    let mut buf: Sector = [0; SECTOR_SIZE];
    let mut pos = cursor as usize;
    let mut done = 0;

    while done < total {
        let (index, off) = (pos / SECTOR_SIZE, pos % SECTOR_SIZE);
        let n = (SECTOR_SIZE - off).min(total - done);
        dev.read_sector(data_sector(inode, ino, index)?, &mut buf)?;
        out[done..done + n].copy_from_slice(&buf[off..off + n]);
        done += n;
        pos += n;
    }
    Ok(done)
}

/// Escribe `data` desde `cursor`, reservando los sectores que falten.
/// Persiste el inodo antes de tocar los datos y devuelve los bytes escritos.
pub fn write_at<D: BlockDevice + ?Sized>(
    dev: &mut D,
    ino: u32,
    inode: &mut InodeDisk,
    cursor: u64,
    data: &[u8],
) -> Result<usize> {
    let end = cursor as usize + data.len();
    if end > MAX_FILE_SIZE {
        return Err(FsError::FileTooBig {
            requested: end as u64,
            max: MAX_FILE_SIZE as u64,
        });
    }

    let allocated = inode.sectors().count();
    let needed = (end + SECTOR_SIZE - 1) / SECTOR_SIZE;
    let sectors = Bitmap::sector_map();
    for index in allocated..needed {
        match sectors.first_unused(dev)? {
            Some(s) => {
                inode.data[index] = s as u32;
                debug!("write: sector {} asignado al inodo {} (índice {})", s, ino, index);
            }
            None => {
                // Los sectores ya reservados quedan en el inodo.
                store_inode(dev, ino, inode)?;
                warn!("write: disco lleno al crecer el inodo {}", ino);
                return Err(FsError::OutOfSpace);
            }
        }
    }

    inode.size = inode.size.max(end as u32);
    store_inode(dev, ino, inode)?;

    let mut buf: Sector = [0; SECTOR_SIZE];
    let mut pos = cursor as usize;
    let mut done = 0;
    while done < data.len() {
        let (index, off) = (pos / SECTOR_SIZE, pos % SECTOR_SIZE);
        let n = (SECTOR_SIZE - off).min(data.len() - done);
        let sector = data_sector(inode, ino, index)?;
        if n < SECTOR_SIZE {
            dev.read_sector(sector, &mut buf)?;
        }
        buf[off..off + n].copy_from_slice(&data[done..done + n]);
        dev.write_sector(sector, &buf)?;
        done += n;
        pos += n;
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::Disk;
    use crate::inode::load_inode;
    use crate::layout::{InodeKind, DATABLOCK_START_SECTOR};

    const INO: u32 = 3;

    fn fresh() -> (Disk, InodeDisk) {
        let mut disk = Disk::new();
        Bitmap::sector_map()
            .init(&mut disk, DATABLOCK_START_SECTOR)
            .unwrap();
        (disk, InodeDisk::empty(InodeKind::File))
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn table_hands_out_lowest_free_slot() {
        let mut table = OpenFileTable::new();
        assert_eq!(table.open(5, 0).unwrap(), 0);
        assert_eq!(table.open(6, 0).unwrap(), 1);
        table.close(0).unwrap();
        assert_eq!(table.open(7, 0).unwrap(), 0);
        assert!(table.is_open(6));
        assert!(!table.is_open(5));
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn table_rejects_bad_descriptors() {
        let mut table = OpenFileTable::new();
        assert!(matches!(table.close(0), Err(FsError::BadDescriptor(0))));
        assert!(matches!(
            table.get(MAX_OPEN_FILES + 1),
            Err(FsError::BadDescriptor(_))
        ));
        let fd = table.open(1, 0).unwrap();
        table.close(fd).unwrap();
        assert!(matches!(table.close(fd), Err(FsError::BadDescriptor(_))));
    }

    #[test]
    fn table_fills_up() {
        let mut table = OpenFileTable::new();
        for i in 0..MAX_OPEN_FILES {
            table.open(i as u32 + 1, 0).unwrap();
        }
        assert!(matches!(table.open(9, 0), Err(FsError::TooManyOpenFiles)));
    }

    #[test]
    fn refresh_size_reaches_every_handle_of_the_inode() {
        let mut table = OpenFileTable::new();
        let a = table.open(4, 0).unwrap();
        let b = table.open(4, 0).unwrap();
        let c = table.open(5, 0).unwrap();
        table.refresh_size(4, 99);
        assert_eq!(table.get(a).unwrap().size, 99);
        assert_eq!(table.get(b).unwrap().size, 99);
        assert_eq!(table.get(c).unwrap().size, 0);
    }

    #[test]
    fn write_allocates_exactly_the_sectors_needed() {
        for (len, sectors) in [(1, 1), (SECTOR_SIZE, 1), (SECTOR_SIZE + 1, 2), (3 * SECTOR_SIZE, 3)] {
            let (mut disk, mut inode) = fresh();
            write_at(&mut disk, INO, &mut inode, 0, &pattern(len)).unwrap();
            assert_eq!(inode.sectors().count(), sectors, "len = {len}");
            assert_eq!(inode.size as usize, len);
        }
    }

    #[test]
    fn append_inside_last_sector_allocates_nothing() {
        let (mut disk, mut inode) = fresh();
        write_at(&mut disk, INO, &mut inode, 0, &pattern(100)).unwrap();
        write_at(&mut disk, INO, &mut inode, 100, &pattern(SECTOR_SIZE - 100)).unwrap();
        assert_eq!(inode.sectors().count(), 1);
        write_at(&mut disk, INO, &mut inode, SECTOR_SIZE as u64, &[1]).unwrap();
        assert_eq!(inode.sectors().count(), 2);
        assert_eq!(inode.size as usize, SECTOR_SIZE + 1);
    }

    #[test]
    fn read_spans_sector_boundaries() {
        let (mut disk, mut inode) = fresh();
        let data = pattern(3 * SECTOR_SIZE + 17);
        write_at(&mut disk, INO, &mut inode, 0, &data).unwrap();

        let mut out = vec![0u8; 2 * SECTOR_SIZE];
        let n = read_at(&disk, INO, &inode, 300, inode.size as u64, &mut out).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(&out[..], &data[300..300 + 2 * SECTOR_SIZE]);

        let mut rest = vec![0u8; 4 * SECTOR_SIZE];
        let n = read_at(&disk, INO, &inode, 3 * SECTOR_SIZE as u64, inode.size as u64, &mut rest).unwrap();
        assert_eq!(n, 17);
        assert_eq!(&rest[..17], &data[3 * SECTOR_SIZE..]);

        let n = read_at(&disk, INO, &inode, inode.size as u64, inode.size as u64, &mut rest).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn overwrite_in_the_middle_keeps_size_and_neighbours() {
        let (mut disk, mut inode) = fresh();
        let mut data = pattern(2 * SECTOR_SIZE);
        write_at(&mut disk, INO, &mut inode, 0, &data).unwrap();
        write_at(&mut disk, INO, &mut inode, 500, &[0xEE; 30]).unwrap();
        data[500..530].fill(0xEE);

        assert_eq!(inode.size as usize, 2 * SECTOR_SIZE);
        let mut out = vec![0u8; 2 * SECTOR_SIZE];
        read_at(&disk, INO, &inode, 0, inode.size as u64, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn write_is_bounded_by_max_file_size() {
        let (mut disk, mut inode) = fresh();
        write_at(&mut disk, INO, &mut inode, 0, &pattern(MAX_FILE_SIZE)).unwrap();
        assert!(matches!(
            write_at(&mut disk, INO, &mut inode, MAX_FILE_SIZE as u64, &[1]),
            Err(FsError::FileTooBig { .. })
        ));
        assert_eq!(inode.size as usize, MAX_FILE_SIZE);
    }

    #[test]
    fn out_of_space_keeps_partial_allocation_in_the_inode() {
        let (mut disk, mut inode) = fresh();
        let sectors = Bitmap::sector_map();
        // Dejar sólo dos sectores libres.
        sectors.init(&mut disk, crate::layout::TOTAL_SECTORS - 2).unwrap();
        assert!(matches!(
            write_at(&mut disk, INO, &mut inode, 0, &pattern(3 * SECTOR_SIZE)),
            Err(FsError::OutOfSpace)
        ));
        assert_eq!(inode.sectors().count(), 2);
        assert_eq!(inode.size, 0);
        assert_eq!(load_inode(&disk, INO).unwrap(), inode);

        // Lo que cabe en lo ya reservado se puede escribir.
        assert_eq!(
            write_at(&mut disk, INO, &mut inode, 0, &pattern(2 * SECTOR_SIZE)).unwrap(),
            2 * SECTOR_SIZE
        );
    }
}
