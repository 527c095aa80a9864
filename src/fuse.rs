use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr,
    FileType,
    Filesystem,
    MountOption,
    ReplyAttr,
    ReplyCreate,
    ReplyData,
    ReplyDirectory,
    ReplyEmpty,
    ReplyEntry,
    ReplyOpen,
    ReplyStatfs,
    ReplyWrite,
    Request,
    TimeOrNow,
};
use libc::{EINVAL, ENOENT};
use log::{debug, error, info};

use crate::error::{FsError, Result};
use crate::fs::{Stat, Volume};
use crate::layout::{InodeKind, DIRENT_SIZE, MAX_NAME, SECTOR_SIZE};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

// -----------------------------------------------------------------------------
// Conversión de Stat a FileAttr de FUSE
// -----------------------------------------------------------------------------

/// FUSE reserva el 0, así que el inodo `n` del volumen se publica como `n + 1`.
fn to_fuse_ino(inode: u32) -> u64 {
    inode as u64 + 1
}

fn to_volume_ino(ino: u64) -> u32 {
    (ino - 1) as u32
}

pub fn stat_to_attr(stat: &Stat) -> FileAttr {
    // El volumen no guarda tiempos ni dueños.
    let (kind, perm, nlink, size) = match stat.kind {
        InodeKind::Directory => (FileType::Directory, 0o755, 2, stat.size * DIRENT_SIZE as u64),
        InodeKind::File => (FileType::RegularFile, 0o644, 1, stat.size),
    };
    FileAttr {
        ino: to_fuse_ino(stat.inode),
        size,
        blocks: (size + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64,
        atime: UNIX_EPOCH,
        mtime: UNIX_EPOCH,
        ctime: UNIX_EPOCH,
        crtime: UNIX_EPOCH,
        kind,
        perm,
        nlink,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: SECTOR_SIZE as u32,
        flags: 0,
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

// -------------------- Adaptador FUSE --------------------

/// Expone un `Volume` por FUSE. Como el volumen trabaja con rutas, se recuerda
/// la ruta de cada inodo que el kernel ya conoce.
pub struct LibFuse {
    volume: Arc<Mutex<Volume>>,
    paths: HashMap<u64, String>,
}

impl LibFuse {
    pub fn new(volume: Volume) -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT_INO, "/".to_string());
        Self {
            volume: Arc::new(Mutex::new(volume)),
            paths,
        }
    }

    /// Monta el volumen con FUSE en el punto de montaje indicado.
    pub fn run(self, mountpoint: &Path) -> anyhow::Result<()> {
        let options = vec![
            MountOption::FSName("libfs".to_string()),
            MountOption::AutoUnmount,
            MountOption::RW,
        ];

        info!("montando en {:?}", mountpoint);
        fuser::mount2(self, mountpoint, &options)?;
        Ok(())
    }

    fn volume(&self) -> MutexGuard<'_, Volume> {
        self.volume.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn path_of(&self, ino: u64) -> Result<String> {
        self.paths
            .get(&ino)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("ino {}", ino)))
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String> {
        let name = name
            .to_str()
            .ok_or_else(|| FsError::IllegalName(name.to_string_lossy().into_owned()))?;
        Ok(child_path(&self.path_of(parent)?, name))
    }

    /// Resuelve `path` y lo deja registrado con su número de inodo.
    fn remember(&mut self, path: String) -> Result<FileAttr> {
        let stat = self.volume().stat(&path)?;
        let attr = stat_to_attr(&stat);
        self.paths.insert(attr.ino, path);
        Ok(attr)
    }

    fn forget(&mut self, path: &str) {
        self.paths.retain(|_, p| p != path);
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let path = self.child_of(parent, name)?;
        self.remember(path)
    }

    fn do_mkdir(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let path = self.child_of(parent, name)?;
        self.volume().dir_create(&path)?;
        self.remember(path)
    }

    fn do_create(&mut self, parent: u64, name: &OsStr) -> Result<(FileAttr, u64)> {
        let path = self.child_of(parent, name)?;
        let fd = {
            let mut vol = self.volume();
            vol.file_create(&path)?;
            vol.file_open(&path)?
        };
        let attr = self.remember(path)?;
        Ok((attr, fd as u64))
    }

    fn do_read(&mut self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>> {
        let mut vol = self.volume();
        match vol.file_seek(fh as usize, offset) {
            Ok(_) => {}
            // Más allá del EOF
            Err(FsError::SeekOutOfBounds { .. }) if offset >= 0 => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        let mut buf = vec![0u8; size as usize];
        let n = vol.file_read(fh as usize, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn do_write(&mut self, fh: u64, offset: i64, data: &[u8]) -> Result<usize> {
        let mut vol = self.volume();
        vol.file_seek(fh as usize, offset)?;
        vol.file_write(fh as usize, data)
    }

    fn do_readdir(&mut self, ino: u64) -> Result<(u64, Vec<(u64, FileType, String)>)> {
        let path = self.path_of(ino)?;
        let (parent, entries) = {
            let vol = self.volume();
            let parent = vol.stat(parent_path(&path))?;
            (to_fuse_ino(parent.inode), vol.dir_list(&path)?)
        };

        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            let child = to_fuse_ino(e.inode);
            let kind = match e.kind {
                InodeKind::Directory => FileType::Directory,
                InodeKind::File => FileType::RegularFile,
            };
            self.paths.insert(child, child_path(&path, &e.name));
            out.push((child, kind, e.name));
        }
        Ok((parent, out))
    }
}

// -----------------------------------------------------------------------------
// Implementación FUSE
// -----------------------------------------------------------------------------

impl Filesystem for LibFuse {
    fn destroy(&mut self) {
        debug!("destroy");
        if let Err(e) = self.volume().sync() {
            error!("destroy: no se pudo guardar la imagen: {}", e);
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup: parent = {parent}, name = {:?}", name);
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino = {ino}");
        if ino == 0 {
            reply.error(ENOENT);
            return;
        }
        match self.volume().stat_inode(to_volume_ino(ino)) {
            Ok(stat) => reply.attr(&TTL, &stat_to_attr(&stat)),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    // Sin permisos, dueños ni truncado: se devuelven los atributos actuales.
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino = {ino}, size = {:?}", size);
        if ino == 0 {
            reply.error(ENOENT);
            return;
        }
        match self.volume().stat_inode(to_volume_ino(ino)) {
            Ok(stat) => reply.attr(&TTL, &stat_to_attr(&stat)),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir: ino = {ino}");
        let stat = self
            .path_of(ino)
            .and_then(|path| self.volume().stat(&path));
        match stat {
            Ok(stat) if stat.kind == InodeKind::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino = {ino}, offset = {offset}");
        let (parent, entries) = match self.do_readdir(ino) {
            Ok(v) => v,
            Err(e) => {
                reply.error(e.as_errno());
                return;
            }
        };

        let mut offset_i = offset as usize;

        // "." (offset 0)
        if offset_i == 0 {
            if reply.add(ino, 1, FileType::Directory, ".") {
                reply.ok();
                return;
            }
            offset_i = 1;
        }

        // ".." (offset 1)
        if offset_i == 1 {
            if reply.add(parent, 2, FileType::Directory, "..") {
                reply.ok();
                return;
            }
            offset_i = 2;
        }

        for (i, (child, kind, name)) in entries.iter().enumerate().skip(offset_i - 2) {
            if reply.add(*child, (i + 3) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir: parent = {parent}, name = {:?}", name);
        match self.do_mkdir(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir: parent = {parent}, name = {:?}", name);
        let result = self.child_of(parent, name).and_then(|path| {
            self.volume().dir_unlink(&path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                self.forget(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create: parent = {parent}, name = {:?}", name);
        match self.do_create(parent, name) {
            Ok((attr, fh)) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink: parent = {parent}, name = {:?}", name);
        let result = self.child_of(parent, name).and_then(|path| {
            self.volume().file_unlink(&path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                self.forget(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino = {ino}, flags = {flags}");
        let fd = self
            .path_of(ino)
            .and_then(|path| self.volume().file_open(&path));
        match fd {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino = {ino}, fh = {fh}, offset = {offset}, size = {size}");
        if offset < 0 {
            reply.error(EINVAL);
            return;
        }
        match self.do_read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino = {ino}, fh = {fh}, offset = {offset}, len = {}", data.len());
        match self.do_write(fh, offset, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release: ino = {ino}, fh = {fh}");
        match self.volume().file_close(fh as usize) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    // fsync: vuelca el disco completo a la imagen
    fn fsync(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        debug!("fsync: ino = {ino}");
        match self.volume().sync() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.volume().stats() {
            Ok(st) => reply.statfs(
                st.total_sectors,
                st.free_sectors,
                st.free_sectors,
                st.max_files,
                st.free_inodes,
                SECTOR_SIZE as u32,
                (MAX_NAME - 1) as u32,
                SECTOR_SIZE as u32,
            ),
            Err(e) => reply.error(e.as_errno()),
        }
    }
}
