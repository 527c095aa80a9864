mod bitmap;
mod dir;
mod disk;
mod error;
mod file;
mod fs;
mod inode;
mod layout;
mod path;

pub mod fsck;
pub mod fuse;
pub mod logging;

pub use crate::bitmap::{Bitmap, BITS_PER_SECTOR};
pub use crate::dir::DirEntry;
pub use crate::disk::{BlockDevice, Disk, DiskError};
pub use crate::error::{FsError, Result};
pub use crate::file::{Fd, OpenFile};
pub use crate::fs::{Stat, Volume, VolumeStats};
pub use crate::fuse::LibFuse;
pub use crate::layout::{
    DirEntryDisk,
    InodeDisk,
    InodeKind,
    SuperblockDisk,
    DATABLOCK_START_SECTOR,
    DIRENTS_PER_SECTOR,
    DIRENT_SIZE,
    INODE_BITMAP_SECTORS,
    INODE_BITMAP_START_SECTOR,
    INODE_TABLE_SECTORS,
    INODE_TABLE_START_SECTOR,
    MAX_FILES,
    MAX_FILE_SIZE,
    MAX_NAME,
    MAX_OPEN_FILES,
    MAX_SECTORS_PER_FILE,
    OS_MAGIC,
    ROOT_INODE,
    SECTOR_BITMAP_SECTORS,
    SECTOR_BITMAP_START_SECTOR,
    SECTOR_SIZE,
    TOTAL_SECTORS,
};
pub use crate::path::validate_name;
