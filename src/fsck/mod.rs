pub mod fsck;
pub mod fsck_backend;
pub mod fsck_types;
pub mod volume_backend;

#[cfg(test)]
mod mock;

pub use fsck::run_fsck;
pub use fsck_backend::FsckBackend;
pub use fsck_types::FsckReport;
pub use volume_backend::VolumeBackend;
