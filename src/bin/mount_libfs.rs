// src/bin/mount_libfs.rs
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use libfs::{logging, LibFuse, Volume};

fn main() -> Result<()> {
    logging::init();

    // 1. Leer argumentos de la línea de comandos
    //    Esperamos: mount_libfs imagen mountpoint/
    let mut args = env::args().skip(1);

    let image = args
        .next()
        .map(PathBuf::from)
        .context("Uso: mount_libfs imagen mountpoint/")?;

    let mountpoint = args
        .next()
        .map(PathBuf::from)
        .context("Uso: mount_libfs imagen mountpoint/")?;

    // 2. Arrancar el volumen (si la imagen no existe se formatea)
    let volume = Volume::boot(&image)
        .with_context(|| format!("Error al iniciar el volumen {:?}", image))?;

    // 3. Montar con FUSE; al desmontar se guarda la imagen
    LibFuse::new(volume).run(&mountpoint)
}
