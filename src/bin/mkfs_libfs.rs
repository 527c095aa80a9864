// src/bin/mkfs_libfs.rs
use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use libfs::{logging, Volume};

fn main() -> Result<()> {
    logging::init();

    let mut args = env::args().skip(1);
    let image = args
        .next()
        .map(PathBuf::from)
        .context("Uso: mkfs.libfs imagen")?;

    if args.next().is_some() {
        return Err(anyhow!("Uso: mkfs.libfs imagen (solo un argumento)"));
    }

    // No se pisa una imagen existente
    if image.exists() {
        return Err(anyhow!("La imagen {:?} ya existe", image));
    }

    let volume = Volume::boot(&image)
        .with_context(|| format!("No se pudo formatear {:?}", image))?;
    let stats = volume.stats()?;

    println!(
        "mkfs.libfs: volumen {:?} creado con {} sectores, {} inodos máximos, {} sectores de datos.",
        volume.image_path(),
        stats.total_sectors,
        stats.max_files,
        stats.data_sectors
    );

    Ok(())
}
