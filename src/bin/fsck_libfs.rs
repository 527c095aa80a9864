// src/bin/fsck_libfs.rs
use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use colored::*;
use libfs::fsck::{run_fsck, FsckReport, VolumeBackend};
use libfs::{logging, Volume};

fn main() -> Result<()> {
    logging::init();

    let image = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("Uso: fsck.libfs imagen")?;

    // Boot formatearía una imagen ausente; aquí eso es un error
    if !image.exists() {
        return Err(anyhow!("La imagen {:?} no existe", image));
    }

    let volume = Volume::boot(&image)
        .with_context(|| format!("No se pudo cargar {:?}", image))?;
    let rep = run_fsck(&VolumeBackend::new(&volume))?;

    print_report(&rep);

    if !rep.is_clean() {
        process::exit(1);
    }
    Ok(())
}

fn print_report(rep: &FsckReport) {
    println!("\n{}", " LIBFS FILESYSTEM CHECK ".on_blue().bold());
    println!("{}", "──────────────────────────────────────────".blue());

    // ------------------------------------------
    //       RESULTADOS DE SECTORES
    // ------------------------------------------
    println!("\n{}", "Sectores".bold().underline());

    if rep.sectors_ok {
        println!("  {} Sectores OK", "✓".green());
    } else {
        println!("  {} Errores en sectores", "✗".red());
    }

    // ------------------------------------------
    //       RESULTADOS DE INODOS
    // ------------------------------------------
    println!("\n{}", "Inodos".bold().underline());

    if rep.inodes_ok {
        println!("  {} Inodos OK", "✓".green());
    } else {
        println!("  {} Errores en inodos", "✗".red());
    }

    // ------------------------------------------
    //       ERRORES DETALLADOS
    // ------------------------------------------
    println!("\n{}", "Errores detectados".bold().underline());

    if rep.errors.is_empty() {
        println!("  {} No se encontraron errores", "✓".green());
    } else {
        for err in &rep.errors {
            println!("  {} {}", "•".red(), err.red());
        }
    }

    println!("\n{}", "Resumen".bold().underline());

    if rep.errors.is_empty() {
        println!("{} Sistema de archivos limpio.\n", "✓ OK".green().bold());
    } else {
        println!(
            "{} {} errores encontrados.\n",
            "✗ FSCK completado con errores:".red().bold(),
            rep.errors.len().to_string().yellow()
        );
    }
}
