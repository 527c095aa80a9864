/*EL ARCHIVO PRINCIPAL DE FSCK. Carga una foto del volumen desde el backend y
corre las validaciones: superblock, inodos, sectores compartidos, directorios,
bitmap de inodos contra alcanzabilidad y bitmap de sectores contra dueños. */
use std::collections::{HashMap, HashSet, VecDeque};

use log::info;

use super::{fsck_backend::FsckBackend, fsck_types::*};
use crate::error::Result;
use crate::layout::{DIRENTS_PER_SECTOR, FS_VERSION, MAX_DIR_ENTRIES, MAX_FILE_SIZE, OS_MAGIC, SECTOR_SIZE};
use crate::path::validate_name;

struct Snapshot {
    sb: Superblock,
    inodes: Vec<Inode>,
    inode_bitmap: Vec<bool>,
    sector_bitmap: Vec<bool>,
    dirs: HashMap<u32, Vec<Dirent>>,
}

impl Snapshot {
    fn in_use(&self, ino: usize) -> bool {
        self.inode_bitmap.get(ino).copied().unwrap_or(false)
    }

    fn used_inodes(&self) -> impl Iterator<Item = (usize, &Inode)> + '_ {
        self.inodes
            .iter()
            .enumerate()
            .filter(move |(ino, _)| self.in_use(*ino))
    }
}

/// Devuelve false si la geometría no permite seguir revisando.
fn check_superblock(snap: &Snapshot, report: &mut FsckReport) -> bool {
    let sb = &snap.sb;

    // 1. Magic y versión
    if sb.magic != OS_MAGIC {
        report.errors.push(format!(
            "Superblock: magic inválido ({:#X}, esperado {:#X})",
            sb.magic, OS_MAGIC
        ));
    }
    if sb.version != FS_VERSION {
        report.errors.push(format!(
            "Superblock: versión {} no soportada",
            sb.version
        ));
    }

    // 2. Coincidencia del número de inodos
    if sb.num_inodes as usize != snap.inodes.len() || snap.inodes.len() != snap.inode_bitmap.len() {
        report.errors.push(format!(
            "Superblock: num_inodes = {}, pero hay {} inodos y {} bits",
            sb.num_inodes,
            snap.inodes.len(),
            snap.inode_bitmap.len()
        ));
        report.inodes_ok = false;
        return false;
    }

    // 3. Coincidencia del número de sectores
    if sb.num_sectors as usize != snap.sector_bitmap.len() {
        report.errors.push(format!(
            "Superblock: num_sectors = {}, pero el bitmap tiene {} entradas",
            sb.num_sectors,
            snap.sector_bitmap.len()
        ));
        report.sectors_ok = false;
        return false;
    }

    // 4. root_inode y región de datos válidos
    if sb.root_inode as usize >= snap.inodes.len() {
        report.errors.push(format!(
            "Superblock: root_inode ({}) fuera de rango",
            sb.root_inode
        ));
        report.inodes_ok = false;
        return false;
    }
    if sb.data_start >= sb.num_sectors {
        report.errors.push(format!(
            "Superblock: la región de datos ({}) empieza fuera del disco",
            sb.data_start
        ));
        report.sectors_ok = false;
        return false;
    }
    true
}

/// Devuelve los inodos en uso con errores: sus sectores no se recorren.
fn check_inodes_basic(snap: &Snapshot, report: &mut FsckReport) -> HashSet<u32> {
    let sb = &snap.sb;
    let mut broken = HashSet::new();

    for (idx, inode) in snap.inodes.iter().enumerate() {
        if !snap.in_use(idx) {
            if inode.bad_kind || inode.size != 0 || inode.allocated().count() > 0 {
                report.errors.push(format!("Inodo {} libre pero con contenido", idx));
                report.inodes_ok = false;
            }
            continue;
        }
        let before = report.errors.len();

        if inode.bad_kind {
            report.errors.push(format!("Inodo {}: tipo desconocido", idx));
            report.inodes_ok = false;
        }

        // 1. Punteros contiguos y dentro de la región de datos
        let mut hole = false;
        let mut seen = HashSet::new();
        for &s in &inode.data {
            if s == 0 {
                hole = true;
                continue;
            }
            if hole {
                report.errors.push(format!("Inodo {}: punteros no contiguos", idx));
                report.inodes_ok = false;
                hole = false;
            }
            if s < sb.data_start || s >= sb.num_sectors {
                report.errors.push(format!(
                    "Inodo {}: sector fuera de la región de datos ({})",
                    idx, s
                ));
                report.inodes_ok = false;
            }
            // 2. Duplicados dentro del mismo inodo
            if !seen.insert(s) {
                report.errors.push(format!("Inodo {}: sector duplicado ({})", idx, s));
                report.inodes_ok = false;
            }
        }

        // 3. Tamaño coherente con los sectores
        let allocated = inode.allocated().count();
        let size = inode.size as usize;
        if inode.is_dir {
            let expected = (size + DIRENTS_PER_SECTOR - 1) / DIRENTS_PER_SECTOR;
            if size > MAX_DIR_ENTRIES || allocated != expected {
                report.errors.push(format!(
                    "Directorio {}: {} entradas en {} sectores (esperados {})",
                    idx, size, allocated, expected
                ));
                report.inodes_ok = false;
            }
        } else {
            let needed = (size + SECTOR_SIZE - 1) / SECTOR_SIZE;
            if size > MAX_FILE_SIZE || allocated < needed {
                report.errors.push(format!(
                    "Archivo {}: {} bytes con sólo {} sectores",
                    idx, size, allocated
                ));
                report.inodes_ok = false;
            }
        }

        if report.errors.len() > before {
            broken.insert(idx as u32);
        }
    }
    broken
}

fn check_sectors_global(snap: &Snapshot, report: &mut FsckReport) {
    let mut owners: HashMap<u32, usize> = HashMap::new();

    for (ino, inode) in snap.used_inodes() {
        for s in inode.allocated() {
            if let Some(prev) = owners.insert(s, ino) {
                if prev != ino {
                    report.errors.push(format!(
                        "Sector {} compartido por los inodos {} y {}",
                        s, prev, ino
                    ));
                    report.sectors_ok = false;
                }
            }
        }
    }
}

fn check_dirs(snap: &Snapshot, report: &mut FsckReport) {
    let root = snap.sb.root_inode as usize;
    if !snap.inodes[root].is_dir || !snap.in_use(root) {
        report.errors.push("Root inode no es un directorio en uso".into());
        report.inodes_ok = false;
    }

    for (&ino, entries) in &snap.dirs {
        if entries.len() != snap.inodes[ino as usize].size as usize {
            report.errors.push(format!(
                "Directorio {}: size = {} pero tiene {} entradas",
                ino,
                snap.inodes[ino as usize].size,
                entries.len()
            ));
            report.inodes_ok = false;
        }

        let mut names = HashSet::new();
        for entry in entries {
            // Nombre legal y único
            if validate_name(&entry.name).is_err() {
                report.errors.push(format!(
                    "Directorio {}: dirent con nombre ilegal {:?}",
                    ino, entry.name
                ));
            }
            if !names.insert(entry.name.as_str()) {
                report.errors.push(format!(
                    "Directorio {}: nombre repetido {:?}",
                    ino, entry.name
                ));
            }

            // Inodo destino existente y en uso
            if entry.inode as usize >= snap.inodes.len() {
                report.errors.push(format!(
                    "Directorio {}: dirent '{}' apunta a inodo inexistente ({})",
                    ino, entry.name, entry.inode
                ));
                report.inodes_ok = false;
                continue;
            }
            if !snap.in_use(entry.inode as usize) {
                report.errors.push(format!(
                    "Directorio {}: dirent '{}' apunta al inodo libre {}",
                    ino, entry.name, entry.inode
                ));
                report.inodes_ok = false;
            }
        }
    }
}

fn check_inode_bitmap(snap: &Snapshot, report: &mut FsckReport) {
    let root = snap.sb.root_inode;
    let mut referenced = vec![0usize; snap.inodes.len()];
    referenced[root as usize] = 1;

    // Recorrido en anchura desde la raíz
    let mut queue = VecDeque::from([root]);
    let mut visited = HashSet::from([root]);
    while let Some(ino) = queue.pop_front() {
        let Some(entries) = snap.dirs.get(&ino) else {
            continue;
        };
        for entry in entries {
            let Some(count) = referenced.get_mut(entry.inode as usize) else {
                continue;
            };
            *count += 1;
            if visited.insert(entry.inode) {
                queue.push_back(entry.inode);
            }
        }
    }

    for (ino, &count) in referenced.iter().enumerate() {
        if count > 1 {
            report.errors.push(format!("Inodo {} enlazado {} veces", ino, count));
            report.inodes_ok = false;
        }
        if snap.in_use(ino) && count == 0 {
            report.errors.push(format!("Inodo {} huérfano", ino));
            report.inodes_ok = false;
        }
    }
}

fn check_sector_bitmap(snap: &Snapshot, report: &mut FsckReport) {
    let data_start = snap.sb.data_start as usize;
    let mut owned = vec![false; snap.sector_bitmap.len()];
    owned[..data_start].fill(true);
    for (_, inode) in snap.used_inodes() {
        for s in inode.allocated() {
            if let Some(slot) = owned.get_mut(s as usize) {
                *slot = true;
            }
        }
    }

    for (sector, (&marked, &expected)) in snap.sector_bitmap.iter().zip(&owned).enumerate() {
        if marked && !expected {
            report.errors.push(format!(
                "Bitmap marca usado el sector {}, pero nadie lo usa",
                sector
            ));
            report.sectors_ok = false;
        }
        if !marked && expected {
            report.errors.push(format!(
                "Bitmap marca libre el sector {}, pero está en uso",
                sector
            ));
            report.sectors_ok = false;
        }
    }
}

pub fn run_fsck<B: FsckBackend>(backend: &B) -> Result<FsckReport> {
    let mut report = FsckReport::new();

    let mut snap = Snapshot {
        sb: backend.load_superblock()?,
        inodes: backend.load_all_inodes()?,
        inode_bitmap: backend.load_inode_bitmap()?,
        sector_bitmap: backend.load_sector_bitmap()?,
        dirs: HashMap::new(),
    };

    // --- Paso 1: Validación del superblock ---
    if !check_superblock(&snap, &mut report) {
        return Ok(report);
    }

    // --- Paso 2: Validación básica de inodos ---
    let broken = check_inodes_basic(&snap, &mut report);

    // --- Paso 3: Sectores compartidos entre inodos ---
    check_sectors_global(&snap, &mut report);

    // --- Paso 4: Validación de directorios ---
    let dir_inodes: Vec<u32> = snap
        .used_inodes()
        .filter(|(_, inode)| inode.is_dir)
        .map(|(ino, _)| ino as u32)
        .filter(|ino| !broken.contains(ino))
        .collect();
    for ino in dir_inodes {
        match backend.read_dir(ino) {
            Ok(entries) => {
                snap.dirs.insert(ino, entries);
            }
            Err(e) => {
                report.errors.push(format!("Directorio {}: no se pudo leer ({})", ino, e));
                report.inodes_ok = false;
            }
        }
    }
    check_dirs(&snap, &mut report);

    // --- Paso 5: Bitmap de inodos contra alcanzabilidad ---
    check_inode_bitmap(&snap, &mut report);

    // --- Paso 6: Bitmap de sectores contra dueños ---
    check_sector_bitmap(&snap, &mut report);

    info!("fsck: {} errores", report.errors.len());
    Ok(report)
}
