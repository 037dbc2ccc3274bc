//! Persistence of winning genomes.

use crate::genome::Genome;
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Snapshot of the best genome of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub template: String,
    pub generation: u64,
    pub fitness: f64,
    pub genome: Genome,
}

/// Destination for archived genomes.
pub trait Archive {
    /// Persist `entry` and return where it was stored.
    fn save_template(&mut self, entry: &ArchiveEntry) -> Result<String>;
}

/// Archive writing one MessagePack file per entry into a directory.
pub struct DirArchive {
    dir: PathBuf,
}

impl DirArchive {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {dir:?}"))?;
        Ok(Self { dir })
    }

    /// Load every entry stored in `dir`, ordered by generation.
    pub fn load_entries<P: AsRef<Path>>(dir: P) -> Result<Vec<ArchiveEntry>> {
        let pattern = dir.as_ref().join("*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;

        let mut entries = Vec::new();
        for file in glob(pattern).context("failed to glob archive files")? {
            let file = file.context("failed to read glob entry")?;
            let reader =
                File::open(&file).with_context(|| format!("failed to open {file:?}"))?;
            let mut reader = BufReader::new(reader);
            let entry: ArchiveEntry = decode::from_read(&mut reader)
                .with_context(|| format!("failed to deserialize {file:?}"))?;
            entries.push(entry);
        }
        entries.sort_by(|a, b| (a.generation, &a.template).cmp(&(b.generation, &b.template)));
        Ok(entries)
    }
}

impl Archive for DirArchive {
    fn save_template(&mut self, entry: &ArchiveEntry) -> Result<String> {
        let file = self.dir.join(format!("{}.msgpack", entry.name));
        let writer = File::create(&file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(writer);
        encode::write(&mut writer, entry).context("failed to serialize archive entry")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(file.display().to_string())
    }
}

/// Archive keeping entries in memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    pub entries: Vec<ArchiveEntry>,
}

impl Archive for MemoryArchive {
    fn save_template(&mut self, entry: &ArchiveEntry) -> Result<String> {
        self.entries.push(entry.clone());
        Ok(format!("memory:{}", self.entries.len() - 1))
    }
}
