use crate::archive::{ArchiveEntry, DirArchive};
use crate::arena::Arena;
use crate::config::Config;
use crate::population::{Phase, PopulationController};
use crate::stats::{Accumulator, AccumulatorReport, GenerationReport};
use anyhow::{Context, Result, bail};
use glob::glob;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Best results of one template over a whole run.
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResults {
    pub template: String,
    pub best_fitness: f64,
    pub best_generation: u64,
    pub best_name: Option<String>,
    pub generation_best: AccumulatorReport,
}

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg = Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Run a simulation for `generations` generations in a new run dir.
    ///
    /// With `seed_run`, each cohort starts from the latest template archived
    /// for it in that run instead of from its declared genes.
    pub fn create_run(&self, generations: u64, seed_run: Option<usize>) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;
        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let archive = DirArchive::new(self.templates_dir(run_idx))
            .context("failed to construct archive")?;
        let world = Arena::new(self.cfg.arena.clone());
        let generators = self.cfg.generators().context("failed to build generators")?;
        let rng = self.cfg.rng()?;

        let mut ctrl = PopulationController::new(
            self.cfg.evolution_params(),
            generators,
            world,
            archive,
            self.cfg.environment(),
            rng,
        );

        ctrl.start_simulation()
            .context("failed to start simulation")?;

        if let Some(seed_idx) = seed_run {
            let entries = DirArchive::load_entries(self.templates_dir(seed_idx))
                .with_context(|| format!("failed to load templates of run {seed_idx}"))?;
            for i_cohort in 0..ctrl.n_cohorts() {
                let name = ctrl.template(i_cohort).name.clone();
                let Some(entry) = entries.iter().rev().find(|entry| entry.template == name) else {
                    bail!("run {seed_idx} has no archived template for {name:?}");
                };
                ctrl.seed_agents(i_cohort, std::slice::from_ref(&entry.genome), true)
                    .with_context(|| format!("failed to seed {name:?} from {:?}", entry.name))?;
                log::info!("seeded {name:?} from {:?}", entry.name);
            }
        }

        let dt = self.cfg.simulation.tick;
        let mut last_generation = ctrl.generation();
        while ctrl.generation() < generations && ctrl.phase() == Phase::Running {
            ctrl.tick(dt).context("failed to perform tick")?;

            if ctrl.generation() != last_generation {
                last_generation = ctrl.generation();
                let progress = 100.0 * last_generation as f64 / generations as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        ctrl.stop_simulation();

        write_msgpack(self.history_file(run_idx), ctrl.history())
            .context("failed to save history")?;

        Ok(())
    }

    /// Summarize every run into a results file.
    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let history: Vec<GenerationReport> = read_msgpack(self.history_file(run_idx))
                .context("failed to load history")?;
            let entries = DirArchive::load_entries(self.templates_dir(run_idx))
                .context("failed to load archived templates")?;

            let results = summarize(&history, &entries);
            for res in &results {
                log::info!(
                    "run {run_idx} {}: best {:.3} in generation {} ({})",
                    res.template,
                    res.best_fitness,
                    res.best_generation,
                    res.best_name.as_deref().unwrap_or("not archived")
                );
            }

            write_msgpack(self.results_file(run_idx), &results)
                .context("failed to save results")?;
        }

        Ok(())
    }

    /// Remove every run dir.
    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs()? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }
        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(dirs)
    }

    fn count_run_dirs(&self) -> Result<usize> {
        Ok(self.run_dirs()?.len())
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn templates_dir(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("templates")
    }

    fn history_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("history.msgpack")
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.msgpack")
    }
}

fn summarize(history: &[GenerationReport], entries: &[ArchiveEntry]) -> Vec<TemplateResults> {
    let mut templates: Vec<&str> = Vec::new();
    for report in history {
        if !templates.contains(&report.template.as_str()) {
            templates.push(&report.template);
        }
    }

    templates
        .into_iter()
        .map(|template| {
            let mut acc = Accumulator::new();
            let mut best: Option<&GenerationReport> = None;
            for report in history.iter().filter(|report| report.template == template) {
                let max = report.fitness.max;
                if max.is_nan() {
                    continue;
                }
                acc.add(max);
                if best.is_none_or(|best| max > best.fitness.max) {
                    best = Some(report);
                }
            }

            let best_generation = best.map_or(0, |report| report.generation);
            let best_name = entries
                .iter()
                .find(|entry| entry.template == template && entry.generation == best_generation)
                .map(|entry| entry.name.clone());

            TemplateResults {
                template: template.to_string(),
                best_fitness: best.map_or(f64::NAN, |report| report.fitness.max),
                best_generation,
                best_name,
                generation_best: acc.report(),
            }
        })
        .collect()
}

fn write_msgpack<P: AsRef<Path>, T: Serialize + ?Sized>(file: P, val: &T) -> Result<()> {
    let file = file.as_ref();
    let writer = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(writer);
    encode::write(&mut writer, val).context("failed to serialize value")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

fn read_msgpack<P: AsRef<Path>, T: for<'de> Deserialize<'de>>(file: P) -> Result<T> {
    let file = file.as_ref();
    if !file.is_file() {
        bail!("{file:?} does not exist");
    }
    let reader = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(reader);
    decode::from_read(&mut reader).context("failed to deserialize value")
}
