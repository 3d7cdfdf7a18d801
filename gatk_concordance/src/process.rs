use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tempfile::TempDir;

use crate::{
    concordance::run_concordance,
    config::Config,
    container::{ContainerRunner, DockerRunner},
    filestore::{FileStore, LocalFileStore},
    publish::publish,
    stage::stage_inputs,
    transfer::{RemoteTransfer, Transfer},
};

/// Progress of a run.  Any failure moves the run to Failed; there are no retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Parsed,
    Staging,
    Staged,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parsed => "parsed",
            Self::Staging => "staging",
            Self::Staged => "staged",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Directory layout below the work directory
///
/// staging - downloaded inputs (kept between runs if the work directory is given)
/// store - job-file store
/// job dirs - fresh directory for each tool run
///
pub struct WorkDirs {
    root: PathBuf,
}

impl WorkDirs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    pub fn staging(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }

    pub fn new_job_dir(&self) -> anyhow::Result<TempDir> {
        tempfile::Builder::new()
            .prefix("concordance-")
            .tempdir_in(&self.root)
            .with_context(|| {
                format!("Could not create job directory in {}", self.root.display())
            })
    }
}

pub struct Pipeline<'a> {
    cfg: &'a Config,
    transfer: &'a dyn Transfer,
    store: &'a dyn FileStore,
    runner: &'a dyn ContainerRunner,
    state: RunState,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a Config,
        transfer: &'a dyn Transfer,
        store: &'a dyn FileStore,
        runner: &'a dyn ContainerRunner,
    ) -> Self {
        Self {
            cfg,
            transfer,
            store,
            runner,
            state: RunState::Parsed,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn set_state(&mut self, state: RunState) {
        debug!("Run state {} -> {}", self.state, state);
        self.state = state
    }

    /// Stage inputs, run GATK in job_dir and publish the report.
    /// Returns the published location of the report
    pub fn run(&mut self, dirs: &WorkDirs, job_dir: &Path) -> anyhow::Result<String> {
        let res = self.run_stages(dirs, job_dir);
        if res.is_err() {
            self.set_state(RunState::Failed)
        }
        res
    }

    fn run_stages(&mut self, dirs: &WorkDirs, job_dir: &Path) -> anyhow::Result<String> {
        self.set_state(RunState::Staging);
        info!("Staging {} input files", self.cfg.inputs().len());
        let staged = stage_inputs(self.cfg.inputs(), &dirs.staging(), self.transfer, self.store)?;
        self.set_state(RunState::Staged);

        self.set_state(RunState::Running);
        let output = run_concordance(self.cfg, &staged, self.store, self.runner, job_dir)?;

        info!("Publishing {} to {}", output.display(), self.cfg.destination());
        let dest = publish(&output, self.cfg.destination(), self.transfer)
            .with_context(|| format!("Error publishing output to {}", self.cfg.destination()))?;
        self.set_state(RunState::Completed);
        Ok(dest)
    }
}

/// Set up the work directories and collaborators, then run the pipeline
pub fn process(cfg: &Config) -> anyhow::Result<()> {
    // Without a work directory use a temporary one, removed at the end of a successful run
    let (tmp_root, root) = match cfg.work_dir() {
        Some(d) => {
            std::fs::create_dir_all(d)
                .with_context(|| format!("Error creating work directory {}", d.display()))?;
            (None, d.to_owned())
        }
        None => {
            let t = TempDir::new().with_context(|| "Could not create temporary work directory")?;
            let p = t.path().to_owned();
            (Some(t), p)
        }
    };
    debug!("Work directory: {}", root.display());

    let dirs = WorkDirs::new(&root);
    let store = LocalFileStore::new(dirs.store())?;
    let transfer = RemoteTransfer::new(cfg.ssec_key())?;
    let runner = DockerRunner::new(cfg.sudo());
    let job_dir = dirs.new_job_dir()?;

    let mut pipeline = Pipeline::new(cfg, &transfer, &store, &runner);
    let res = pipeline.run(&dirs, job_dir.path());
    debug!("Run finished in state {}", pipeline.state());
    match res {
        Ok(dest) => {
            info!("Concordance report written to {}", dest);
            Ok(())
        }
        Err(e) => {
            // Keep files for diagnosis
            let p = job_dir.keep();
            if let Some(t) = tmp_root {
                let _ = t.keep();
            }
            warn!("Working directory {} has been kept", p.display());
            Err(e)
        }
    }
}
