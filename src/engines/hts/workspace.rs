use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::model::HtsError;

/// Temporary files of one synthesis run.
///
/// All of them live in the run directory, so two runs only share a path if
/// they share a run id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub train_config: PathBuf,
    pub synth_config: PathBuf,
    /// Label vocabulary fed to the `AU` directive.
    pub label_list: PathBuf,
    /// Utterance list synthesised when the input is a single label file.
    pub input_list: PathBuf,
    pub cmp_tied_list: PathBuf,
    pub dur_tied_list: PathBuf,
    pub gv_tied_list: PathBuf,
    pub cmp_script: PathBuf,
    pub dur_script: PathBuf,
    pub gv_script: PathBuf,
    pub straight_script: PathBuf,
    pub cmp_model: PathBuf,
    pub dur_model: PathBuf,
    pub gv_model: PathBuf,
}

impl WorkspacePaths {
    fn under(dir: &Path) -> Self {
        Self {
            train_config: dir.join("train.cfg"),
            synth_config: dir.join("synth.cfg"),
            label_list: dir.join("list_all"),
            input_list: dir.join("list_input_labels"),
            cmp_tied_list: dir.join("tiedlist_cmp"),
            dur_tied_list: dir.join("tiedlist_dur"),
            gv_tied_list: dir.join("tiedlist_gv"),
            cmp_script: dir.join("mku_cmp.hed"),
            dur_script: dir.join("mku_dur.hed"),
            gv_script: dir.join("mku_gv.hed"),
            straight_script: dir.join("straight.m"),
            cmp_model: dir.join("cmp.mmf"),
            dur_model: dir.join("dur.mmf"),
            gv_model: dir.join("gv.mmf"),
        }
    }

    pub fn all(&self) -> [&Path; 14] {
        [
            &self.train_config,
            &self.synth_config,
            &self.label_list,
            &self.input_list,
            &self.cmp_tied_list,
            &self.dur_tied_list,
            &self.gv_tied_list,
            &self.cmp_script,
            &self.dur_script,
            &self.gv_script,
            &self.straight_script,
            &self.cmp_model,
            &self.dur_model,
            &self.gv_model,
        ]
    }
}

/// Run directories allocated by this process and not yet released.
static ACTIVE: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

fn active() -> MutexGuard<'static, BTreeSet<PathBuf>> {
    ACTIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remove every live run directory under `root`, for use when the process
/// is interrupted and destructors will not run. Workspaces marked keep are
/// left alone. Returns the directories removed.
pub fn release_active_under(root: &Path) -> Vec<PathBuf> {
    let mut dirs = active();
    let targets: Vec<PathBuf> = dirs.iter().filter(|d| d.starts_with(root)).cloned().collect();
    let mut removed = Vec::new();
    for dir in targets {
        dirs.remove(&dir);
        match fs::remove_dir_all(&dir) {
            Ok(()) => removed.push(dir),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove workspace {}: {e}", dir.display()),
        }
    }
    removed
}

/// Run-scoped temporary directory.
///
/// Dropping the workspace releases it, whichever way the run ended.
#[derive(Debug)]
pub struct Workspace {
    run_id: Uuid,
    dir: PathBuf,
    paths: WorkspacePaths,
    keep: bool,
    released: bool,
}

impl Workspace {
    /// Create `<root>/run-<run_id>/` and derive the run's paths inside it.
    ///
    /// Fails if the run directory already exists.
    pub fn allocate(root: &Path, run_id: Uuid) -> Result<Self, HtsError> {
        fs::create_dir_all(root).map_err(|e| HtsError::fs(root, e))?;
        let dir = root.join(format!("run-{run_id}"));
        fs::create_dir(&dir).map_err(|e| HtsError::fs(&dir, e))?;
        log::debug!("Allocated workspace {}", dir.display());
        active().insert(dir.clone());

        Ok(Self {
            run_id,
            paths: WorkspacePaths::under(&dir),
            dir,
            keep: false,
            released: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    /// Leave the temporary files on disk when the workspace is dropped.
    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
        if self.released {
            return;
        }
        if keep {
            active().remove(&self.dir);
        } else {
            active().insert(self.dir.clone());
        }
    }

    /// Delete every workspace path. Missing files are not an error and
    /// calling this more than once is a no-op.
    pub fn release(&mut self) -> Result<(), HtsError> {
        if self.released {
            return Ok(());
        }
        for path in self.paths.all() {
            remove_if_exists(path)?;
        }
        let empty = match fs::read_dir(&self.dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(HtsError::fs(&self.dir, e)),
        };
        if empty {
            fs::remove_dir(&self.dir).map_err(|e| HtsError::fs(&self.dir, e))?;
        } else if self.dir.exists() {
            log::warn!(
                "Workspace {} holds unexpected files, leaving it in place",
                self.dir.display()
            );
        }
        self.released = true;
        active().remove(&self.dir);
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            log::info!("Keeping workspace {}", self.dir.display());
            return;
        }
        if let Err(e) = self.release() {
            log::warn!("Failed to release workspace {}: {e}", self.dir.display());
        }
    }
}

/// Remove a file, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> Result<(), HtsError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HtsError::fs(path, e)),
    }
}
