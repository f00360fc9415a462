use std::fmt;
use std::path::{Path, PathBuf};

use super::model::{HtsError, VoiceFiles};
use super::tool::{run_checked, ToolCommand, ToolRunner};
use super::voice::{Voice, DURATION_EXT};
use super::workspace::WorkspacePaths;

/// Base model of a GV directory.
pub const GV_BASE_MODEL: &str = "clustered.mmf";
/// Model list of a GV directory.
pub const GV_MODEL_LIST: &str = "gv.list";

/// Model families, in the order they must be composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Spectral, excitation and aperiodicity coefficient streams.
    Cmp,
    Dur,
    /// Global variance.
    Gv,
}

impl ModelFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Cmp => "cmp",
            ModelFamily::Dur => "dur",
            ModelFamily::Gv => "gv",
        }
    }

    /// Tree file stems (`<stem>.inf`) loaded for this family.
    pub fn tree_names<'v>(&self, voice: &'v Voice) -> Vec<&'v str> {
        match self {
            ModelFamily::Cmp | ModelFamily::Gv => {
                voice.streams().iter().map(|s| s.name.as_str()).collect()
            }
            ModelFamily::Dur => vec![DURATION_EXT],
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// HHEd edit script making unseen models for one family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionScript {
    trace_level: u32,
    trees: Vec<PathBuf>,
    vocabulary: PathBuf,
    tied_list: PathBuf,
}

impl DecisionScript {
    pub fn new(
        trace_level: u32,
        tree_dir: &Path,
        tree_names: &[&str],
        vocabulary: &Path,
        tied_list: &Path,
    ) -> Self {
        Self {
            trace_level,
            trees: tree_names
                .iter()
                .map(|name| tree_dir.join(format!("{name}.inf")))
                .collect(),
            vocabulary: vocabulary.to_path_buf(),
            tied_list: tied_list.to_path_buf(),
        }
    }

    pub fn trees(&self) -> &[PathBuf] {
        &self.trees
    }

    pub fn write(&self, path: &Path) -> Result<(), HtsError> {
        std::fs::write(path, self.to_string()).map_err(|e| HtsError::fs(path, e))
    }
}

impl fmt::Display for DecisionScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\nTR {}\n\n", self.trace_level)?;

        writeln!(f, "// Load trees")?;
        for tree in &self.trees {
            write!(f, "LT \"{}\"\n\n", tree.display())?;
        }

        writeln!(f, "// Make unseen")?;
        write!(f, "AU \"{}\"\n\n", self.vocabulary.display())?;

        writeln!(f, "// Compact")?;
        write!(f, "CO \"{}\"\n\n", self.tied_list.display())
    }
}

/// Everything needed to compose one family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionJob {
    pub family: ModelFamily,
    pub tree_dir: PathBuf,
    pub base_model: PathBuf,
    pub model_list: PathBuf,
    pub script: PathBuf,
    pub tied_list: PathBuf,
    pub output_model: PathBuf,
}

/// A model composed for the run's vocabulary, with its tied list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedModel {
    pub family: ModelFamily,
    pub model: PathBuf,
    pub tied_list: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedModels {
    pub cmp: ComposedModel,
    pub dur: ComposedModel,
    pub gv: Option<ComposedModel>,
}

/// Specialises the clustered models to the labels of a run through HHEd.
pub struct ModelComposer<'a> {
    voice: &'a Voice,
    train_config: &'a Path,
    vocabulary: &'a Path,
    runner: &'a dyn ToolRunner,
}

impl<'a> ModelComposer<'a> {
    pub fn new(
        voice: &'a Voice,
        train_config: &'a Path,
        vocabulary: &'a Path,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            voice,
            train_config,
            vocabulary,
            runner,
        }
    }

    /// Composition jobs in family order: cmp, dur, then gv when configured.
    pub fn jobs(&self, files: &VoiceFiles, ws: &WorkspacePaths) -> Vec<CompositionJob> {
        let mut jobs = vec![
            CompositionJob {
                family: ModelFamily::Cmp,
                tree_dir: files.cmp_tree_dir.clone(),
                base_model: files.cmp_model.clone(),
                model_list: files.model_list.clone(),
                script: ws.cmp_script.clone(),
                tied_list: ws.cmp_tied_list.clone(),
                output_model: ws.cmp_model.clone(),
            },
            CompositionJob {
                family: ModelFamily::Dur,
                tree_dir: files.dur_tree_dir.clone(),
                base_model: files.dur_model.clone(),
                model_list: files.model_list.clone(),
                script: ws.dur_script.clone(),
                tied_list: ws.dur_tied_list.clone(),
                output_model: ws.dur_model.clone(),
            },
        ];
        if let Some(gv_dir) = &files.gv_dir {
            jobs.push(CompositionJob {
                family: ModelFamily::Gv,
                tree_dir: gv_dir.clone(),
                base_model: gv_dir.join(GV_BASE_MODEL),
                model_list: gv_dir.join(GV_MODEL_LIST),
                script: ws.gv_script.clone(),
                tied_list: ws.gv_tied_list.clone(),
                output_model: ws.gv_model.clone(),
            });
        }
        jobs
    }

    pub fn script(&self, job: &CompositionJob) -> DecisionScript {
        DecisionScript::new(
            self.voice.generation().trace_level,
            &job.tree_dir,
            &job.family.tree_names(self.voice),
            self.vocabulary,
            &job.tied_list,
        )
    }

    pub fn command(&self, job: &CompositionJob) -> ToolCommand {
        ToolCommand::new(&self.voice.tools().hhed)
            .args(["-A", "-B", "-C"])
            .arg(self.train_config)
            .args(["-D", "-T", "1", "-p", "-i", "-H"])
            .arg(&job.base_model)
            .arg("-w")
            .arg(&job.output_model)
            .arg(&job.script)
            .arg(&job.model_list)
    }

    /// Write the decision script and run HHEd for one family.
    pub fn compose(&self, job: &CompositionJob) -> Result<ComposedModel, HtsError> {
        self.script(job).write(&job.script)?;
        run_checked(self.runner, &self.command(job))?;

        if !job.output_model.exists() {
            return Err(HtsError::MissingArtifact(job.output_model.clone()));
        }
        Ok(ComposedModel {
            family: job.family,
            model: job.output_model.clone(),
            tied_list: job.tied_list.clone(),
        })
    }

    /// Compose every family in order, stopping at the first failure.
    pub fn compose_all(
        &self,
        files: &VoiceFiles,
        ws: &WorkspacePaths,
    ) -> Result<ComposedModels, HtsError> {
        let mut cmp = None;
        let mut dur = None;
        let mut gv = None;
        for job in self.jobs(files, ws) {
            log::info!("Building unseen {} models", job.family);
            let composed = self.compose(&job)?;
            match job.family {
                ModelFamily::Cmp => cmp = Some(composed),
                ModelFamily::Dur => dur = Some(composed),
                ModelFamily::Gv => gv = Some(composed),
            }
        }
        match (cmp, dur) {
            (Some(cmp), Some(dur)) => Ok(ComposedModels { cmp, dur, gv }),
            _ => Err(HtsError::Config(
                "coefficient and duration models are both required".to_string(),
            )),
        }
    }
}
