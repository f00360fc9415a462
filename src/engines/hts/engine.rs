use std::path::{Path, PathBuf};

use derive_builder::Builder;

use crate::{SynthesisEngine, SynthesisReport};

use super::generate::GenerationType;
use super::model::{HtsError, HtsModel, RunRequest, VoiceFiles};
use super::tool::{ProcessRunner, ToolRunner};

/// Parameters for configuring HTS model loading.
///
/// Every path left at `None` is looked up in the model directory:
///
/// | field | default |
/// |---|---|
/// | `cmp_model` | `<dir>/cmp.mmf` |
/// | `dur_model` | `<dir>/dur.mmf` |
/// | `model_list` | `<dir>/full.list` |
/// | `cmp_tree_dir` | `<dir>/trees/cmp` |
/// | `dur_tree_dir` | `<dir>/trees/dur` |
///
/// Global variance is only used when `gv_dir` is set.
#[derive(Debug, Clone, Default)]
pub struct HtsModelParams {
    pub cmp_model: Option<PathBuf>,
    pub dur_model: Option<PathBuf>,
    pub model_list: Option<PathBuf>,
    pub cmp_tree_dir: Option<PathBuf>,
    pub dur_tree_dir: Option<PathBuf>,
    pub gv_dir: Option<PathBuf>,
}

impl HtsModelParams {
    fn resolve(self, model_dir: &Path) -> VoiceFiles {
        VoiceFiles {
            cmp_model: self.cmp_model.unwrap_or_else(|| model_dir.join("cmp.mmf")),
            dur_model: self.dur_model.unwrap_or_else(|| model_dir.join("dur.mmf")),
            model_list: self.model_list.unwrap_or_else(|| model_dir.join("full.list")),
            cmp_tree_dir: self
                .cmp_tree_dir
                .unwrap_or_else(|| model_dir.join("trees").join("cmp")),
            dur_tree_dir: self
                .dur_tree_dir
                .unwrap_or_else(|| model_dir.join("trees").join("dur")),
            gv_dir: self.gv_dir,
        }
    }
}

/// Parameters for configuring an HTS synthesis request.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct HtsInferenceParams {
    /// HMGenS parameter generation type (0, 1 or 2).
    pub generation_type: u8,
    /// The input is an utterance list (scp) rather than a single label file.
    pub input_is_list: bool,
    /// Stream external tool output to the console.
    pub verbose: bool,
    /// Root under which run workspaces are allocated.
    #[builder(setter(into))]
    pub workdir: PathBuf,
    /// Leave the run workspace on disk for inspection.
    pub keep_workspace: bool,
}

impl Default for HtsInferenceParams {
    fn default() -> Self {
        Self {
            generation_type: 0,
            input_is_list: false,
            verbose: false,
            workdir: std::env::temp_dir().join("hts-synth"),
            keep_workspace: false,
        }
    }
}

/// HTS unseen-model synthesis engine.
///
/// Specialises a trained HTS voice to the input labels, generates speech
/// parameters with HMGenS and renders them with STRAIGHT.
///
/// # Quick Start
///
/// ```rust,no_run
/// use hts_synth::{SynthesisEngine, engines::hts::HtsEngine};
/// use std::path::Path;
///
/// let mut engine = HtsEngine::new();
/// engine.load_model(Path::new("voices/slt"))?;
/// let report = engine.synthesize(Path::new("labels/a01.lab"), Path::new("wav"), None)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Custom tool runner
///
/// ```rust,no_run
/// use hts_synth::engines::hts::{HtsEngine, ProcessRunner};
///
/// // Always stream the tools' output, whatever the request says.
/// let engine = HtsEngine::with_runner(Box::new(ProcessRunner::new(true)));
/// ```
pub struct HtsEngine {
    model: Option<HtsModel>,
    model_path: Option<PathBuf>,
    runner: Option<Box<dyn ToolRunner>>,
}

impl Default for HtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HtsEngine {
    /// Create a new engine running the tools found on PATH.
    pub fn new() -> Self {
        Self {
            model: None,
            model_path: None,
            runner: None,
        }
    }

    /// Create a new engine that sends every tool invocation to `runner`.
    pub fn with_runner(runner: Box<dyn ToolRunner>) -> Self {
        Self {
            model: None,
            model_path: None,
            runner: Some(runner),
        }
    }

    /// The loaded model, if any.
    pub fn model(&self) -> Option<&HtsModel> {
        self.model.as_ref()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }
}

impl Drop for HtsEngine {
    fn drop(&mut self) {
        self.unload_model();
    }
}

impl SynthesisEngine for HtsEngine {
    type SynthesisParams = HtsInferenceParams;
    type ModelParams = HtsModelParams;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let files = params.resolve(model_path);
        let model = HtsModel::load(model_path, files)?;
        self.model = Some(model);
        self.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    fn unload_model(&mut self) {
        self.model = None;
        self.model_path = None;
    }

    fn synthesize(
        &mut self,
        input: &Path,
        output_dir: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisReport, Box<dyn std::error::Error>> {
        let model = self.model.as_ref().ok_or(HtsError::ModelNotLoaded)?;

        let p = params.unwrap_or_default();
        let request = RunRequest {
            input: input.to_path_buf(),
            input_is_list: p.input_is_list,
            output_dir: output_dir.to_path_buf(),
            generation_type: GenerationType::try_from(p.generation_type)?,
            workdir: p.workdir,
            keep_workspace: p.keep_workspace,
        };

        let report = match &self.runner {
            Some(runner) => model.synthesize_labels(&request, runner.as_ref())?,
            None => model.synthesize_labels(&request, &ProcessRunner::new(p.verbose))?,
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_params_default_to_voice_directory_layout() {
        let files = HtsModelParams {
            gv_dir: Some("/v/gv".into()),
            ..Default::default()
        }
        .resolve(Path::new("/v"));
        assert_eq!(files.cmp_model, PathBuf::from("/v/cmp.mmf"));
        assert_eq!(files.model_list, PathBuf::from("/v/full.list"));
        assert_eq!(files.dur_tree_dir, PathBuf::from("/v/trees/dur"));
        assert_eq!(files.gv_dir, Some(PathBuf::from("/v/gv")));
    }

    #[test]
    fn explicit_model_params_win() {
        let files = HtsModelParams {
            cmp_model: Some("/elsewhere/cmp.mmf".into()),
            ..Default::default()
        }
        .resolve(Path::new("/v"));
        assert_eq!(files.cmp_model, PathBuf::from("/elsewhere/cmp.mmf"));
        assert_eq!(files.gv_dir, None);
    }

    #[test]
    fn inference_params_builder_fills_defaults() {
        let params = HtsInferenceParamsBuilder::default()
            .generation_type(1)
            .verbose(true)
            .build()
            .unwrap();
        assert_eq!(params.generation_type, 1);
        assert!(params.verbose);
        assert!(!params.input_is_list);
        assert!(params.workdir.ends_with("hts-synth"));
    }

    #[test]
    fn synthesize_requires_a_loaded_model() {
        let mut engine = HtsEngine::new();
        let err = engine
            .synthesize(Path::new("a.lab"), Path::new("out"), None)
            .unwrap_err();
        assert!(err.to_string().contains("Model not loaded"));
    }

    #[test]
    fn load_model_fails_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = HtsEngine::new();
        assert!(engine.load_model(dir.path()).is_err());
        assert!(engine.model().is_none());
    }
}
