use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use uuid::Uuid;

use super::compose::ModelComposer;
use super::config::{synthesis_config, training_config, GvArtifacts};
use super::convert::ParameterConverter;
use super::generate::{GenerationJob, GenerationType, ParameterGenerator};
use super::labels::{self, read_utterance_list, Utterance};
use super::render::WaveformRenderer;
use super::tool::ToolRunner;
use super::voice::Voice;
use super::workspace::Workspace;
use crate::{RenderedUtterance, SynthesisReport};

/// Optional voice configuration looked up in the model directory.
pub const VOICE_CONFIG_FILE: &str = "voice.json";

#[derive(thiserror::Error, Debug)]
pub enum HtsError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{tool} exited with code {code:?}: {stderr}")]
    ExternalTool {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("'{0}' not found. Make sure HTS, SPTK and MATLAB are installed and on PATH.")]
    ToolNotFound(String),
    #[error("{}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Expected output {} was not produced", .0.display())]
    MissingArtifact(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid voice.json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
}

impl HtsError {
    /// Attach the offending path to an I/O error.
    pub fn fs(path: impl AsRef<Path>, source: io::Error) -> Self {
        HtsError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Model files of a trained voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFiles {
    pub cmp_model: PathBuf,
    pub dur_model: PathBuf,
    /// Full-context model list the clustered models were trained on.
    pub model_list: PathBuf,
    pub cmp_tree_dir: PathBuf,
    pub dur_tree_dir: PathBuf,
    /// GV model directory; enables global variance when present.
    pub gv_dir: Option<PathBuf>,
}

impl VoiceFiles {
    /// Check that every file and directory exists.
    pub fn validate(&self) -> Result<(), HtsError> {
        let files = [
            ("cmp model", &self.cmp_model),
            ("duration model", &self.dur_model),
            ("model list", &self.model_list),
        ];
        for (what, path) in files {
            if !path.is_file() {
                return Err(HtsError::Config(format!(
                    "{what} not found at {}",
                    path.display()
                )));
            }
        }

        let mut dirs = vec![
            ("cmp tree directory", &self.cmp_tree_dir),
            ("duration tree directory", &self.dur_tree_dir),
        ];
        if let Some(gv) = &self.gv_dir {
            dirs.push(("GV directory", gv));
        }
        for (what, path) in dirs {
            if !path.is_dir() {
                return Err(HtsError::Config(format!(
                    "{what} not found at {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// One synthesis request, resolved and validated by the engine.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub input_is_list: bool,
    pub output_dir: PathBuf,
    pub generation_type: GenerationType,
    pub workdir: PathBuf,
    pub keep_workspace: bool,
}

/// A loaded HTS voice: validated configuration plus model files.
#[derive(Debug, Clone)]
pub struct HtsModel {
    voice: Voice,
    files: VoiceFiles,
}

impl HtsModel {
    pub fn new(voice: Voice, files: VoiceFiles) -> Result<Self, HtsError> {
        files.validate()?;
        Ok(Self { voice, files })
    }

    /// Load `voice.json` from `model_dir` when present, otherwise use the
    /// reference voice layout.
    pub fn load(model_dir: &Path, files: VoiceFiles) -> Result<Self, HtsError> {
        let config_path = model_dir.join(VOICE_CONFIG_FILE);
        let voice = if config_path.is_file() {
            log::info!("Loading voice configuration from {}", config_path.display());
            Voice::load(&config_path)?
        } else {
            log::warn!("{VOICE_CONFIG_FILE} not found, using the reference voice layout");
            Voice::default()
        };
        Self::new(voice, files)
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn files(&self) -> &VoiceFiles {
        &self.files
    }

    /// Run the whole pipeline for one request.
    ///
    /// Stages run strictly in order and the first failure aborts the run.
    /// The workspace is released on every exit path; outputs already written
    /// to `output_dir` are left in place.
    pub fn synthesize_labels(
        &self,
        request: &RunRequest,
        runner: &dyn ToolRunner,
    ) -> Result<SynthesisReport, HtsError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let mut workspace = Workspace::allocate(&request.workdir, run_id)?;
        workspace.set_keep(request.keep_workspace);
        let ws = workspace.paths();
        log::info!("Starting run {run_id}");

        std::fs::create_dir_all(&request.output_dir)
            .map_err(|e| HtsError::fs(&request.output_dir, e))?;
        let output_dir = request
            .output_dir
            .canonicalize()
            .map_err(|e| HtsError::fs(&request.output_dir, e))?;

        let utterance_list = if request.input_is_list {
            request.input.clone()
        } else {
            std::fs::write(&ws.input_list, format!("{}\n", request.input.display()))
                .map_err(|e| HtsError::fs(&ws.input_list, e))?;
            ws.input_list.clone()
        };
        let utterances = read_utterance_list(&utterance_list)?;
        if utterances.is_empty() {
            return Err(HtsError::Config(format!(
                "utterance list {} is empty",
                utterance_list.display()
            )));
        }

        let label_paths: Vec<&Path> = utterances.iter().map(|u| u.label.as_path()).collect();
        let vocabulary = labels::extract(&label_paths)?;
        vocabulary.write(&ws.label_list)?;

        let gv = self.files.gv_dir.as_ref().map(|_| GvArtifacts {
            model: &ws.gv_model,
            tied_list: &ws.gv_tied_list,
        });
        training_config(&self.voice).write(&ws.train_config)?;
        synthesis_config(&self.voice, gv).write(&ws.synth_config)?;

        let models = ModelComposer::new(&self.voice, &ws.train_config, &ws.label_list, runner)
            .compose_all(&self.files, ws)?;

        log::info!("Parameter generation");
        let job = GenerationJob {
            synth_config: &ws.synth_config,
            utterance_list: &utterance_list,
            models: &models,
            output_dir: &output_dir,
            generation_type: request.generation_type,
        };
        ParameterGenerator::new(&self.voice, runner).generate(&job, &utterances)?;

        log::info!("Parameter conversion (could be quite long)");
        let converter = ParameterConverter::new(&self.voice, runner);
        for utt in &utterances {
            converter.convert(&output_dir, &utt.base)?;
        }

        log::info!("Audio rendering (could be quite long)");
        let bases: Vec<&str> = utterances.iter().map(|u| u.base.as_str()).collect();
        let wavs = WaveformRenderer::new(&self.voice, runner).render(
            &output_dir,
            &bases,
            &ws.straight_script,
        )?;

        log::debug!(
            "Run {run_id} finished in {:.2} minutes",
            start.elapsed().as_secs_f64() / 60.0
        );

        Ok(SynthesisReport {
            run_id: run_id.to_string(),
            utterances: utterances
                .into_iter()
                .zip(wavs)
                .map(|(Utterance { base, .. }, wav_path)| RenderedUtterance { base, wav_path })
                .collect(),
            sample_rate: self.voice.signal().sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_dir(root: &Path, gv: bool) -> VoiceFiles {
        let dir = root.join("voice");
        for sub in ["trees/cmp", "trees/dur", "gv"] {
            std::fs::create_dir_all(dir.join(sub)).unwrap();
        }
        for file in ["cmp.mmf", "dur.mmf", "full.list"] {
            std::fs::write(dir.join(file), "").unwrap();
        }
        VoiceFiles {
            cmp_model: dir.join("cmp.mmf"),
            dur_model: dir.join("dur.mmf"),
            model_list: dir.join("full.list"),
            cmp_tree_dir: dir.join("trees/cmp"),
            dur_tree_dir: dir.join("trees/dur"),
            gv_dir: gv.then(|| dir.join("gv")),
        }
    }

    #[test]
    fn missing_model_file_is_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        let mut files = voice_dir(root.path(), false);
        files.dur_model = root.path().join("nope.mmf");
        let err = HtsModel::new(Voice::default(), files).unwrap_err();
        assert!(matches!(err, HtsError::Config(msg) if msg.contains("duration model")));
    }

    #[test]
    fn missing_gv_directory_is_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        let mut files = voice_dir(root.path(), true);
        files.gv_dir = Some(root.path().join("no-gv"));
        assert!(HtsModel::new(Voice::default(), files).is_err());
    }

    #[test]
    fn load_reads_voice_json_when_present() {
        let root = tempfile::tempdir().unwrap();
        let files = voice_dir(root.path(), false);
        let model_dir = root.path().join("voice");
        std::fs::write(
            model_dir.join(VOICE_CONFIG_FILE),
            r#"{ "signal": { "sample_rate": 48000 } }"#,
        )
        .unwrap();

        let model = HtsModel::load(&model_dir, files).unwrap();
        assert_eq!(model.voice().signal().sample_rate, 48000);
    }

    #[test]
    fn invalid_voice_json_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let files = voice_dir(root.path(), false);
        let model_dir = root.path().join("voice");
        std::fs::write(model_dir.join(VOICE_CONFIG_FILE), "{ not json").unwrap();

        let err = HtsModel::load(&model_dir, files).unwrap_err();
        assert!(matches!(err, HtsError::Json(_)));
    }

    #[test]
    fn error_messages_name_the_path() {
        let err = HtsError::fs(
            "/tmp/x/train.cfg",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "/tmp/x/train.cfg: denied");

        let err = HtsError::Parse {
            path: "a.lab".into(),
            line: 4,
            message: "expected at least 3 fields".into(),
        };
        assert_eq!(err.to_string(), "a.lab:4: expected at least 3 fields");
    }
}
