use std::path::{Path, PathBuf};

use super::compose::ComposedModels;
use super::labels::Utterance;
use super::model::HtsError;
use super::tool::{run_checked, ToolCommand, ToolRunner};
use super::voice::Voice;

/// HMGenS parameter generation type (`-c`).
///
/// 0 uses both state and mixture sequences from the best path, 1 integrates
/// over mixtures, 2 integrates over both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationType(u8);

impl GenerationType {
    pub const MAX: u8 = 2;

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for GenerationType {
    type Error = HtsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(HtsError::Config(format!(
                "parameter generation type must be between 0 and {}, got {value}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }
}

/// Inputs of one HMGenS batch.
pub struct GenerationJob<'a> {
    pub synth_config: &'a Path,
    pub utterance_list: &'a Path,
    pub models: &'a ComposedModels,
    pub output_dir: &'a Path,
    pub generation_type: GenerationType,
}

/// Parameter files HMGenS produced, grouped per utterance in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterFiles {
    pub per_utterance: Vec<(String, Vec<PathBuf>)>,
}

impl ParameterFiles {
    /// Total number of files.
    pub fn len(&self) -> usize {
        self.per_utterance.iter().map(|(_, files)| files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ParameterGenerator<'a> {
    voice: &'a Voice,
    runner: &'a dyn ToolRunner,
}

impl<'a> ParameterGenerator<'a> {
    pub fn new(voice: &'a Voice, runner: &'a dyn ToolRunner) -> Self {
        Self { voice, runner }
    }

    pub fn command(&self, job: &GenerationJob<'_>) -> ToolCommand {
        let beam = self.voice.generation().beam;
        ToolCommand::new(&self.voice.tools().hmgens)
            .args(["-A", "-B", "-C"])
            .arg(job.synth_config)
            .args(["-D", "-T", "1", "-S"])
            .arg(job.utterance_list)
            .arg("-t")
            .args([
                beam.initial.to_string(),
                beam.increment.to_string(),
                beam.limit.to_string(),
            ])
            .arg("-c")
            .arg(job.generation_type.value().to_string())
            .arg("-H")
            .arg(&job.models.cmp.model)
            .arg("-N")
            .arg(&job.models.dur.model)
            .arg("-M")
            .arg(job.output_dir)
            .arg(&job.models.cmp.tied_list)
            .arg(&job.models.dur.tied_list)
    }

    /// Run HMGenS over the whole batch and check that every utterance got
    /// one file per generated stream.
    pub fn generate(
        &self,
        job: &GenerationJob<'_>,
        utterances: &[Utterance],
    ) -> Result<ParameterFiles, HtsError> {
        run_checked(self.runner, &self.command(job))?;

        let extensions = self.voice.generated_extensions();
        let mut files = ParameterFiles::default();
        for utt in utterances {
            let paths: Vec<PathBuf> = extensions
                .iter()
                .map(|ext| utt.artifact(job.output_dir, ext))
                .collect();
            if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
                return Err(HtsError::MissingArtifact(missing.clone()));
            }
            files.per_utterance.push((utt.base.clone(), paths));
        }
        log::debug!(
            "Generated {} parameter files for {} utterances",
            files.len(),
            utterances.len()
        );
        Ok(files)
    }
}
