//! # hts-synth
//!
//! A Rust library turning full-context label files into speech with a trained
//! HTS voice and the STRAIGHT vocoder.
//!
//! ## Features
//!
//! - **Unseen model composition**: clustered models are specialised to the labels of each run
//! - **Isolated runs**: every run works in its own temporary directory, released on every exit path
//! - **Global variance**: optional GV-constrained parameter generation
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! hts-synth = "2026.2"
//! ```
//!
//! ```ignore
//! use std::path::Path;
//! use hts_synth::{engines::hts::HtsEngine, SynthesisEngine};
//!
//! let mut engine = HtsEngine::new();
//! engine.load_model(Path::new("voices/slt"))?;
//!
//! let report = engine.synthesize(Path::new("labels/a01.lab"), Path::new("wav"), None)?;
//! println!("{:.2}s of audio", report.total_duration_secs()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;

use std::path::{Path, PathBuf};

/// A waveform written by a synthesis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUtterance {
    /// Base name of the input label file
    pub base: String,
    /// Path of the written WAV file
    pub wav_path: PathBuf,
}

/// The result of a synthesis run.
///
/// Lists the rendered utterances in input order.
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    /// Unique id of the run that produced the waveforms
    pub run_id: String,
    pub utterances: Vec<RenderedUtterance>,
    /// Sample rate the vocoder was asked for
    pub sample_rate: u32,
}

impl SynthesisReport {
    /// Duration in seconds of each rendered waveform, read from its header.
    pub fn durations(&self) -> Result<Vec<f64>, hound::Error> {
        self.utterances
            .iter()
            .map(|utt| wav_duration_secs(&utt.wav_path))
            .collect()
    }

    /// Total duration of the rendered audio in seconds.
    pub fn total_duration_secs(&self) -> Result<f64, hound::Error> {
        Ok(self.durations()?.iter().sum())
    }
}

fn wav_duration_secs(path: &Path) -> Result<f64, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    Ok(reader.duration() as f64 / reader.spec().sample_rate as f64)
}

/// Common interface for speech synthesis engines.
///
/// This trait defines the standard operations that all synthesis engines must support.
/// Each engine may have different parameter types for model loading and inference configuration.
pub trait SynthesisEngine {
    /// Parameters for configuring a synthesis run (generation type, verbosity, etc.)
    type SynthesisParams;
    /// Parameters for configuring model loading (model file overrides, etc.)
    type ModelParams: Default;

    /// Load a model from the specified path using default parameters.
    fn load_model(&mut self, model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load a model from the specified path with custom parameters.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    /// Synthesize every utterance of `input` into `output_dir`.
    fn synthesize(
        &mut self,
        input: &Path,
        output_dir: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisReport, Box<dyn std::error::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..samples {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn report_durations_come_from_wav_headers() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, 44100, 44100);
        write_wav(&b, 44100, 22050);

        let report = SynthesisReport {
            run_id: "run".to_string(),
            utterances: vec![
                RenderedUtterance {
                    base: "a".to_string(),
                    wav_path: a,
                },
                RenderedUtterance {
                    base: "b".to_string(),
                    wav_path: b,
                },
            ],
            sample_rate: 44100,
        };
        assert_eq!(report.durations().unwrap(), vec![1.0, 0.5]);
        assert!((report.total_duration_secs().unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn missing_wav_is_an_error() {
        let report = SynthesisReport {
            run_id: "run".to_string(),
            utterances: vec![RenderedUtterance {
                base: "x".to_string(),
                wav_path: PathBuf::from("/nonexistent/x.wav"),
            }],
            sample_rate: 44100,
        };
        assert!(report.durations().is_err());
    }
}
