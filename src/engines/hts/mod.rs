//! HTS unseen-model synthesis engine.
//!
//! This module drives a trained HTS voice (HMM/HSMM models clustered with
//! decision trees) through HTK/HTS, SPTK and the STRAIGHT vocoder. Nothing is
//! computed in-process: every stage writes the files the next tool expects and
//! invokes it, failing the whole run on the first nonzero exit.
//!
//! # System Requirements
//!
//! These programs must be on PATH (names can be changed in `voice.json`):
//! - **HTS-patched HTK**: `HHEd`, `HMGenS`
//! - **SPTK**: `sopr`, `mgc2sp`
//! - **MATLAB** with the STRAIGHT p-code on its path
//!
//! # Model Directory Layout
//!
//! ```text
//! voices/slt/
//! ├── cmp.mmf          # clustered coefficient models
//! ├── dur.mmf          # clustered duration models
//! ├── full.list        # full-context model list used for training
//! ├── trees/
//! │   ├── cmp/         # mgc.inf, lf0.inf, bap.inf
//! │   └── dur/         # dur.inf
//! ├── gv/              # optional: clustered.mmf, gv.list, mgc.inf, lf0.inf, bap.inf
//! └── voice.json       # optional: stream table and tool settings
//! ```
//!
//! # Pipeline
//!
//! | Stage | Module | Tool |
//! |---|---|---|
//! | run workspace | [`workspace`] | |
//! | label vocabulary | [`labels`] | |
//! | configuration files | [`config`] | |
//! | unseen models (cmp, dur, gv) | [`compose`] | `HHEd` |
//! | parameter generation | [`generate`] | `HMGenS` |
//! | STRAIGHT features | [`convert`] | `sopr`, `mgc2sp` |
//! | waveforms | [`render`] | `matlab` |
//!
//! Per-utterance files live in the output directory and are consumed by the
//! next stage: `.mgc .lf0 .bap .dur` → `.sp .ap .f0` → `.wav`.
//!
//! # Examples
//!
//! ## Single label file
//!
//! ```rust,no_run
//! use hts_synth::{SynthesisEngine, engines::hts::HtsEngine};
//! use std::path::Path;
//!
//! let mut engine = HtsEngine::new();
//! engine.load_model(Path::new("voices/slt"))?;
//!
//! let report = engine.synthesize(Path::new("labels/a01.lab"), Path::new("wav"), None)?;
//! for utt in &report.utterances {
//!     println!("{} -> {}", utt.base, utt.wav_path.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Utterance list with global variance
//!
//! ```rust,no_run
//! use hts_synth::{SynthesisEngine, engines::hts::{HtsEngine, HtsInferenceParamsBuilder, HtsModelParams}};
//! use std::path::{Path, PathBuf};
//!
//! let mut engine = HtsEngine::new();
//! engine.load_model_with_params(
//!     Path::new("voices/slt"),
//!     HtsModelParams {
//!         gv_dir: Some(PathBuf::from("voices/slt/gv")),
//!         ..Default::default()
//!     },
//! )?;
//!
//! let params = HtsInferenceParamsBuilder::default()
//!     .input_is_list(true)
//!     .generation_type(1)
//!     .build()?;
//! engine.synthesize(Path::new("test.scp"), Path::new("wav"), Some(params))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compose;
pub mod config;
pub mod convert;
pub mod engine;
pub mod generate;
pub mod labels;
pub mod model;
pub mod render;
pub mod tool;
pub mod voice;
pub mod workspace;

pub use engine::{HtsEngine, HtsInferenceParams, HtsInferenceParamsBuilder, HtsModelParams};
pub use model::HtsError;
pub use tool::{ProcessRunner, ToolCommand, ToolOutput, ToolRunner};
pub use voice::{Voice, VoiceConfig};
