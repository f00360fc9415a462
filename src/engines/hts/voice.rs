use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::HtsError;

/// Extension of the generated duration parameter file.
pub const DURATION_EXT: &str = "dur";

/// One acoustic feature stream of the coefficient (cmp) model.
///
/// `name` doubles as the parameter file extension, the tree file stem and
/// the window file prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub name: String,
    /// First band of the stream in the observation vector (1-based).
    pub band_begin: usize,
    /// Last band of the stream, inclusive.
    pub band_end: usize,
    /// Static coefficient count.
    pub order: usize,
    /// Number of delta windows.
    pub windows: usize,
    /// Variance floor applied to every band of the stream.
    pub floor: f64,
}

impl StreamSpec {
    pub fn new(
        name: &str,
        band_begin: usize,
        band_end: usize,
        order: usize,
        windows: usize,
        floor: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            band_begin,
            band_end,
            order,
            windows,
            floor,
        }
    }

    /// Number of bands (PdfStreams) covered by this stream.
    pub fn width(&self) -> usize {
        self.band_end + 1 - self.band_begin
    }

    /// `<name>.win1` .. `<name>.win<windows>`.
    pub fn window_files(&self) -> Vec<String> {
        (1..=self.windows)
            .map(|k| format!("{}.win{k}", self.name))
            .collect()
    }
}

/// Beam pruning control handed to HMGenS as `-t initial increment limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamWidth {
    pub initial: f64,
    pub increment: f64,
    pub limit: f64,
}

impl Default for BeamWidth {
    fn default() -> Self {
        Self {
            initial: 1500.0,
            increment: 100.0,
            limit: 5000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_em_iterations: u32,
    pub max_stddev_coef: u32,
    pub min_duration: u32,
    pub beam: BeamWidth,
    /// Directory of the delta window files, as seen by HMGenS.
    pub window_dir: String,
    /// Threshold of the `TR` directive heading every decision script.
    pub trace_level: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_em_iterations: 20,
            max_stddev_coef: 10,
            min_duration: 5,
            beam: BeamWidth::default(),
            window_dir: "win".to_string(),
            trace_level: 2,
        }
    }
}

/// Optimisation method used for GV parameter generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizationKind {
    Steepest,
    Newton,
    Lbfgs,
}

impl OptimizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationKind::Steepest => "STEEPEST",
            OptimizationKind::Newton => "NEWTON",
            OptimizationKind::Lbfgs => "LBFGS",
        }
    }
}

/// Global variance generation parameters.
///
/// Only used when a GV model directory is supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GvParams {
    pub em_epsilon: f64,
    pub max_iterations: u32,
    pub epsilon: f64,
    pub min_euclid_norm: f64,
    pub step_init: f64,
    pub step_increase: f64,
    pub step_decrease: f64,
    pub hmm_weight: f64,
    pub gv_weight: f64,
    pub optimization: OptimizationKind,
    /// Models excluded from GV (silences, pauses, breaths).
    pub off_models: Vec<String>,
    pub context_dependent: bool,
}

impl Default for GvParams {
    fn default() -> Self {
        Self {
            em_epsilon: 0.0001,
            max_iterations: 50,
            epsilon: 0.0001,
            min_euclid_norm: 0.01,
            step_init: 1.0,
            step_increase: 1.2,
            step_decrease: 0.5,
            hmm_weight: 1.0,
            gv_weight: 1.0,
            optimization: OptimizationKind::Newton,
            off_models: ["pau", "h#", "brth", "start", "end", "spause", "insp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            context_dependent: true,
        }
    }
}

/// Signal analysis settings shared by the SPTK conversion and STRAIGHT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub sample_rate: u32,
    /// Frame shift in samples.
    pub frame_shift: f64,
    pub frequency_warping: f64,
    pub gamma: f64,
    pub fft_length: usize,
    /// MATLAB path holding the STRAIGHT p-code.
    pub straight_path: String,
}

impl SignalConfig {
    /// Floats per frame of the spectrum and aperiodicity streams.
    pub fn spectrum_bins(&self) -> usize {
        self.fft_length / 2 + 1
    }

    /// Frame shift in milliseconds.
    pub fn frame_period_ms(&self) -> f64 {
        1000.0 * self.frame_shift / self.sample_rate as f64
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_shift: 220.5,
            frequency_warping: 0.53,
            gamma: 0.0,
            fft_length: 2048,
            straight_path: "STRAIGHTV40pcode".to_string(),
        }
    }
}

/// Program names of the external tools, resolved through `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolNames {
    pub hhed: String,
    pub hmgens: String,
    pub sopr: String,
    pub mgc2sp: String,
    pub matlab: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            hhed: "HHEd".to_string(),
            hmgens: "HMGenS".to_string(),
            sopr: "sopr".to_string(),
            mgc2sp: "mgc2sp".to_string(),
            matlab: "matlab".to_string(),
        }
    }
}

/// Raw, unvalidated voice description as read from `voice.json`.
///
/// Every field is optional in the JSON document and falls back to the
/// reference 44.1 kHz STRAIGHT voice layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub streams: Vec<StreamSpec>,
    pub duration_floor: f64,
    pub generation: GenerationConfig,
    pub gv: GvParams,
    pub signal: SignalConfig,
    pub tools: ToolNames,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            streams: vec![
                StreamSpec::new("mgc", 1, 1, 50, 3, 0.01),
                StreamSpec::new("lf0", 2, 4, 1, 3, 0.01),
                StreamSpec::new("bap", 5, 5, 25, 3, 0.01),
            ],
            duration_floor: 0.01,
            generation: GenerationConfig::default(),
            gv: GvParams::default(),
            signal: SignalConfig::default(),
            tools: ToolNames::default(),
        }
    }
}

impl VoiceConfig {
    /// Load a voice configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, HtsError> {
        let content = std::fs::read_to_string(path).map_err(|e| HtsError::fs(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Streams the parameter converter needs by name.
const CONVERTED_STREAMS: [&str; 3] = ["mgc", "lf0", "bap"];

/// Validated, immutable voice configuration.
///
/// Built once per loaded model and passed by reference to every stage, so
/// stream counts, orders and window lists can never disagree between the
/// generated documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Voice {
    config: VoiceConfig,
}

impl Voice {
    pub fn from_config(config: VoiceConfig) -> Result<Self, HtsError> {
        validate(&config)?;
        Ok(Self { config })
    }

    /// Load and validate `voice.json`.
    pub fn load(path: &Path) -> Result<Self, HtsError> {
        Self::from_config(VoiceConfig::load(path)?)
    }

    /// Coefficient streams in canonical order.
    pub fn streams(&self) -> &[StreamSpec] {
        &self.config.streams
    }

    pub fn stream(&self, name: &str) -> Option<&StreamSpec> {
        self.config.streams.iter().find(|s| s.name == name)
    }

    /// Total number of bands over all coefficient streams.
    pub fn vector_size(&self) -> usize {
        self.config.streams.iter().map(StreamSpec::width).sum()
    }

    /// Extensions of every file HMGenS writes per utterance.
    pub fn generated_extensions(&self) -> Vec<&str> {
        self.config
            .streams
            .iter()
            .map(|s| s.name.as_str())
            .chain(std::iter::once(DURATION_EXT))
            .collect()
    }

    pub fn duration_floor(&self) -> f64 {
        self.config.duration_floor
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.config.generation
    }

    pub fn gv(&self) -> &GvParams {
        &self.config.gv
    }

    pub fn signal(&self) -> &SignalConfig {
        &self.config.signal
    }

    pub fn tools(&self) -> &ToolNames {
        &self.config.tools
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }
}

fn invalid(message: impl Into<String>) -> HtsError {
    HtsError::Config(message.into())
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

fn validate(config: &VoiceConfig) -> Result<(), HtsError> {
    if config.streams.is_empty() {
        return Err(invalid("voice declares no streams"));
    }

    let mut seen = HashSet::new();
    let mut next_band = 1;
    for stream in &config.streams {
        if !is_token(&stream.name) {
            return Err(invalid(format!("invalid stream name {:?}", stream.name)));
        }
        if stream.name == DURATION_EXT {
            return Err(invalid("stream name 'dur' is reserved for the duration model"));
        }
        if !seen.insert(stream.name.as_str()) {
            return Err(invalid(format!("duplicate stream '{}'", stream.name)));
        }
        if stream.band_begin != next_band || stream.band_end < stream.band_begin {
            return Err(invalid(format!(
                "stream '{}' covers bands {}..={}, expected to start at band {next_band}",
                stream.name, stream.band_begin, stream.band_end
            )));
        }
        next_band = stream.band_end + 1;
        if stream.order == 0 {
            return Err(invalid(format!("stream '{}' has order 0", stream.name)));
        }
        if stream.windows == 0 {
            return Err(invalid(format!("stream '{}' has no windows", stream.name)));
        }
        if !(stream.floor.is_finite() && stream.floor > 0.0) {
            return Err(invalid(format!(
                "stream '{}' has invalid variance floor {}",
                stream.name, stream.floor
            )));
        }
    }

    for name in CONVERTED_STREAMS {
        if !seen.contains(name) {
            return Err(invalid(format!("voice is missing the '{name}' stream")));
        }
    }

    if !(config.duration_floor.is_finite() && config.duration_floor > 0.0) {
        return Err(invalid(format!(
            "invalid duration variance floor {}",
            config.duration_floor
        )));
    }

    let beam = &config.generation.beam;
    if !(beam.initial > 0.0 && beam.increment >= 0.0 && beam.limit >= beam.initial) {
        return Err(invalid(format!(
            "invalid beam {} {} {}",
            beam.initial, beam.increment, beam.limit
        )));
    }
    if !is_token(&config.generation.window_dir) {
        return Err(invalid("window directory must be a non-empty path without spaces"));
    }

    if config.gv.off_models.is_empty() {
        return Err(invalid("GV off model list is empty"));
    }
    if let Some(bad) = config.gv.off_models.iter().find(|m| !is_token(m)) {
        return Err(invalid(format!("invalid GV off model {bad:?}")));
    }

    let signal = &config.signal;
    if signal.sample_rate == 0 || !(signal.frame_shift.is_finite() && signal.frame_shift > 0.0) {
        return Err(invalid("sample rate and frame shift must be positive"));
    }
    if signal.fft_length < 2 || signal.fft_length % 2 != 0 {
        return Err(invalid(format!("invalid FFT length {}", signal.fft_length)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_voice_is_valid() {
        let voice = Voice::from_config(VoiceConfig::default()).unwrap();
        assert_eq!(voice, Voice::default());
        assert_eq!(voice.vector_size(), 5);
        assert_eq!(voice.generated_extensions(), vec!["mgc", "lf0", "bap", "dur"]);
        assert_eq!(voice.signal().spectrum_bins(), 1025);
        assert!((voice.signal().frame_period_ms() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn window_files_follow_stream_name() {
        let lf0 = StreamSpec::new("lf0", 2, 4, 1, 3, 0.01);
        assert_eq!(lf0.width(), 3);
        assert_eq!(lf0.window_files(), vec!["lf0.win1", "lf0.win2", "lf0.win3"]);
    }

    #[test]
    fn rejects_gaps_between_bands() {
        let mut config = VoiceConfig::default();
        config.streams[1].band_begin = 3;
        let err = Voice::from_config(config).unwrap_err();
        assert!(matches!(err, HtsError::Config(msg) if msg.contains("lf0")));
    }

    #[test]
    fn rejects_duplicate_and_reserved_names() {
        let mut config = VoiceConfig::default();
        config.streams[2].name = "mgc".to_string();
        assert!(Voice::from_config(config).is_err());

        let mut config = VoiceConfig::default();
        config.streams.push(StreamSpec::new("dur", 6, 6, 1, 1, 0.01));
        assert!(Voice::from_config(config).is_err());
    }

    #[test]
    fn rejects_missing_converted_stream() {
        let mut config = VoiceConfig::default();
        config.streams.truncate(2);
        let err = Voice::from_config(config).unwrap_err();
        assert!(matches!(err, HtsError::Config(msg) if msg.contains("bap")));
    }

    #[test]
    fn rejects_non_positive_floor() {
        let mut config = VoiceConfig::default();
        config.streams[0].floor = 0.0;
        assert!(Voice::from_config(config).is_err());

        let mut config = VoiceConfig::default();
        config.duration_floor = f64::NAN;
        assert!(Voice::from_config(config).is_err());
    }

    #[test]
    fn rejects_unusable_frame_shift() {
        for shift in [0.0, -220.5, f64::NAN, f64::INFINITY] {
            let mut config = VoiceConfig::default();
            config.signal.frame_shift = shift;
            assert!(Voice::from_config(config).is_err(), "frame shift {shift}");
        }
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "signal": { "sample_rate": 48000 }, "gv": { "optimization": "LBFGS" } }"#;
        let config: VoiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.signal.sample_rate, 48000);
        assert_eq!(config.signal.fft_length, 2048);
        assert_eq!(config.gv.optimization, OptimizationKind::Lbfgs);
        assert_eq!(config.streams.len(), 3);
        assert!(Voice::from_config(config).is_ok());
    }
}
