use std::fmt;
use std::path::{Path, PathBuf};

use super::convert::ConvertedFeatures;
use super::model::HtsError;
use super::tool::{run_checked, ToolCommand, ToolRunner};
use super::voice::{SignalConfig, Voice};
use super::workspace::remove_if_exists;

/// Size of one little-endian f32 sample in the feature streams.
pub const BYTES_PER_FLOAT: u64 = 4;

/// Frames in a stream of `bytes` bytes holding one float per frame.
pub fn frames_for_size(bytes: u64) -> Option<u64> {
    (bytes % BYTES_PER_FLOAT == 0).then_some(bytes / BYTES_PER_FLOAT)
}

/// Frame count of an f0 file, derived from its size.
pub fn frame_count(f0: &Path) -> Result<u64, HtsError> {
    let bytes = std::fs::metadata(f0)
        .map_err(|e| HtsError::fs(f0, e))?
        .len();
    frames_for_size(bytes).ok_or_else(|| HtsError::Parse {
        path: f0.to_path_buf(),
        line: 0,
        message: format!("size {bytes} is not a multiple of {BYTES_PER_FLOAT} bytes"),
    })
}

/// Quote a string as a MATLAB character literal.
fn matlab_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn matlab_path(path: &Path) -> String {
    matlab_str(&path.display().to_string())
}

/// One utterance as rendered by the STRAIGHT script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    pub features: ConvertedFeatures,
    pub frames: u64,
    pub wav: PathBuf,
}

/// MATLAB script reading the STRAIGHT features of every utterance and
/// writing one waveform each.
#[derive(Debug, Clone)]
pub struct StraightScript<'a> {
    signal: &'a SignalConfig,
    entries: Vec<ScriptEntry>,
}

impl<'a> StraightScript<'a> {
    pub fn new(signal: &'a SignalConfig) -> Self {
        Self {
            signal,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ScriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }
}

impl fmt::Display for StraightScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signal = self.signal;
        let bins = signal.spectrum_bins();
        let rate = signal.sample_rate;

        writeln!(f, "path(path, {});", matlab_str(&signal.straight_path))?;
        writeln!(
            f,
            "prm.spectralUpdateInterval = {:.6};",
            signal.frame_period_ms()
        )?;
        writeln!(f, "prm.levelNormalizationIndicator = 0;\n")?;

        for entry in &self.entries {
            let features = &entry.features;
            let frames = entry.frames;
            writeln!(
                f,
                "fid_sp = fopen({}, 'r', 'ieee-le');",
                matlab_path(&features.spectrum)
            )?;
            writeln!(
                f,
                "fid_ap = fopen({}, 'r', 'ieee-le');",
                matlab_path(&features.aperiodicity)
            )?;
            writeln!(
                f,
                "fid_f0 = fopen({}, 'r', 'ieee-le');",
                matlab_path(&features.f0)
            )?;
            writeln!(f, "sp = fread(fid_sp, [{bins} {frames}], 'float');")?;
            writeln!(f, "ap = fread(fid_ap, [{bins} {frames}], 'float');")?;
            writeln!(f, "f0 = fread(fid_f0, [1 {frames}], 'float');")?;
            writeln!(f, "fclose(fid_sp);")?;
            writeln!(f, "fclose(fid_ap);")?;
            writeln!(f, "fclose(fid_f0);")?;
            writeln!(f, "[sy] = exstraightsynth(f0, sp, ap, {rate}, prm);")?;
            writeln!(f, "wavwrite(sy, {rate}, {});", matlab_path(&entry.wav))?;
        }

        f.write_str("quit;\n")
    }
}

/// Drives the STRAIGHT vocoder through MATLAB.
pub struct WaveformRenderer<'a> {
    voice: &'a Voice,
    runner: &'a dyn ToolRunner,
}

impl<'a> WaveformRenderer<'a> {
    pub fn new(voice: &'a Voice, runner: &'a dyn ToolRunner) -> Self {
        Self { voice, runner }
    }

    /// Build the script for `bases`, keeping their order.
    pub fn script(&self, output_dir: &Path, bases: &[&str]) -> Result<StraightScript<'a>, HtsError> {
        let mut script = StraightScript::new(self.voice.signal());
        for base in bases {
            let features = ConvertedFeatures::for_base(output_dir, base);
            let frames = frame_count(&features.f0)?;
            script.push(ScriptEntry {
                features,
                frames,
                wav: output_dir.join(format!("{base}.wav")),
            });
        }
        Ok(script)
    }

    pub fn command(&self, script_path: &Path) -> ToolCommand {
        ToolCommand::new(&self.voice.tools().matlab)
            .args(["-nojvm", "-nosplash", "-nodisplay"])
            .stdin_file(script_path)
    }

    /// Render every utterance, returning the waveform paths in input order.
    ///
    /// Afterwards the STRAIGHT features and the script are deleted.
    pub fn render(
        &self,
        output_dir: &Path,
        bases: &[&str],
        script_path: &Path,
    ) -> Result<Vec<PathBuf>, HtsError> {
        let script = self.script(output_dir, bases)?;
        std::fs::write(script_path, script.to_string()).map_err(|e| HtsError::fs(script_path, e))?;

        run_checked(self.runner, &self.command(script_path))?;

        let mut wavs = Vec::with_capacity(bases.len());
        for entry in script.entries() {
            if !entry.wav.is_file() {
                return Err(HtsError::MissingArtifact(entry.wav.clone()));
            }
            wavs.push(entry.wav.clone());
        }

        for entry in script.entries() {
            let features = &entry.features;
            for path in [&features.spectrum, &features.aperiodicity, &features.f0] {
                std::fs::remove_file(path).map_err(|e| HtsError::fs(path, e))?;
            }
        }
        remove_if_exists(script_path)?;
        Ok(wavs)
    }
}
