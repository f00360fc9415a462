use std::path::{Path, PathBuf};

use super::model::HtsError;
use super::tool::{run_checked, ToolCommand, ToolRunner};
use super::voice::{Voice, DURATION_EXT};

/// Value sopr treats as "unvoiced" in log-F0 streams.
const UNVOICED_LF0: &str = "-1.0E+10";

/// mgc2sp output format: 20 log10 |H(z)|.
const MGC2SP_LOG_AMPLITUDE_DB: &str = "0";
/// mgc2sp output format: |H(z)|.
const MGC2SP_AMPLITUDE: &str = "2";

/// STRAIGHT feature files of one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFeatures {
    pub f0: PathBuf,
    pub aperiodicity: PathBuf,
    pub spectrum: PathBuf,
}

impl ConvertedFeatures {
    pub fn for_base(dir: &Path, base: &str) -> Self {
        Self {
            f0: dir.join(format!("{base}.f0")),
            aperiodicity: dir.join(format!("{base}.ap")),
            spectrum: dir.join(format!("{base}.sp")),
        }
    }
}

/// Turns generated HTS parameters into STRAIGHT inputs with SPTK.
pub struct ParameterConverter<'a> {
    voice: &'a Voice,
    runner: &'a dyn ToolRunner,
}

impl<'a> ParameterConverter<'a> {
    pub fn new(voice: &'a Voice, runner: &'a dyn ToolRunner) -> Self {
        Self { voice, runner }
    }

    fn order(&self, stream: &str) -> Result<usize, HtsError> {
        self.voice
            .stream(stream)
            .map(|s| s.order)
            .ok_or_else(|| HtsError::Config(format!("voice has no '{stream}' stream")))
    }

    /// The three SPTK invocations for `base`: lf0→f0, bap→ap, mgc→sp.
    pub fn commands(&self, output_dir: &Path, base: &str) -> Result<[ToolCommand; 3], HtsError> {
        let source = |ext: &str| output_dir.join(format!("{base}.{ext}"));
        let target = ConvertedFeatures::for_base(output_dir, base);
        let signal = self.voice.signal();
        let tools = self.voice.tools();
        let alpha = format!("{:.6}", signal.frequency_warping);
        let fft_length = signal.fft_length.to_string();

        let f0 = ToolCommand::new(&tools.sopr)
            .args(["-magic", UNVOICED_LF0, "-EXP", "-MAGIC", "0.0"])
            .arg(source("lf0"))
            .stdout_file(target.f0);

        let aperiodicity = ToolCommand::new(&tools.mgc2sp)
            .args(["-a", alpha.as_str(), "-g", "0", "-m"])
            .arg((self.order("bap")? - 1).to_string())
            .args(["-l", fft_length.as_str(), "-o", MGC2SP_LOG_AMPLITUDE_DB])
            .arg(source("bap"))
            .stdout_file(target.aperiodicity);

        let spectrum = ToolCommand::new(&tools.mgc2sp)
            .args(["-a", alpha.as_str(), "-g"])
            .arg(format!("{:.6}", signal.gamma))
            .arg("-m")
            .arg((self.order("mgc")? - 1).to_string())
            .args(["-l", fft_length.as_str(), "-o", MGC2SP_AMPLITUDE])
            .arg(source("mgc"))
            .stdout_file(target.spectrum);

        Ok([f0, aperiodicity, spectrum])
    }

    /// Convert one utterance, then delete the consumed `.lf0`, `.mgc`,
    /// `.bap` and `.dur` files.
    ///
    /// Sources are only deleted once all three conversions succeeded.
    pub fn convert(&self, output_dir: &Path, base: &str) -> Result<ConvertedFeatures, HtsError> {
        for command in self.commands(output_dir, base)? {
            run_checked(self.runner, &command)?;
        }

        for ext in ["lf0", "mgc", "bap", DURATION_EXT] {
            let path = output_dir.join(format!("{base}.{ext}"));
            std::fs::remove_file(&path).map_err(|e| HtsError::fs(&path, e))?;
        }
        Ok(ConvertedFeatures::for_base(output_dir, base))
    }
}
