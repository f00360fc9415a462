use std::fmt;
use std::path::Path;

use super::model::HtsError;
use super::voice::Voice;

/// Keys emitted only when global variance is enabled, besides `USEGV` and
/// the two GV model paths.
pub const GV_PARAMETER_KEYS: [&str; 12] = [
    "EMEPSILON",
    "MAXGVITER",
    "GVEPSILON",
    "MINEUCNORM",
    "STEPINIT",
    "STEPINC",
    "STEPDEC",
    "HMMWEIGHT",
    "GVWEIGHT",
    "OPTKIND",
    "GVOFFMODEL",
    "CDGV",
];

/// A typed HTK configuration value.
///
/// Vector values render as the quoted literals HTK parses (`"Vector N ..."`,
/// `"IntVec N ..."`, `"StrVec N ..."`); floats render with six decimals.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vec<f64>),
    IntVec(Vec<i64>),
    StrVec(Vec<String>),
    /// Several `StrVec` literals inside one quoted value (`WINFN`).
    StrVecGroups(Vec<Vec<String>>),
}

impl ConfigValue {
    /// Number of elements of a vector value.
    pub fn len(&self) -> Option<usize> {
        match self {
            ConfigValue::Vector(v) => Some(v.len()),
            ConfigValue::IntVec(v) => Some(v.len()),
            ConfigValue::StrVec(v) => Some(v.len()),
            ConfigValue::StrVecGroups(v) => Some(v.len()),
            _ => None,
        }
    }
}

fn write_str_vec(f: &mut fmt::Formatter<'_>, items: &[String]) -> fmt::Result {
    write!(f, "StrVec {}", items.len())?;
    for item in items {
        write!(f, " {item}")?;
    }
    Ok(())
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(true) => f.write_str("T"),
            ConfigValue::Bool(false) => f.write_str("F"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::Float(x) => write!(f, "{x:.6}"),
            ConfigValue::Text(s) => f.write_str(s),
            ConfigValue::Vector(v) => {
                write!(f, "\"Vector {}", v.len())?;
                for x in v {
                    write!(f, " {x:.6}")?;
                }
                f.write_str("\"")
            }
            ConfigValue::IntVec(v) => {
                write!(f, "\"IntVec {}", v.len())?;
                for i in v {
                    write!(f, " {i}")?;
                }
                f.write_str("\"")
            }
            ConfigValue::StrVec(v) => {
                f.write_str("\"")?;
                write_str_vec(f, v)?;
                f.write_str("\"")
            }
            ConfigValue::StrVecGroups(groups) => {
                f.write_str("\"")?;
                for (i, group) in groups.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write_str_vec(f, group)?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// Ordered `KEY = value` configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) -> &mut Self {
        self.entries.push((key.to_string(), value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn write(&self, path: &Path) -> Result<(), HtsError> {
        std::fs::write(path, self.to_string()).map_err(|e| HtsError::fs(path, e))
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

/// Composed GV model referenced by the synthesis configuration.
#[derive(Debug, Clone, Copy)]
pub struct GvArtifacts<'a> {
    pub model: &'a Path,
    pub tied_list: &'a Path,
}

/// Path as a config string, double-quoted when it would otherwise split
/// into several tokens.
fn path_value(path: &Path) -> ConfigValue {
    let text = path.display().to_string();
    if text.chars().any(|c| c.is_whitespace() || c == '"') {
        let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
        ConfigValue::Text(format!("\"{escaped}\""))
    } else {
        ConfigValue::Text(text)
    }
}

/// Configuration used by HHEd while expanding the trees: variance floors
/// and duration bounds.
pub fn training_config(voice: &Voice) -> ConfigDocument {
    let floors: Vec<f64> = voice
        .streams()
        .iter()
        .flat_map(|s| std::iter::repeat(s.floor).take(s.width()))
        .collect();
    let generation = voice.generation();

    let mut doc = ConfigDocument::new();
    doc.set("NATURALREADORDER", ConfigValue::Bool(true))
        .set("NATURALWRITEORDER", ConfigValue::Bool(true))
        .set("APPLYVFLOOR", ConfigValue::Bool(true))
        .set("VFLOORSCALESTR", ConfigValue::Vector(floors))
        .set("APPLYDURVARFLOOR", ConfigValue::Bool(true))
        .set(
            "DURVARFLOORPERCENTILE",
            ConfigValue::Float(100.0 * voice.duration_floor()),
        )
        .set(
            "MAXSTDDEVCOEF",
            ConfigValue::Int(generation.max_stddev_coef.into()),
        )
        .set("MINDUR", ConfigValue::Int(generation.min_duration.into()));
    doc
}

/// Configuration used by HMGenS: stream structure, windows and, when `gv`
/// is given, the global variance block.
pub fn synthesis_config(voice: &Voice, gv: Option<GvArtifacts<'_>>) -> ConfigDocument {
    let streams = voice.streams();
    let generation = voice.generation();

    let mut doc = ConfigDocument::new();
    doc.set("NATURALREADORDER", ConfigValue::Bool(true))
        .set("NATURALWRITEORDER", ConfigValue::Bool(true))
        .set("USEALIGN", ConfigValue::Bool(true))
        .set(
            "MAXEMITER",
            ConfigValue::Int(generation.max_em_iterations.into()),
        )
        .set(
            "PDFSTRSIZE",
            ConfigValue::IntVec(streams.iter().map(|s| s.width() as i64).collect()),
        )
        .set(
            "PDFSTRORDER",
            ConfigValue::IntVec(streams.iter().map(|s| s.order as i64).collect()),
        )
        .set(
            "PDFSTREXT",
            ConfigValue::StrVec(streams.iter().map(|s| s.name.clone()).collect()),
        )
        .set(
            "WINFN",
            ConfigValue::StrVecGroups(streams.iter().map(|s| s.window_files()).collect()),
        )
        .set("WINDIR", ConfigValue::Text(generation.window_dir.clone()));

    match gv {
        Some(artifacts) => {
            let params = voice.gv();
            doc.set("EMEPSILON", ConfigValue::Float(params.em_epsilon))
                .set("USEGV", ConfigValue::Bool(true))
                .set("GVMODELMMF", path_value(artifacts.model))
                .set("GVHMMLIST", path_value(artifacts.tied_list))
                .set("MAXGVITER", ConfigValue::Int(params.max_iterations.into()))
                .set("GVEPSILON", ConfigValue::Float(params.epsilon))
                .set("MINEUCNORM", ConfigValue::Float(params.min_euclid_norm))
                .set("STEPINIT", ConfigValue::Float(params.step_init))
                .set("STEPINC", ConfigValue::Float(params.step_increase))
                .set("STEPDEC", ConfigValue::Float(params.step_decrease))
                .set("HMMWEIGHT", ConfigValue::Float(params.hmm_weight))
                .set("GVWEIGHT", ConfigValue::Float(params.gv_weight))
                .set(
                    "OPTKIND",
                    ConfigValue::Text(params.optimization.as_str().to_string()),
                )
                .set("GVOFFMODEL", ConfigValue::StrVec(params.off_models.clone()))
                .set("CDGV", ConfigValue::Bool(params.context_dependent));
        }
        None => {
            doc.set("USEGV", ConfigValue::Bool(false));
        }
    }
    doc
}
