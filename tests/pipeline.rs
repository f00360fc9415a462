use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hts_synth::engines::hts::{
    HtsEngine, HtsError, HtsInferenceParamsBuilder, HtsModelParams, ToolCommand, ToolOutput,
    ToolRunner,
};
use hts_synth::SynthesisEngine;

const STREAMS: [&str; 4] = ["mgc", "lf0", "bap", "dur"];

/// Stands in for HHEd, HMGenS, sopr, mgc2sp and matlab by creating the
/// files each of them would write.
#[derive(Default)]
struct FakeTools {
    calls: Mutex<Vec<ToolCommand>>,
    /// Parameter files present right after HMGenS ran.
    generated: Mutex<Vec<PathBuf>>,
    fail: Option<&'static str>,
}

impl FakeTools {
    fn failing(program: &'static str) -> Self {
        Self {
            fail: Some(program),
            ..Default::default()
        }
    }

    fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }

    fn hmgens(&self, command: &ToolCommand) {
        let list = command.flag_value("-S").unwrap();
        let out = PathBuf::from(command.flag_value("-M").unwrap());
        for line in fs::read_to_string(list).unwrap().lines() {
            let base = Path::new(line.trim()).file_stem().unwrap().to_str().unwrap();
            for ext in STREAMS {
                let path = out.join(format!("{base}.{ext}"));
                fs::write(&path, [0u8; 8]).unwrap();
            }
        }
        let mut generated: Vec<PathBuf> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| STREAMS.contains(&e))
            })
            .collect();
        generated.sort();
        *self.generated.lock().unwrap() = generated;
    }

    fn matlab(&self, command: &ToolCommand) {
        let script = fs::read_to_string(command.stdin().unwrap()).unwrap();
        for line in script.lines().filter(|l| l.starts_with("wavwrite(")) {
            let path = line.split('\'').nth(1).unwrap();
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 44100,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(path, spec).unwrap();
            for _ in 0..4410 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
    }
}

impl ToolRunner for FakeTools {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput, HtsError> {
        self.calls.lock().unwrap().push(command.clone());
        if self.fail == Some(command.program()) {
            return Ok(ToolOutput::failed(1, format!("{} failed", command.program())));
        }
        match command.program() {
            "HHEd" => {
                fs::write(command.flag_value("-w").unwrap(), "~o").unwrap();
            }
            "HMGenS" => self.hmgens(command),
            "sopr" | "mgc2sp" => {
                if let hts_synth::engines::hts::tool::OutputTarget::File(path) = command.stdout() {
                    // 100 frames of f0, or a short spectrum stream
                    fs::write(path, vec![0u8; 400]).unwrap();
                }
            }
            "matlab" => self.matlab(command),
            other => panic!("unexpected tool {other}"),
        }
        Ok(ToolOutput::ok())
    }
}

struct Fixture {
    root: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let voice = root.path().join("voice");
        for sub in ["trees/cmp", "trees/dur", "gv", "labels", "work"] {
            fs::create_dir_all(voice.join(sub)).unwrap();
        }
        for file in ["cmp.mmf", "dur.mmf", "full.list"] {
            fs::write(voice.join(file), "").unwrap();
        }
        Self { root }
    }

    fn voice(&self) -> PathBuf {
        self.root.path().join("voice")
    }

    fn workdir(&self) -> PathBuf {
        self.voice().join("work")
    }

    fn output(&self) -> PathBuf {
        self.root.path().join("wav")
    }

    fn label(&self, base: &str) -> PathBuf {
        let path = self.voice().join("labels").join(format!("{base}.lab"));
        fs::write(
            &path,
            format!("0 500000 x^pau-{base}+a\n500000 900000 pau^{base}-a+pau\n"),
        )
        .unwrap();
        path
    }

    fn list(&self, bases: &[&str]) -> PathBuf {
        let lines: Vec<String> = bases
            .iter()
            .map(|b| self.label(b).display().to_string())
            .collect();
        let path = self.root.path().join("test.scp");
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn engine(&self, tools: Arc<FakeTools>, gv: bool) -> HtsEngine {
        let mut engine = HtsEngine::with_runner(Box::new(tools));
        engine
            .load_model_with_params(
                &self.voice(),
                HtsModelParams {
                    gv_dir: gv.then(|| self.voice().join("gv")),
                    ..Default::default()
                },
            )
            .unwrap();
        engine
    }

    fn workspace_is_empty(&self) -> bool {
        fs::read_dir(self.workdir()).unwrap().next().is_none()
    }
}

#[test]
fn renders_every_utterance_of_a_list_in_order() {
    let fx = Fixture::new();
    let list = fx.list(&["c03", "a01", "b02"]);
    let tools = Arc::new(FakeTools::default());
    let mut engine = fx.engine(tools.clone(), false);

    let params = HtsInferenceParamsBuilder::default()
        .input_is_list(true)
        .workdir(fx.workdir())
        .build()
        .unwrap();
    let report = engine.synthesize(&list, &fx.output(), Some(params)).unwrap();

    let bases: Vec<&str> = report.utterances.iter().map(|u| u.base.as_str()).collect();
    assert_eq!(bases, vec!["c03", "a01", "b02"]);
    let output = fx.output().canonicalize().unwrap();
    for utt in &report.utterances {
        assert_eq!(utt.wav_path, output.join(format!("{}.wav", utt.base)));
        assert!(utt.wav_path.is_file());
    }
    assert!((report.total_duration_secs().unwrap() - 0.3).abs() < 1e-9);

    // N utterances x S streams right after generation
    assert_eq!(tools.generated.lock().unwrap().len(), 3 * STREAMS.len());

    let programs = tools.programs();
    assert_eq!(
        programs,
        vec![
            "HHEd", "HHEd", "HMGenS", "sopr", "mgc2sp", "mgc2sp", "sopr", "mgc2sp", "mgc2sp",
            "sopr", "mgc2sp", "mgc2sp", "matlab",
        ]
    );

    let leftovers: Vec<PathBuf> = fs::read_dir(&output)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) != Some("wav"))
        .collect();
    assert!(leftovers.is_empty(), "intermediate files left: {leftovers:?}");
    assert!(fx.workspace_is_empty());
}

#[test]
fn single_label_input_is_wrapped_in_a_list() {
    let fx = Fixture::new();
    let label = fx.label("solo");
    let tools = Arc::new(FakeTools::default());
    let mut engine = fx.engine(tools.clone(), false);

    let params = HtsInferenceParamsBuilder::default()
        .workdir(fx.workdir())
        .build()
        .unwrap();
    let report = engine.synthesize(&label, &fx.output(), Some(params)).unwrap();

    assert_eq!(report.utterances.len(), 1);
    assert_eq!(report.utterances[0].base, "solo");
    let calls = tools.calls.lock().unwrap();
    let hmgens = calls.iter().find(|c| c.program() == "HMGenS").unwrap();
    let list = PathBuf::from(hmgens.flag_value("-S").unwrap());
    assert!(list.ends_with("list_input_labels"));
}

#[test]
fn gv_adds_a_third_composition() {
    let fx = Fixture::new();
    let label = fx.label("g");
    let tools = Arc::new(FakeTools::default());
    let mut engine = fx.engine(tools.clone(), true);

    let params = HtsInferenceParamsBuilder::default()
        .workdir(fx.workdir())
        .keep_workspace(true)
        .build()
        .unwrap();
    let report = engine.synthesize(&label, &fx.output(), Some(params)).unwrap();

    let programs = tools.programs();
    assert_eq!(&programs[..4], &["HHEd", "HHEd", "HHEd", "HMGenS"]);

    let run_dir = fx.workdir().join(format!("run-{}", report.run_id));
    let synth = fs::read_to_string(run_dir.join("synth.cfg")).unwrap();
    assert!(synth.contains("USEGV = T\n"));
    assert!(synth.contains(&format!("GVMODELMMF = {}\n", run_dir.join("gv.mmf").display())));
    let vocabulary = fs::read_to_string(run_dir.join("list_all")).unwrap();
    assert_eq!(vocabulary, "pau^g-a+pau\nx^pau-g+a");
}

#[test]
fn failed_composition_aborts_and_releases_workspace() {
    let fx = Fixture::new();
    let label = fx.label("x");
    let tools = Arc::new(FakeTools::failing("HHEd"));
    let mut engine = fx.engine(tools.clone(), false);

    let params = HtsInferenceParamsBuilder::default()
        .workdir(fx.workdir())
        .build()
        .unwrap();
    let err = engine
        .synthesize(&label, &fx.output(), Some(params))
        .unwrap_err();

    let err = err.downcast::<HtsError>().unwrap();
    assert!(matches!(*err, HtsError::ExternalTool { ref tool, .. } if tool == "HHEd"));
    assert_eq!(tools.programs(), vec!["HHEd"]);
    assert!(fx.workspace_is_empty());
}

#[test]
fn failed_rendering_keeps_converted_features() {
    let fx = Fixture::new();
    let label = fx.label("y");
    let tools = Arc::new(FakeTools::failing("matlab"));
    let mut engine = fx.engine(tools.clone(), false);

    let params = HtsInferenceParamsBuilder::default()
        .workdir(fx.workdir())
        .build()
        .unwrap();
    assert!(engine.synthesize(&label, &fx.output(), Some(params)).is_err());

    let output = fx.output();
    assert!(output.join("y.f0").exists());
    assert!(output.join("y.sp").exists());
    assert!(!output.join("y.wav").exists());
    assert!(fx.workspace_is_empty());
}

#[test]
fn malformed_label_is_a_parse_error() {
    let fx = Fixture::new();
    let label = fx.voice().join("labels").join("bad.lab");
    fs::write(&label, "0 100\n").unwrap();
    let tools = Arc::new(FakeTools::default());
    let mut engine = fx.engine(tools.clone(), false);

    let params = HtsInferenceParamsBuilder::default()
        .workdir(fx.workdir())
        .build()
        .unwrap();
    let err = engine
        .synthesize(&label, &fx.output(), Some(params))
        .unwrap_err();

    assert!(matches!(
        *err.downcast::<HtsError>().unwrap(),
        HtsError::Parse { line: 1, .. }
    ));
    assert!(tools.programs().is_empty());
    assert!(fx.workspace_is_empty());
}

#[test]
fn labels_sharing_a_base_name_are_rejected_before_any_tool_runs() {
    let fx = Fixture::new();
    let first = fx.label("dup");
    let other_dir = fx.voice().join("other");
    fs::create_dir_all(&other_dir).unwrap();
    let second = other_dir.join("dup.lab");
    fs::copy(&first, &second).unwrap();
    let list = fx.root.path().join("dup.scp");
    fs::write(
        &list,
        format!("{}\n{}\n", first.display(), second.display()),
    )
    .unwrap();

    let tools = Arc::new(FakeTools::default());
    let mut engine = fx.engine(tools.clone(), false);
    let params = HtsInferenceParamsBuilder::default()
        .input_is_list(true)
        .workdir(fx.workdir())
        .build()
        .unwrap();
    let err = engine
        .synthesize(&list, &fx.output(), Some(params))
        .unwrap_err();

    assert!(matches!(
        *err.downcast::<HtsError>().unwrap(),
        HtsError::Config(_)
    ));
    assert!(tools.programs().is_empty());
    assert!(fx.workspace_is_empty());
}

#[test]
fn invalid_generation_type_is_rejected() {
    let fx = Fixture::new();
    let label = fx.label("z");
    let tools = Arc::new(FakeTools::default());
    let mut engine = fx.engine(tools.clone(), false);

    let params = HtsInferenceParamsBuilder::default()
        .generation_type(7)
        .workdir(fx.workdir())
        .build()
        .unwrap();
    let err = engine
        .synthesize(&label, &fx.output(), Some(params))
        .unwrap_err();
    assert!(matches!(
        *err.downcast::<HtsError>().unwrap(),
        HtsError::Config(_)
    ));
    assert!(tools.programs().is_empty());
}
