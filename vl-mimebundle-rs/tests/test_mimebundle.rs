use rstest::rstest;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use vl_mimebundle_rs::anyhow::{self, bail};
use vl_mimebundle_rs::{
    DataTransformerRegistry, EngineRegistry, Format, MimeData, Mimebundle, MimebundleBuilder,
    MimebundleError, Mode, Options, SaverEngine, Versions, VlConvertEngine,
};

/// Transformer configuration seen by an engine while it was running
#[derive(Debug, Clone, PartialEq)]
struct ObservedTransformer {
    active: String,
    options: Options,
}

struct FakeVlConvert {
    transformers: Arc<DataTransformerRegistry>,
    fail: bool,
    calls: Mutex<Vec<(String, String, Option<f32>)>>,
    observed: Mutex<Vec<ObservedTransformer>>,
}

impl FakeVlConvert {
    fn new(transformers: Arc<DataTransformerRegistry>, fail: bool) -> Self {
        Self {
            transformers,
            fail,
            calls: Mutex::new(Vec::new()),
            observed: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, method: &str, vl_version: &str, scale: Option<f32>) -> anyhow::Result<()> {
        self.observed.lock().unwrap().push(ObservedTransformer {
            active: self.transformers.active(),
            options: self.transformers.options(),
        });
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), vl_version.to_string(), scale));
        if self.fail {
            bail!("{} exploded", method);
        }
        Ok(())
    }
}

impl VlConvertEngine for FakeVlConvert {
    fn vegalite_to_vega(&self, _vl_spec: &Value, vl_version: &str) -> anyhow::Result<Value> {
        self.record("vegalite_to_vega", vl_version, None)?;
        Ok(json!({"$schema": "https://vega.github.io/schema/vega/v5.json", "marks": []}))
    }

    fn vegalite_to_svg(&self, _vl_spec: &Value, vl_version: &str) -> anyhow::Result<String> {
        self.record("vegalite_to_svg", vl_version, None)?;
        Ok("<svg></svg>".to_string())
    }

    fn vegalite_to_png(
        &self,
        _vl_spec: &Value,
        vl_version: &str,
        scale: f32,
    ) -> anyhow::Result<Vec<u8>> {
        self.record("vegalite_to_png", vl_version, Some(scale))?;
        Ok(vec![137, 80, 78, 71])
    }
}

#[derive(Default)]
struct FakeSaver {
    calls: Mutex<Vec<(Format, Mode, Options)>>,
}

impl SaverEngine for FakeSaver {
    fn render(
        &self,
        _spec: &Value,
        format: Format,
        mode: Mode,
        options: &Options,
    ) -> anyhow::Result<Mimebundle> {
        self.calls
            .lock()
            .unwrap()
            .push((format, mode, options.clone()));
        let mut bundle = Mimebundle::single("application/pdf", b"%PDF-1.4".to_vec());
        bundle.insert("text/plain", format!("<{} chart>", format));
        Ok(bundle)
    }
}

struct Harness {
    builder: MimebundleBuilder,
    transformers: Arc<DataTransformerRegistry>,
    vl_convert: Option<Arc<FakeVlConvert>>,
    saver: Option<Arc<FakeSaver>>,
}

fn harness(with_vl_convert: bool, with_saver: bool, failing_vl_convert: bool) -> Harness {
    let transformers = Arc::new(DataTransformerRegistry::with_builtins());
    let mut engines = EngineRegistry::new();
    let vl_convert = if with_vl_convert {
        let engine = Arc::new(FakeVlConvert::new(transformers.clone(), failing_vl_convert));
        engines = engines.with_vl_convert(engine.clone());
        Some(engine)
    } else {
        None
    };
    let saver = if with_saver {
        let engine = Arc::new(FakeSaver::default());
        engines = engines.with_saver(engine.clone());
        Some(engine)
    } else {
        None
    };
    let builder = MimebundleBuilder::new()
        .with_engines(engines)
        .with_transformers(transformers.clone());
    Harness {
        builder,
        transformers,
        vl_convert,
        saver,
    }
}

fn vl_spec() -> Value {
    json!({
        "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
        "data": {"values": [{"a": "A", "b": 28}, {"a": "B", "b": 55}]},
        "mark": "bar",
        "encoding": {
            "x": {"field": "a", "type": "nominal"},
            "y": {"field": "b", "type": "quantitative"}
        }
    })
}

fn versions() -> Versions {
    Versions::new(Some("5.20.0"), Some("6"), Some("5.2.0"))
}

#[rstest]
#[case("vega", "application/vnd.vega.v5+json", "vegalite_to_vega")]
#[case("svg", "image/svg+xml", "vegalite_to_svg")]
#[case("png", "image/png", "vegalite_to_png")]
fn test_default_engine_is_vl_convert(
    #[case] format: &str,
    #[case] mime_type: &str,
    #[case] method: &str,
) {
    let h = harness(true, false, false);
    let bundle = h
        .builder
        .spec_to_mimebundle(vl_spec(), format, Some("vega-lite"), &versions(), Options::new())
        .unwrap();

    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle.mime_types().collect::<Vec<_>>(), vec![mime_type]);

    let calls = h.vl_convert.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, method);
    assert_eq!(calls[0].1, "5_2");
}

#[test]
fn test_png_payload_and_scale() {
    let h = harness(true, false, false);
    let bundle = h
        .builder
        .build(
            vl_spec(),
            Format::Png,
            Mode::VegaLite,
            &versions(),
            Options::new().with("scale_factor", 2.0),
        )
        .unwrap();
    assert_eq!(
        bundle.get("image/png"),
        Some(&MimeData::Bytes(vec![137, 80, 78, 71]))
    );
    let calls = h.vl_convert.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls[0].2, Some(2.0));
}

#[test]
fn test_png_default_scale() {
    let h = harness(true, false, false);
    h.builder
        .build(vl_spec(), Format::Png, Mode::VegaLite, &versions(), Options::new())
        .unwrap();
    let calls = h.vl_convert.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls[0].2, Some(1.0));
}

#[test]
fn test_schema_version_selects_vl_version() {
    let h = harness(true, false, false);
    let builder = h.builder.with_schema_version("5.8.0");
    builder
        .build(vl_spec(), Format::Svg, Mode::VegaLite, &versions(), Options::new())
        .unwrap();
    let calls = h.vl_convert.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls[0].1, "5_8");
}

#[rstest]
fn test_engine_name_is_normalized(
    #[values("vl-convert", "VL_Convert", "vlconvert", "Vl-Convert")] engine: &str,
) {
    let h = harness(true, true, false);
    let bundle = h
        .builder
        .build(
            vl_spec(),
            Format::Svg,
            Mode::VegaLite,
            &versions(),
            Options::new().with("engine", engine),
        )
        .unwrap();
    assert_eq!(
        bundle.get("image/svg+xml"),
        Some(&MimeData::Text("<svg></svg>".to_string()))
    );
    assert!(h.saver.unwrap().calls.lock().unwrap().is_empty());
}

#[rstest]
fn test_pdf_with_vl_convert_is_rejected(#[values(true, false)] with_saver: bool) {
    let h = harness(true, with_saver, false);
    let err = h
        .builder
        .build(
            vl_spec(),
            Format::Pdf,
            Mode::VegaLite,
            &versions(),
            Options::new().with("engine", "vl-convert"),
        )
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(err.to_string().contains("does not support the 'pdf' format"));
    assert!(h.vl_convert.unwrap().calls.lock().unwrap().is_empty());
}

#[test]
fn test_pdf_defaults_to_saver() {
    let h = harness(true, true, false);
    let bundle = h
        .builder
        .build(vl_spec(), Format::Pdf, Mode::VegaLite, &versions(), Options::new())
        .unwrap();
    assert_eq!(
        bundle.get("application/pdf").and_then(MimeData::as_bytes),
        Some(&b"%PDF-1.4"[..])
    );
    assert!(h.vl_convert.unwrap().calls.lock().unwrap().is_empty());
}

#[test]
fn test_saver_receives_options_without_engine() {
    let h = harness(false, true, false);
    let options = Options::new()
        .with("engine", "altair_saver")
        .with("webdriver", "firefox")
        .with("scale_factor", 3);
    let bundle = h
        .builder
        .build(vl_spec(), Format::Png, Mode::VegaLite, &versions(), options)
        .unwrap();

    // The saver's bundle is returned as-is
    assert_eq!(bundle.len(), 2);
    assert_eq!(
        bundle.get("text/plain").and_then(MimeData::as_text),
        Some("<png chart>")
    );

    let calls = h.saver.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (format, mode, options) = &calls[0];
    assert_eq!((*format, *mode), (Format::Png, Mode::VegaLite));
    assert!(!options.contains_key("engine"));
    assert_eq!(options.get("webdriver"), Some(&json!("firefox")));
    assert_eq!(options.get("scale_factor"), Some(&json!(3)));
}

#[test]
fn test_vega_mode_png_goes_to_saver_with_mode() {
    let h = harness(false, true, false);
    h.builder
        .build(
            json!({"marks": []}),
            Format::Png,
            Mode::Vega,
            &versions(),
            Options::new(),
        )
        .unwrap();
    let calls = h.saver.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls[0].1, Mode::Vega);
}

#[test]
fn test_missing_requested_engine() {
    let h = harness(false, true, false);
    let err = h
        .builder
        .build(
            vl_spec(),
            Format::Svg,
            Mode::VegaLite,
            &versions(),
            Options::new().with("engine", "vl-convert"),
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "The 'vl-convert' conversion engine requires the vl-convert-python package"
    );
}

#[test]
fn test_unknown_engine() {
    let h = harness(true, true, false);
    let err = h
        .builder
        .build(
            vl_spec(),
            Format::Svg,
            Mode::VegaLite,
            &versions(),
            Options::new().with("engine", "webdriver"),
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid conversion engine 'webdriver'. Expected one of ('vl-convert', 'altair_saver')"
    );
}

#[test]
fn test_transformer_overridden_during_conversion_and_restored() {
    let h = harness(true, false, false);
    let _identity = h.transformers.enable("identity", Options::new()).unwrap();

    h.builder
        .build(vl_spec(), Format::Svg, Mode::VegaLite, &versions(), Options::new())
        .unwrap();

    let observed = h.vl_convert.unwrap().observed.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![ObservedTransformer {
            active: "default".to_string(),
            options: Options::new().with("max_rows", Value::Null),
        }]
    );
    assert_eq!(h.transformers.active(), "identity");
    assert!(h.transformers.options().is_empty());
}

#[test]
fn test_transformer_restored_when_conversion_fails() {
    let h = harness(true, false, true);
    let _limited = h
        .transformers
        .enable("default", Options::new().with("max_rows", 10))
        .unwrap();

    let err = h
        .builder
        .build(vl_spec(), Format::Png, Mode::VegaLite, &versions(), Options::new())
        .unwrap_err();
    assert!(matches!(err, MimebundleError::Engine(_)));
    assert!(err.to_string().contains("vegalite_to_png exploded"));

    assert_eq!(h.transformers.active(), "default");
    assert_eq!(h.transformers.options(), Options::new().with("max_rows", 10));
}

#[test]
fn test_passthrough_formats_skip_engines() {
    let h = harness(true, true, false);
    for format in ["json", "vega-lite", "html"] {
        let bundle = h
            .builder
            .spec_to_mimebundle(vl_spec(), format, Some("vega-lite"), &versions(), Options::new())
            .unwrap();
        assert_eq!(bundle.len(), 1);
    }
    let bundle = h
        .builder
        .spec_to_mimebundle(
            json!({"marks": []}),
            "vega",
            Some("vega"),
            &versions(),
            Options::new(),
        )
        .unwrap();
    assert!(bundle.get("application/vnd.vega.v5+json").is_some());

    assert!(h.vl_convert.unwrap().calls.lock().unwrap().is_empty());
    assert!(h.saver.unwrap().calls.lock().unwrap().is_empty());
}

#[test]
fn test_display_data() {
    let h = harness(true, false, false);
    let bundle = h
        .builder
        .build(vl_spec(), Format::Png, Mode::VegaLite, &versions(), Options::new())
        .unwrap();
    assert_eq!(
        bundle.to_display_data(),
        json!({"data": {"image/png": "iVBORw=="}, "metadata": {}})
    );
}
