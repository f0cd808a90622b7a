//! Engines backed by external command line converters
//!
//! `VlConvertCli` drives the `vl-convert` executable, `VegaCliSaver` drives the
//! `vl2vg`/`vg2svg`/`vg2png`/`vg2pdf` tools shipped with vega-cli and vega-lite.

use crate::engine::{SaverEngine, VlConvertEngine};
use crate::format::{Format, Mode};
use crate::mimebundle::{vega_mime_type, Mimebundle, PDF_MIME_TYPE, PNG_MIME_TYPE, SVG_MIME_TYPE};
use crate::options::Options;
use anyhow::{bail, Context};
use log::{info, warn};
use serde_json::Value;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::{env, fs, thread};

const VL_CONVERT_PROGRAM: &str = "vl-convert";
const VL2VG_PROGRAM: &str = "vl2vg";
const VG2SVG_PROGRAM: &str = "vg2svg";
const VG2PNG_PROGRAM: &str = "vg2png";
const VG2PDF_PROGRAM: &str = "vg2pdf";

/// Locate an executable on `PATH`
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    env::split_paths(&path)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

fn check_output(program: &Path, output: Output) -> anyhow::Result<Vec<u8>> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        bail!(
            "{} exited with {}\n{}",
            program.display(),
            output.status,
            stderr.trim()
        );
    }
    if !stderr.trim().is_empty() {
        warn!("{}: {}", program.display(), stderr.trim());
    }
    Ok(output.stdout)
}

/// Engine that runs the `vl-convert` command line application
#[derive(Debug, Clone)]
pub struct VlConvertCli {
    program: PathBuf,
}

impl VlConvertCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn detect() -> Option<Self> {
        find_executable(VL_CONVERT_PROGRAM).map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run a `vl-convert` subcommand on a spec and return the output file contents
    fn convert(
        &self,
        subcommand: &str,
        vl_spec: &Value,
        vl_version: &str,
        extra_args: &[OsString],
    ) -> anyhow::Result<Vec<u8>> {
        let workdir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let input_path = workdir.path().join("spec.vl.json");
        let output_path = workdir.path().join("output");
        fs::write(&input_path, serde_json::to_vec(vl_spec)?)
            .with_context(|| format!("Failed to write {}", input_path.display()))?;

        info!("Running {} {}", self.program.display(), subcommand);
        let output = Command::new(&self.program)
            .arg(subcommand)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--vl-version")
            .arg(vl_version)
            .args(extra_args)
            .output()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;
        check_output(&self.program, output)?;

        fs::read(&output_path).with_context(|| {
            format!(
                "{} {} did not produce an output file",
                self.program.display(),
                subcommand
            )
        })
    }
}

impl VlConvertEngine for VlConvertCli {
    fn vegalite_to_vega(&self, vl_spec: &Value, vl_version: &str) -> anyhow::Result<Value> {
        let vg_spec = self.convert("vl2vg", vl_spec, vl_version, &[])?;
        serde_json::from_slice(&vg_spec).context("vl-convert produced an invalid Vega spec")
    }

    fn vegalite_to_svg(&self, vl_spec: &Value, vl_version: &str) -> anyhow::Result<String> {
        let svg = self.convert("vl2svg", vl_spec, vl_version, &[])?;
        String::from_utf8(svg).context("vl-convert produced an SVG that is not valid UTF-8")
    }

    fn vegalite_to_png(
        &self,
        vl_spec: &Value,
        vl_version: &str,
        scale: f32,
    ) -> anyhow::Result<Vec<u8>> {
        let extra_args = [OsString::from("--scale"), OsString::from(scale.to_string())];
        self.convert("vl2png", vl_spec, vl_version, &extra_args)
    }
}

/// Engine that pipes specs through the vega-cli and vega-lite command line tools
#[derive(Debug, Clone, Default)]
pub struct VegaCliSaver {
    bin_dir: Option<PathBuf>,
}

impl VegaCliSaver {
    /// Saver that resolves the tools relative to `bin_dir`, or on `PATH` when `None`
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    pub fn detect() -> Option<Self> {
        let vg2svg = find_executable(VG2SVG_PROGRAM)?;
        Some(Self::new(vg2svg.parent().map(Path::to_path_buf)))
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Run a tool that reads its input from stdin and writes the result to stdout
    fn pipe(&self, name: &str, args: &[String], input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let program = self.program(name);
        info!("Running {}", program.display());
        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to launch {}", program.display()))?;

        // Written from a separate thread, a full stdout pipe would otherwise deadlock
        let mut stdin = child.stdin.take().context("Failed to open stdin")?;
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", program.display()))?;
        let written = writer.join();
        let stdout = check_output(&program, output)?;
        match written {
            Ok(result) => {
                result.with_context(|| format!("Failed to write to {}", program.display()))?
            }
            Err(_) => bail!("stdin writer for {} panicked", program.display()),
        }
        Ok(stdout)
    }

    fn to_vega(&self, spec: &Value, mode: Mode) -> anyhow::Result<Value> {
        match mode {
            Mode::Vega => Ok(spec.clone()),
            Mode::VegaLite => {
                let vg_spec = self.pipe(VL2VG_PROGRAM, &[], serde_json::to_vec(spec)?)?;
                serde_json::from_slice(&vg_spec).context("vl2vg produced an invalid Vega spec")
            }
        }
    }
}

impl SaverEngine for VegaCliSaver {
    fn render(
        &self,
        spec: &Value,
        format: Format,
        mode: Mode,
        options: &Options,
    ) -> anyhow::Result<Mimebundle> {
        let vg_spec = self.to_vega(spec, mode)?;
        let scale_args = || -> anyhow::Result<Vec<String>> {
            let scale = options.scale_factor()?;
            Ok(vec!["-s".to_string(), scale.to_string()])
        };

        match format {
            Format::Vega => Ok(Mimebundle::single(vega_mime_type(5), vg_spec)),
            Format::Svg => {
                let svg = self.pipe(VG2SVG_PROGRAM, &[], serde_json::to_vec(&vg_spec)?)?;
                let svg = String::from_utf8(svg).context("vg2svg produced invalid UTF-8")?;
                Ok(Mimebundle::single(SVG_MIME_TYPE, svg))
            }
            Format::Png => {
                let png = self.pipe(VG2PNG_PROGRAM, &scale_args()?, serde_json::to_vec(&vg_spec)?)?;
                Ok(Mimebundle::single(PNG_MIME_TYPE, png))
            }
            Format::Pdf => {
                let pdf = self.pipe(VG2PDF_PROGRAM, &scale_args()?, serde_json::to_vec(&vg_spec)?)?;
                Ok(Mimebundle::single(PDF_MIME_TYPE, pdf))
            }
            other => bail!("vega-cli cannot render the '{}' format", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_missing_executable() {
        assert!(find_executable("vl-mimebundle-no-such-program").is_none());
    }

    #[test]
    fn test_saver_program_path() {
        let saver = VegaCliSaver::new(Some(PathBuf::from("/opt/vega/bin")));
        assert_eq!(saver.program("vg2png"), PathBuf::from("/opt/vega/bin/vg2png"));
        assert_eq!(
            VegaCliSaver::default().program("vg2png"),
            PathBuf::from("vg2png")
        );
    }

    #[test]
    fn test_saver_passes_vega_spec_through() {
        let saver = VegaCliSaver::new(Some(PathBuf::from("/nonexistent")));
        let spec = serde_json::json!({"marks": []});
        let bundle = saver
            .render(&spec, Format::Vega, Mode::Vega, &Options::new())
            .unwrap();
        assert_eq!(
            bundle.get("application/vnd.vega.v5+json").unwrap().as_json(),
            Some(&spec)
        );
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let saver = VegaCliSaver::new(Some(PathBuf::from("/nonexistent")));
        let spec = serde_json::json!({"marks": []});
        let err = saver
            .render(&spec, Format::Svg, Mode::Vega, &Options::new())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Fake `vl-convert` that records its arguments and writes `payload` to `--output`
    #[cfg(unix)]
    fn fake_vl_convert(dir: &Path, payload: &str) -> VlConvertCli {
        let body = format!(
            r#"echo "$@" > "$(dirname "$0")/args.txt"
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
printf '%s' '{}' > "$out""#,
            payload
        );
        VlConvertCli::new(write_script(dir, "vl-convert", &body))
    }

    #[cfg(unix)]
    fn recorded_args(dir: &Path) -> String {
        fs::read_to_string(dir.join("args.txt")).unwrap().trim().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_vl_convert_svg() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_vl_convert(dir.path(), "<svg></svg>");
        let svg = engine
            .vegalite_to_svg(&serde_json::json!({"mark": "bar"}), "5_2")
            .unwrap();
        assert_eq!(svg, "<svg></svg>");

        let args = recorded_args(dir.path());
        assert!(args.starts_with("vl2svg --input "));
        assert!(args.contains("spec.vl.json --output "));
        assert!(args.ends_with("--vl-version 5_2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_vl_convert_png_scale() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_vl_convert(dir.path(), "PNG");
        let png = engine
            .vegalite_to_png(&serde_json::json!({"mark": "bar"}), "5_8", 2.0)
            .unwrap();
        assert_eq!(png, b"PNG".to_vec());

        let args = recorded_args(dir.path());
        assert!(args.starts_with("vl2png --input "));
        assert!(args.ends_with("--vl-version 5_8 --scale 2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_vl_convert_vega() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_vl_convert(dir.path(), r#"{"marks": []}"#);
        let vg_spec = engine
            .vegalite_to_vega(&serde_json::json!({"mark": "bar"}), "5_2")
            .unwrap();
        assert_eq!(vg_spec, serde_json::json!({"marks": []}));
        assert!(recorded_args(dir.path()).starts_with("vl2vg "));
    }

    #[cfg(unix)]
    #[test]
    fn test_vl_convert_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let engine = VlConvertCli::new(write_script(
            dir.path(),
            "vl-convert",
            "echo 'unsupported vl-version' >&2\nexit 3",
        ));
        let err = engine
            .vegalite_to_svg(&serde_json::json!({}), "9_9")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported vl-version"));
    }

    /// Fake vega-cli tool that saves its stdin and arguments, then prints `payload`
    #[cfg(unix)]
    fn fake_vega_tool(dir: &Path, name: &str, payload: &str) {
        let body = format!(
            r#"cat > "$(dirname "$0")/{name}.stdin"
echo "$@" > "$(dirname "$0")/{name}.args"
printf '%s' '{payload}'"#
        );
        write_script(dir, name, &body);
    }

    #[cfg(unix)]
    #[test]
    fn test_saver_svg_from_vegalite() {
        let dir = tempfile::tempdir().unwrap();
        fake_vega_tool(dir.path(), VL2VG_PROGRAM, r#"{"marks": [1]}"#);
        fake_vega_tool(dir.path(), VG2SVG_PROGRAM, "<svg></svg>");
        let saver = VegaCliSaver::new(Some(dir.path().to_path_buf()));

        let vl_spec = serde_json::json!({"mark": "bar"});
        let bundle = saver
            .render(&vl_spec, Format::Svg, Mode::VegaLite, &Options::new())
            .unwrap();
        assert_eq!(
            bundle.get(SVG_MIME_TYPE).unwrap().as_text(),
            Some("<svg></svg>")
        );

        let vl2vg_stdin: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("vl2vg.stdin")).unwrap())
                .unwrap();
        assert_eq!(vl2vg_stdin, vl_spec);
        let vg2svg_stdin: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("vg2svg.stdin")).unwrap())
                .unwrap();
        assert_eq!(vg2svg_stdin, serde_json::json!({"marks": [1]}));
    }

    #[cfg(unix)]
    #[test]
    fn test_saver_png_scale() {
        let dir = tempfile::tempdir().unwrap();
        fake_vega_tool(dir.path(), VG2PNG_PROGRAM, "PNG");
        let saver = VegaCliSaver::new(Some(dir.path().to_path_buf()));

        let bundle = saver
            .render(
                &serde_json::json!({"marks": []}),
                Format::Png,
                Mode::Vega,
                &Options::new().with("scale_factor", 2),
            )
            .unwrap();
        assert_eq!(bundle.get(PNG_MIME_TYPE).unwrap().as_bytes(), Some(&b"PNG"[..]));
        assert_eq!(
            fs::read_to_string(dir.path().join("vg2png.args")).unwrap().trim(),
            "-s 2"
        );
    }
}
