use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use qr_stylist::{Configuration, ExportFormat, FieldUpdate, Renderer, Studio};

#[derive(Parser)]
#[command(name = "qr-stylist")]
#[command(about = "Render styled QR codes", long_about = None)]
struct Cli {
    /// Saved configuration (JSON) to start from
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Text or URI to encode
    #[arg(long, short = 'd')]
    data: Option<String>,

    /// Logo image to place in the center (PNG, JPEG, SVG, ...)
    #[arg(long, short = 'l')]
    logo: Option<PathBuf>,

    /// Logo opacity between 0 and 1
    #[arg(long)]
    logo_opacity: Option<String>,

    /// Error correction level: L, M, Q or H
    #[arg(long, short = 'e')]
    ec_level: Option<String>,

    /// Any other field, as `fieldName=value` (repeatable)
    #[arg(long = "set", short = 's', value_name = "FIELD=VALUE")]
    set: Vec<String>,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = ExportFormat::Png)]
    format: ExportFormat,

    /// Output file, `-` for stdout [default: qrcode.<format>]
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Print the derived render options as JSON instead of rendering
    #[arg(long)]
    print_options: bool,

    /// Print the configuration JSON schema and exit (needs `jsonschema`)
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.print_schema {
        return print_schema();
    }

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Configuration::from_json(&json)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => Configuration::default(),
    };

    let studio = Studio::with_config(config)?;

    if let Some(data) = cli.data {
        studio.apply(FieldUpdate::Payload(data));
    }
    if let Some(path) = &cli.logo {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading logo {}", path.display()))?;
        studio.upload_logo(bytes);
    }
    if let Some(opacity) = &cli.logo_opacity {
        studio.apply_event("logoOpacity", opacity)?;
    }
    apply_assignments(&studio, &cli.set)?;
    // Applied last so an explicit level wins over the logo upload rule
    if let Some(level) = &cli.ec_level {
        studio.apply_event("errorCorrectionLevel", level)?;
    }

    studio.settle().await;

    if cli.print_options {
        let options = studio
            .options()
            .context("no render options were derived")?;
        println!("{}", options.to_json_pretty()?);
        return Ok(());
    }

    if let Some(err) = studio.last_error() {
        bail!("rendering failed: {err}");
    }
    let bytes = studio.download(cli.format)?;

    let output = cli
        .output
        .unwrap_or_else(|| PathBuf::from(format!("qrcode.{}", cli.format.extension())));
    write_output(&output, &bytes, std::io::stdout().lock())
}

/// Applies `fieldName=value` assignments as form events, in order.
fn apply_assignments<R>(studio: &Studio<R>, assignments: &[String]) -> Result<()>
where
    R: Renderer + Send + 'static,
{
    for assignment in assignments {
        let (field, value) = split_assignment(assignment)?;
        studio
            .apply_event(field, value)
            .with_context(|| format!("applying `{assignment}`"))?;
    }
    Ok(())
}

fn split_assignment(assignment: &str) -> Result<(&str, &str)> {
    match assignment.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => Ok((field.trim(), value)),
        _ => bail!("expected FIELD=VALUE, got `{assignment}`"),
    }
}

/// Writes `bytes` to `output`, or to `stdout` when `output` is `-`.
fn write_output(output: &Path, bytes: &[u8], mut stdout: impl Write) -> Result<()> {
    if output.as_os_str() == "-" {
        stdout.write_all(bytes)?;
        stdout.flush()?;
    } else {
        std::fs::write(output, bytes).with_context(|| format!("writing {}", output.display()))?;
        log::info!("wrote {}", output.display());
    }
    Ok(())
}

#[cfg(feature = "jsonschema")]
fn print_schema() -> Result<()> {
    let schema = schemars::schema_for!(Configuration);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(not(feature = "jsonschema"))]
fn print_schema() -> Result<()> {
    bail!("built without the `jsonschema` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use qr_stylist::{ErrorCorrectionLevel, QrStyle};

    #[test]
    fn assignments_split_on_the_first_equals() {
        assert_eq!(split_assignment("data=a=b").unwrap(), ("data", "a=b"));
        assert_eq!(split_assignment(" qrStyle =dots").unwrap(), ("qrStyle", "dots"));
        assert_eq!(split_assignment("logo=").unwrap(), ("logo", ""));
        assert!(split_assignment("qrStyle").is_err());
        assert!(split_assignment("=dots").is_err());
    }

    #[tokio::test]
    async fn assignments_become_form_events() {
        let studio = Studio::with_config(Configuration::default()).unwrap();
        let assignments = vec![
            "qrStyle=fluid".to_owned(),
            "errorCorrectionLevel=L".to_owned(),
            "data=https://example.com/?a=1".to_owned(),
        ];
        apply_assignments(&studio, &assignments).unwrap();

        let config = studio.config();
        assert_eq!(config.qr_style, QrStyle::Fluid);
        assert_eq!(config.error_correction_level, ErrorCorrectionLevel::L);
        assert_eq!(config.payload, "https://example.com/?a=1");

        let err = apply_assignments(&studio, &["qrStyle=hexagons".to_owned()]).unwrap_err();
        assert!(err.to_string().contains("qrStyle=hexagons"));
        assert_eq!(studio.config().qr_style, QrStyle::Fluid);
    }

    #[test]
    fn dash_writes_to_stdout() {
        let mut stdout = Vec::new();
        write_output(Path::new("-"), b"<svg/>", &mut stdout).unwrap();
        assert_eq!(stdout, b"<svg/>");
    }

    #[test]
    fn paths_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrcode.svg");
        let mut stdout = Vec::new();

        write_output(&path, b"<svg/>", &mut stdout).unwrap();
        assert!(stdout.is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), b"<svg/>");
    }
}
