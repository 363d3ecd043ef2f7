//zsearch/src/main.rs
use crossterm::style::{style, Color, Stylize};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use zsearch::kernel::search::{RenderedRow, SearchSession, Segment, SegmentKind};
use zsearch::kernel::services::adapters::{
    ensure_settings_file, load_settings, AsyncRuntime, MemoryBuffers, ScanService,
};
use zsearch::kernel::services::ports::Settings;

mod logging;

const USAGE: &str = "\
usage: zsearch [options] <root> <pattern>

options:
  -c, --case-sensitive   match case
  -w, --whole-word       match whole words only
  -r, --regex            treat <pattern> as a regular expression
      --replace <text>   replace every match with <text>
      --preview          show a before/after preview for each match
      --yes              do not ask before replacing
  -v, --verbose          echo log records to stderr
  -h, --help             print this help";

#[derive(Debug, Default)]
struct CliArgs {
    root: PathBuf,
    pattern: String,
    case_sensitive: bool,
    whole_word: bool,
    regex: bool,
    replace: Option<String>,
    preview: bool,
    yes: bool,
    verbose: bool,
}

enum Parsed {
    Run(CliArgs),
    Help,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Parsed, String> {
    let mut cli = CliArgs::default();
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-c" | "--case-sensitive" => cli.case_sensitive = true,
            "-w" | "--whole-word" => cli.whole_word = true,
            "-r" | "--regex" => cli.regex = true,
            "--preview" => cli.preview = true,
            "--yes" => cli.yes = true,
            "-v" | "--verbose" => cli.verbose = true,
            "--replace" => {
                let text = args
                    .next()
                    .ok_or_else(|| "--replace needs a value".to_string())?;
                cli.replace = Some(text);
            }
            "--" => positional.extend(args.by_ref()),
            s if s.starts_with('-') && s.len() > 1 => {
                return Err(format!("unknown option: {}", s));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(root), Some(pattern), None) => {
            cli.root = PathBuf::from(root);
            cli.pattern = pattern;
            Ok(Parsed::Run(cli))
        }
        _ => Err("expected <root> and <pattern>".to_string()),
    }
}

fn main() -> ExitCode {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(Parsed::Run(cli)) => cli,
        Ok(Parsed::Help) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("zsearch: {}\n\n{}", msg, USAGE);
            return ExitCode::from(2);
        }
    };

    let logging = logging::init(cli.verbose);
    if cli.verbose {
        if let Some(guard) = logging.as_ref() {
            eprintln!("logs: {}", guard.log_dir().display());
        }
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "zsearch failed");
            eprintln!("zsearch: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliArgs) -> io::Result<ExitCode> {
    if let Err(e) = ensure_settings_file() {
        tracing::warn!(error = %e, "settings file not created");
    }
    let settings = load_settings().unwrap_or_default();
    let Settings { search } = settings;

    let runtime = AsyncRuntime::new()?;
    let scanner = ScanService::new(runtime.tokio_handle(), search);
    let mut session = SearchSession::new(scanner);

    session.set_root_path(cli.root.clone());
    session.set_search_text(cli.pattern.as_str());
    if cli.case_sensitive {
        session.toggle_case_sensitive();
    }
    if cli.whole_word {
        session.toggle_whole_word();
    }
    if cli.regex {
        session.toggle_regex();
    }
    if let Some(text) = cli.replace.as_deref() {
        session.set_replace_text(text);
    }

    session.submit();
    while session.is_searching() {
        session.finish_scan(Duration::from_millis(250));
    }

    let mut stdout = io::stdout().lock();
    print_rows(&mut stdout, &session.render_rows())?;

    if cli.preview && cli.replace.is_some() {
        print_previews(&mut stdout, &mut session)?;
    }

    if let Some(summary) = session.summary() {
        writeln!(stdout, "{}", style(summary).bold())?;
    }
    writeln!(stdout, "{}", style(session.status()).dark_grey())?;
    stdout.flush()?;
    drop(stdout);

    if cli.replace.is_none() || session.index().is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let mut buffers = MemoryBuffers::new();
    let yes = cli.yes;
    let mut confirm = |title: &str, message: &str| yes || ask(title, message);
    let report = session.replace_all(&mut buffers, &mut confirm);

    println!("{}", session.status());
    for failure in &report.failures {
        eprintln!("{} {}", style("error:").red().bold(), failure);
    }

    Ok(if report.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_rows(out: &mut impl Write, rows: &[RenderedRow]) -> io::Result<()> {
    for row in rows {
        match row {
            RenderedRow::File { label, count, .. } => {
                writeln!(
                    out,
                    "{} {}",
                    style(label).with(Color::Cyan).bold(),
                    style(format!("({})", count)).dark_grey()
                )?;
            }
            RenderedRow::Match { segments, .. } => {
                write!(out, "  ")?;
                for segment in segments {
                    write_segment(out, segment)?;
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

fn write_segment(out: &mut impl Write, segment: &Segment) -> io::Result<()> {
    let text = segment.text.as_str();
    match segment.kind {
        SegmentKind::LineNumber | SegmentKind::Arrow => write!(out, "{}", style(text).dark_grey()),
        SegmentKind::Text => write!(out, "{}", text),
        SegmentKind::Match => write!(out, "{}", style(text).with(Color::Yellow).bold()),
        SegmentKind::Removed => write!(out, "{}", style(text).red().crossed_out()),
        SegmentKind::Inserted => write!(out, "{}", style(text).green()),
    }
}

fn print_previews(out: &mut impl Write, session: &mut SearchSession) -> io::Result<()> {
    let targets: Vec<(PathBuf, usize)> = session
        .render_rows()
        .into_iter()
        .filter_map(|row| match row {
            RenderedRow::Match {
                path, line_number, ..
            } => Some((path, line_number)),
            RenderedRow::File { .. } => None,
        })
        .collect();

    for (path, line) in targets {
        match session.show_preview(&path, line) {
            Ok(Some(preview)) => writeln!(out, "\n{}", preview)?,
            Ok(None) => {}
            Err(e) => writeln!(out, "{} {}", style("preview failed:").red(), e)?,
        }
        session.cancel_preview();
    }
    Ok(())
}

/// stdin 上的 y/N 确认
fn ask(title: &str, message: &str) -> bool {
    eprint!("{}: {} [y/N] ", style(title).bold(), message);
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes" | "Yes")
}
