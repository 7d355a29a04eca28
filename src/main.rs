use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use whois_mime::{
    charset::{CharsetDetector, HtmlMode},
    Response,
};

#[derive(Parser)]
#[command(name = "whois-mime")]
#[command(version)]
#[command(about = "Frames raw WHOIS responses as MIME records and checks existing ones")]
struct Cli {
    /// More logging on stderr, repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wrap a raw response body in a MIME record
    Encode {
        /// The query the body answers
        #[arg(short, long)]
        query: String,

        /// The WHOIS server that sent the body
        #[arg(long)]
        host: String,

        /// Content type reported by the transport, sniffed from the body when omitted
        #[arg(short, long, default_value = "")]
        content_type: String,

        #[arg(long, value_enum, default_value_t = HtmlModeArg::MediaType)]
        html_mode: HtmlModeArg,

        /// Body to read, stdin when omitted
        input: Option<PathBuf>,

        /// Where to write the record, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify a MIME record and print its header fields
    Inspect {
        /// Record to read, stdin when omitted
        input: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HtmlModeArg {
    /// Treat the body as HTML only when its media type says so
    MediaType,
    /// Treat every body as HTML
    Always,
}

impl From<HtmlModeArg> for HtmlMode {
    fn from(arg: HtmlModeArg) -> Self {
        match arg {
            HtmlModeArg::MediaType => HtmlMode::MediaType,
            HtmlModeArg::Always => HtmlMode::Always,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Encode {
            query,
            host,
            content_type,
            html_mode,
            input,
            output,
        } => {
            let body = read_input(input.as_deref())?;
            let detector = <CharsetDetector>::default().with_html_mode(html_mode.into());

            let mut response = Response::new(query, host).with_body(body);
            response.detect_content_type_with(&content_type, &detector);
            tracing::debug!(
                media_type = response.media_type(),
                charset = response.charset(),
                length = response.body().len(),
                "encoding response"
            );

            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let mut out = BufWriter::new(file);
                    response
                        .write_mime(&mut out)
                        .and_then(|()| out.flush())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
                None => {
                    let mut out = BufWriter::new(io::stdout().lock());
                    response
                        .write_mime(&mut out)
                        .and_then(|()| out.flush())
                        .context("Failed to write the record to stdout")?;
                }
            }
        }
        Command::Inspect { input } => {
            let record = read_input(input.as_deref())?;
            let response =
                Response::from_mime(record.into()).context("The record failed verification")?;

            let mut out = io::stdout().lock();
            response
                .header()
                .write_to(&mut out)
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    match path {
        Some(path) => {
            File::open(path)
                .and_then(|mut file| file.read_to_end(&mut data))
                .with_context(|| format!("Failed to read {}", path.display()))?;
        }
        None => {
            io::stdin()
                .lock()
                .read_to_end(&mut data)
                .context("Failed to read stdin")?;
        }
    }
    Ok(data)
}
