/*
Copyright 2022 Volker Schwaberow <volker@schwaberow.de>
Permission is hereby granted, free of charge, to any person obtaining a
copy of this software and associated documentation files (the
"Software"), to deal in the Software without restriction, including without
limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the
Software is furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be
included in all copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR
OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE,
ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
DEALINGS IN THE SOFTWARE.
Author(s): Volker Schwaberow
*/

use anyhow::{bail, Context, Result};
use cacheprobe::batch::BatchRunner;
use cacheprobe::cli::{normalize_target, read_targets, Cli};
use cacheprobe::config::{self, Config};
use cacheprobe::getstate::ScanStats;
use cacheprobe::http::Http;
use cacheprobe::report::{write_batch_outcome, ReportWriter};
use cacheprobe::scanner::{ScanTarget, Scanner};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use simple_logger::SimpleLogger;
use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

fn print_banner() {
    eprintln!(
        "{} {} by {} under {} license.",
        env!("CARGO_PKG_NAME").bold(),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
        env!("CARGO_PKG_LICENSE")
    );
}

fn load_config(cli: &Cli) -> Result<Config> {
    let dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => config::default_config_dir()?,
    };
    let mut config = config::load_or_init(&dir)
        .with_context(|| format!("loading configuration from {}", dir.display()))?;

    if let Some(path) = &cli.payload_config {
        config.payloads = config::load_payloads(path)
            .with_context(|| format!("loading payloads from {}", path.display()))?;
    }

    cli.apply(&mut config);
    Ok(config)
}

fn load_targets(cli: &Cli) -> Result<Vec<String>> {
    if let Some(url) = &cli.url {
        return Ok(normalize_target(url).into_iter().collect());
    }
    match &cli.list {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening target list {}", path.display()))?;
            Ok(read_targets(BufReader::new(file))?)
        }
        None => Ok(read_targets(io::stdin().lock())?),
    }
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
        )
        .context("building progress bar template")?
        .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    SimpleLogger::new()
        .with_level(cli.log_level())
        .init()
        .context("initializing logger")?;

    if !cli.quiet {
        print_banner();
    }

    let config = load_config(&cli)?;
    let targets = load_targets(&cli)?;
    if targets.is_empty() {
        bail!("no targets given, use --url, --list or pipe URLs on stdin");
    }
    if config.payloads.headers.is_empty() {
        warn!("payload configuration has no headers, every target will report no change");
    }
    info!(
        "scanning {} targets with {} workers",
        targets.len(),
        config.scanner.threads()
    );

    let gateway = Arc::new(Http::new(config.scanner.client()).context("building HTTP client")?);
    let sink = Arc::new(
        ReportWriter::new(config.scanner.logger()).context("opening result output")?,
    );
    let scanner = Arc::new(Scanner::new(gateway, sink));
    let stats = Arc::new(ScanStats::new());

    let mut runner = BatchRunner::new(scanner, ScanTarget::from_config(&config))
        .with_stats(Arc::clone(&stats))
        .with_error_logging(config.scanner.logger().log_error);
    if cli.progress {
        runner = runner.with_progress(progress_bar(targets.len())?);
    }

    let batch = runner.run_batch(&targets, config.scanner.threads()).await;

    let summary = (!cli.suppress_stats).then(|| stats.summary());
    write_batch_outcome(&mut io::stderr().lock(), &batch, summary.as_deref())
        .context("writing scan summary")?;

    Ok(())
}
