/*!
 * Command-line interface for media-sampler
 */

use std::io;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use media_sampler::config::{Args, Config};
use media_sampler::logging::init_logging;
use media_sampler::pipeline::Pipeline;
use media_sampler::report::{ReportFormat, Reporter};
use media_sampler::undo::undo_last_operation;

fn main() -> io::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if let Some(shell) = args.generate {
        let mut command = Args::command();
        clap_complete::generate(shell, &mut command, "media-sampler", &mut io::stdout());
        return Ok(());
    }

    init_logging(args.verbose);

    if args.undo {
        let destination = args
            .destination
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "--undo needs --destination"))?;
        let report = undo_last_operation(&destination)?;
        println!(
            "↩️  Undo complete. Deleted {} files ({} already missing).",
            report.removed, report.missing
        );
        for path in &report.refused {
            println!("⚠️  Left {} alone: outside the destination", path.display());
        }
        for (path, reason) in &report.errors {
            println!("⚠️  Could not delete {}: {}", path.display(), reason);
        }
        return Ok(());
    }

    // Create and validate configuration
    let config = Config::from_args(args)?;
    config.validate()?;

    // First Ctrl-C stops new copies, the second one exits
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\nForced exit");
            process::exit(130);
        }
        eprintln!("\nInterrupted: finishing in-flight copies, press Ctrl-C again to exit now");
    }) {
        eprintln!("Warning: Failed to install interrupt handler: {}", e);
    }

    let scan_progress = ProgressBar::new_spinner();
    scan_progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {wide_msg:.dim.white} {pos} files")
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?,
    );
    scan_progress.enable_steady_tick(Duration::from_millis(100));
    scan_progress.set_prefix("📂 Scanning");

    let copy_progress = ProgressBar::new(0);
    copy_progress.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:.bold.cyan} [{bar:30.cyan/blue}] {pos}/{len} ({percent}%) {wide_msg:.dim.white} Elapsed: {elapsed_precise} Remaining: {eta_precise}")
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
        .progress_chars("=> "));
    copy_progress.set_prefix(if config.dry_run { "📝 Planning" } else { "📦 Copying" });

    let summary = Pipeline::new(config)
        .with_cancel(cancel)
        .with_progress(Arc::new(scan_progress), Arc::new(copy_progress))
        .run()?;

    // Create a reporter and print the report
    let reporter = Reporter::new(ReportFormat::ConsoleTable);
    reporter.print_report(&summary);

    if summary.interrupted {
        process::exit(130);
    }
    Ok(())
}
