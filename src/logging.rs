use log::LevelFilter;
use std::path::Path;

/// Console level for the number of `-v` flags given.
pub fn console_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace, // Everything (most verbose)
    }
}

/// Initialize the global logger: progress to stderr, a more detailed copy to `log_file`.
pub fn init_logging(verbosity: u8, log_file: &Path) -> anyhow::Result<()> {
    let console = console_level(verbosity);
    let file_level = console.max(LevelFilter::Debug);

    let stderr = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(console)
        .chain(std::io::stderr());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} [{}] {}",
                chrono::Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(file_level)
        .chain(
            fern::log_file(log_file)
                .map_err(|e| anyhow::anyhow!("Failed to open log file {:?}: {}", log_file, e))?,
        );

    fern::Dispatch::new()
        // Dependencies (reqwest, hyper) only get through when something is wrong.
        .level(LevelFilter::Warn)
        .level_for(env!("CARGO_CRATE_NAME"), file_level)
        .chain(stderr)
        .chain(file)
        .apply()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}
