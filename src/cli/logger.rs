// CLI logging setup

use std::io::Write;

/// Wire env_logger to the global verbosity flags. An explicit `RUST_LOG`
/// wins outright, so `RUST_LOG=trace voxelstream ...` behaves as usual.
pub fn init_logger(verbose: bool, quiet: bool) {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }

    // --verbose means "show me what *this* crate is doing"; the HTTP client
    // stack underneath logs a lot at info and would bury that
    let (everyone, own_crate) = if quiet {
        (log::LevelFilter::Error, log::LevelFilter::Error)
    } else if verbose {
        (log::LevelFilter::Info, log::LevelFilter::Debug)
    } else {
        (log::LevelFilter::Warn, log::LevelFilter::Warn)
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(everyone)
        .filter_module("voxelstream", own_crate);
    if verbose {
        for chatty in ["reqwest", "hyper", "hyper_util", "tower_http"] {
            builder.filter_module(chatty, log::LevelFilter::Warn);
        }
    }

    builder
        .format(|buf, record| match record.level() {
            // plain lines for normal progress, tagged lines for the rest
            log::Level::Info => writeln!(buf, "{}", record.args()),
            level => writeln!(buf, "[{}] {}", level, record.args()),
        })
        .init();
}
