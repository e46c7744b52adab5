//! Logging initialisation, adapted from the teacher's `crate::init()`: a
//! combined terminal + file `simplelog` logger, minus the async Ctrl-C
//! shutdown hook (this crate has no tokio runtime).

/// initialise combined terminal + file logging into `logs/<unix-ts>.log`.
pub fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{time}.log"))?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file])
        .map_err(|err| anyhow::anyhow!("initialize logger: {err}"))
}
