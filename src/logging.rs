use tracing_subscriber::EnvFilter;

/// Инициализация логирования: по умолчанию info (если RUST_LOG не задан),
/// `verbose` поднимает до debug. Логи идут в stderr, чтобы не смешиваться с выводом команд.
pub fn enable_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = if verbose {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    // try_init: повторная инициализация (тесты) не должна паниковать
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
