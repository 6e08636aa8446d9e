use std::sync::Once;

/// Log target used for context creation and loss.
pub const TAG_CONTEXT: &str = "styleframe::context";
/// Log target used for compute backend registration.
pub const TAG_ADAPTER: &str = "styleframe::adapter";
/// Log target used by the draw pipeline.
pub const TAG_RENDER: &str = "styleframe::render";
/// Log target used by fence polling.
pub const TAG_SYNC: &str = "styleframe::sync";
/// Log target used by the per-frame driver and its telemetry.
pub const TAG_FRAME: &str = "styleframe::frame";

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info", "warn",
/// "styleframe_engine=debug,wgpu=warn").
///
/// `write_style` controls ANSI coloring behavior.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Subsequent calls are ignored. Entries carry a timestamp, the target tag
/// (see the `TAG_*` constants) and the message payload.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            // wgpu is chatty at info; keep it at warn unless asked.
            builder.filter_level(log::LevelFilter::Info);
            builder.filter_module("wgpu_core", log::LevelFilter::Warn);
            builder.filter_module("wgpu_hal", log::LevelFilter::Warn);
            builder.filter_module("naga", log::LevelFilter::Warn);
        }

        builder.write_style(config.write_style);
        builder.format_target(true);
        builder.format_timestamp_millis();

        // A test harness may have installed a logger already.
        if builder.try_init().is_err() {
            return;
        }

        log::debug!("logging initialized");
    });
}
