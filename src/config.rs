use argh::FromArgs;

/// Longest accepted input line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

pub const DEFAULT_PROMPT: &str = "pipeshell $ ";

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(FromArgs, Debug)]
/// An interactive shell that runs commands and `|` pipelines and records
/// every spawned process.
pub struct Args {
    #[argh(option)]
    /// prompt printed before each line.
    pub prompt: Option<String>,

    #[argh(option)]
    /// maximum accepted input line length in bytes (default 1024).
    pub max_line_len: Option<usize>,

    #[argh(option)]
    /// log filter used when RUST_LOG is unset, e.g. "debug" (default "warn").
    pub log: Option<String>,
}

/// Resolved interpreter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub prompt: String,
    pub max_line_len: usize,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_owned(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let defaults = Config::default();
        Self {
            prompt: args.prompt.unwrap_or(defaults.prompt),
            // A zero limit would reject every line.
            max_line_len: args
                .max_line_len
                .filter(|len| *len > 0)
                .unwrap_or(defaults.max_line_len),
            log_filter: args.log.unwrap_or(defaults.log_filter),
        }
    }
}
