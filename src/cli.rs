//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use pdf_mirror_core::FileConfig;

/// Mirror the PDF attachments of a WordPress site.
///
/// Lists every post through the REST API, downloads the PDFs linked from each
/// post body and writes one directory per post with a `metadata.json`.
///
/// Flags override `config.toml`, which overrides built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "pdf-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Site URL, e.g. https://example.org
    #[arg(short = 'u', long)]
    pub base_url: Option<String>,

    /// Directory receiving one sub-directory per post [default: output]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/pdf-mirror/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Categories endpoint [default: <base-url>/wp-json/wp/v2/categories]
    #[arg(long)]
    pub categories_endpoint: Option<String>,

    /// Posts endpoint [default: <base-url>/wp-json/wp/v2/posts]
    #[arg(long)]
    pub posts_endpoint: Option<String>,

    /// Posts processed at once (1-100) [default: 4]
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_concurrent_posts: Option<u8>,

    /// PDF downloads in flight across all posts (1-100) [default: 8]
    #[arg(short = 'd', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_concurrent_downloads: Option<u8>,

    /// Open HTTP connections (1-100) [default: 10]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_connections: Option<u8>,

    /// Attempts per request, including the first (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub retries: Option<u32>,

    /// Backoff base in seconds; waits are base * 2^n plus jitter [default: 1]
    #[arg(long)]
    pub retry_backoff: Option<f64>,

    /// Per-request timeout in seconds (1-3600) [default: 30]
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Items requested per page (1-100) [default: 100]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub per_page: Option<u32>,

    /// User-Agent header value
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    /// Settings given on the command line, as the top configuration layer.
    #[must_use]
    pub fn config_layer(&self) -> FileConfig {
        FileConfig {
            base_url: self.base_url.clone(),
            categories_endpoint: self.categories_endpoint.clone(),
            posts_endpoint: self.posts_endpoint.clone(),
            output_dir: self.output_dir.clone(),
            request_timeout_secs: self.timeout,
            retries: self.retries,
            retry_backoff_secs: self.retry_backoff,
            max_connections: self.max_connections.map(usize::from),
            user_agent: self.user_agent.clone(),
            per_page: self.per_page,
            max_concurrent_posts: self.max_concurrent_posts.map(usize::from),
            max_concurrent_downloads: self.max_concurrent_downloads.map(usize::from),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parse_to_empty_layer() {
        let args = Args::try_parse_from(["pdf-mirror"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.no_progress);
        assert_eq!(args.config_layer(), FileConfig::default());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["pdf-mirror", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["pdf-mirror", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["pdf-mirror", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["pdf-mirror", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["pdf-mirror", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["pdf-mirror", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_all_options_map_to_layer() {
        let args = Args::try_parse_from([
            "pdf-mirror",
            "-u",
            "https://example.org",
            "-o",
            "mirror",
            "--categories-endpoint",
            "https://example.org/cats",
            "--posts-endpoint",
            "https://example.org/posts",
            "-p",
            "2",
            "-d",
            "5",
            "--max-connections",
            "6",
            "-r",
            "4",
            "--retry-backoff",
            "0.5",
            "-t",
            "10",
            "--per-page",
            "50",
            "--user-agent",
            "custom/1.0",
        ])
        .unwrap();

        let layer = args.config_layer();
        assert_eq!(layer.base_url.as_deref(), Some("https://example.org"));
        assert_eq!(layer.output_dir, Some(PathBuf::from("mirror")));
        assert_eq!(layer.categories_endpoint.as_deref(), Some("https://example.org/cats"));
        assert_eq!(layer.posts_endpoint.as_deref(), Some("https://example.org/posts"));
        assert_eq!(layer.max_concurrent_posts, Some(2));
        assert_eq!(layer.max_concurrent_downloads, Some(5));
        assert_eq!(layer.max_connections, Some(6));
        assert_eq!(layer.retries, Some(4));
        assert_eq!(layer.retry_backoff_secs, Some(0.5));
        assert_eq!(layer.request_timeout_secs, Some(10));
        assert_eq!(layer.per_page, Some(50));
        assert_eq!(layer.user_agent.as_deref(), Some("custom/1.0"));
    }

    #[test]
    fn test_cli_concurrency_zero_rejected() {
        let err = Args::try_parse_from(["pdf-mirror", "-d", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_retries_over_max_rejected() {
        let err = Args::try_parse_from(["pdf-mirror", "-r", "11"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_per_page_over_max_rejected() {
        let err = Args::try_parse_from(["pdf-mirror", "--per-page", "101"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
