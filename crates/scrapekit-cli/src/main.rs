//! ScrapeKit CLI - scrape URLs from the command line or serve the tool over MCP

mod mcp;

use clap::{Args, Parser, Subcommand};
use scrapekit::{FetchResult, ScrapeOptions, Scraper, Valves, TOOL_LLMTXT};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// ScrapeKit - concurrent URL scraping for LLM tools
#[derive(Parser, Debug)]
#[command(name = "scrapekit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print full help with examples (llmtxt)
    #[arg(long)]
    llmtxt: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape one or more URLs
    Scrape {
        /// URLs to scrape, results are printed in the same order
        #[arg(required = true)]
        urls: Vec<String>,

        /// Return raw HTML instead of a summary
        #[arg(long)]
        html: bool,

        /// Fetch Wikipedia and GitHub URLs directly instead of through their APIs
        #[arg(long)]
        no_redirect: bool,

        /// Print structured results as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        valves: ValveArgs,
    },
    /// Fetch Wikipedia articles by title
    Wikipedia {
        /// Article titles
        #[arg(required = true)]
        titles: Vec<String>,

        /// Language edition (overrides wiki_lang)
        #[arg(long)]
        lang: Option<String>,

        /// Return the rendered article HTML instead of the plain-text extract
        #[arg(long)]
        html: bool,

        /// Print structured results as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        valves: ValveArgs,
    },
    /// Run as MCP (Model Context Protocol) server over stdio
    Mcp {
        #[command(flatten)]
        valves: ValveArgs,
    },
}

/// Valve sources: an optional TOML file plus per-field overrides
#[derive(Args, Debug, Default)]
struct ValveArgs {
    /// TOML file with valve settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Custom User-Agent
    #[arg(long)]
    user_agent: Option<String>,

    /// Extra attempts after a failed fetch
    #[arg(long)]
    retries: Option<u32>,

    /// Maximum number of concurrent fetches
    #[arg(long)]
    concurrency: Option<usize>,

    /// Bearer token for the GitHub API
    #[arg(long)]
    github_token: Option<String>,

    /// Only fetch from this host (repeatable)
    #[arg(long = "allow-host", value_name = "HOST")]
    allow_hosts: Vec<String>,

    /// Never fetch from this host (repeatable)
    #[arg(long = "deny-host", value_name = "HOST")]
    deny_hosts: Vec<String>,
}

impl ValveArgs {
    /// Load the config file (if any) and apply flag overrides
    fn load(&self) -> Result<Valves, String> {
        let valves = match self.config {
            Some(ref path) => read_config(path)?,
            None => Valves::default(),
        };
        Ok(self.apply(valves))
    }

    fn apply(&self, mut valves: Valves) -> Valves {
        if let Some(ref ua) = self.user_agent {
            valves.user_agent = ua.clone();
        }
        if let Some(retries) = self.retries {
            valves.retries = retries;
        }
        if let Some(concurrency) = self.concurrency {
            valves.concurrency = concurrency;
        }
        if let Some(ref token) = self.github_token {
            valves.github_token = Some(token.clone());
        }
        valves.allow_hosts.extend(self.allow_hosts.iter().cloned());
        valves.deny_hosts.extend(self.deny_hosts.iter().cloned());
        valves
    }
}

fn read_config(path: &Path) -> Result<Valves, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    parse_config(&text).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

fn parse_config(text: &str) -> Result<Valves, toml::de::Error> {
    toml::from_str(text)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.llmtxt {
        writeln_safe(TOOL_LLMTXT);
        std::process::exit(0);
    }

    init_tracing();

    match cli.command {
        Some(Commands::Scrape {
            urls,
            html,
            no_redirect,
            json,
            valves,
        }) => {
            let scraper = build_scraper(&valves);
            let options = ScrapeOptions {
                wants_html: html,
                redirect: !no_redirect,
            };
            let results = scraper.scrape_many(&urls, options).await;
            print_results(&results, json);
            scraper.close();
        }
        Some(Commands::Wikipedia {
            titles,
            lang,
            html,
            json,
            valves,
        }) => {
            let scraper = build_scraper(&valves);
            let lang = lang.unwrap_or_else(|| scraper.valves().wiki_lang.clone());
            match scraper.wikipedia_in(&lang, &titles, html).await {
                Ok(results) => print_results(&results, json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
            scraper.close();
        }
        Some(Commands::Mcp { valves }) => {
            let valves = load_valves_or_exit(&valves);
            mcp::run_server(valves).await;
        }
        None => {
            eprintln!("Usage: scrapekit scrape <URL>...");
            eprintln!("   or: scrapekit wikipedia <TITLE>...");
            eprintln!("   or: scrapekit mcp");
            eprintln!("   or: scrapekit --help");
            std::process::exit(1);
        }
    }
}

/// Log to stderr so stdout only carries results and JSON-RPC frames
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_valves_or_exit(args: &ValveArgs) -> Valves {
    args.load().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

fn build_scraper(args: &ValveArgs) -> Scraper {
    let valves = load_valves_or_exit(args);
    tracing::debug!(concurrency = valves.concurrency, retries = valves.retries, "Loaded valves");
    Scraper::builder().valves(valves).build().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

fn print_results(results: &[FetchResult], json: bool) {
    if json {
        let json = serde_json::to_string_pretty(results).unwrap_or_else(|e| {
            eprintln!("Error serializing results: {}", e);
            std::process::exit(1);
        });
        writeln_safe(&json);
    } else {
        writeln_safe(&format_text(results));
    }
}

/// Rendered results separated by blank lines, in input order
fn format_text(results: &[FetchResult]) -> String {
    results
        .iter()
        .map(FetchResult::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scrape_command() {
        let cli = Cli::try_parse_from([
            "scrapekit",
            "scrape",
            "https://a.example",
            "https://b.example",
            "--html",
            "--no-redirect",
            "--retries",
            "1",
            "--deny-host",
            "bad.example",
            "--deny-host",
            "worse.example",
        ])
        .unwrap();

        let Some(Commands::Scrape {
            urls,
            html,
            no_redirect,
            json,
            valves,
        }) = cli.command
        else {
            panic!("expected scrape command");
        };
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
        assert!(html);
        assert!(no_redirect);
        assert!(!json);
        assert_eq!(valves.retries, Some(1));
        assert_eq!(valves.deny_hosts, vec!["bad.example", "worse.example"]);
    }

    #[test]
    fn test_scrape_requires_url() {
        assert!(Cli::try_parse_from(["scrapekit", "scrape"]).is_err());
    }

    #[test]
    fn test_parse_wikipedia_command() {
        let cli =
            Cli::try_parse_from(["scrapekit", "wikipedia", "Alan Turing", "--lang", "de"]).unwrap();
        match cli.command {
            Some(Commands::Wikipedia { titles, lang, .. }) => {
                assert_eq!(titles, vec!["Alan Turing"]);
                assert_eq!(lang.as_deref(), Some("de"));
            }
            other => panic!("expected wikipedia command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_config() {
        let valves = parse_config(
            r#"
retries = 1
concurrency = 8
deny_hosts = ["bad.example"]
"#,
        )
        .unwrap();
        assert_eq!(valves.retries, 1);
        assert_eq!(valves.concurrency, 8);
        assert!(valves.deny_hosts.contains("bad.example"));
        assert_eq!(valves.wiki_lang, "en");
    }

    #[test]
    fn test_parse_config_rejects_unknown_types() {
        assert!(parse_config("retries = \"many\"").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let file = parse_config("retries = 5\nuser_agent = \"FromFile/1.0\"\nallow_hosts = [\"a.example\"]").unwrap();
        let args = ValveArgs {
            retries: Some(0),
            allow_hosts: vec!["b.example".to_string()],
            ..Default::default()
        };
        let valves = args.apply(file);
        assert_eq!(valves.retries, 0);
        assert_eq!(valves.user_agent, "FromFile/1.0");
        assert!(valves.allow_hosts.contains("a.example"));
        assert!(valves.allow_hosts.contains("b.example"));
    }

    #[test]
    fn test_missing_config_file() {
        let args = ValveArgs {
            config: Some(PathBuf::from("/nonexistent/scrapekit.toml")),
            ..Default::default()
        };
        let err = args.load().unwrap_err();
        assert!(err.starts_with("Cannot read config"));
    }

    #[test]
    fn test_format_text_keeps_order() {
        let results = vec![
            FetchResult::failed("https://a.example", "Request timed out"),
            FetchResult::blocked("https://b.example", "Blocked: host 'b.example'"),
        ];
        assert_eq!(
            format_text(&results),
            "Failed to fetch https://a.example: Request timed out\n\nBlocked: host 'b.example'"
        );
    }
}
