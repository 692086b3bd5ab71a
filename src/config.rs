// Command-line and environment configuration.
use crate::fetch::ApiSettings;
use crate::types::OrgFilter;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://www.find-tender.service.gov.uk/api/1.0/ocdsReleasePackages";

/// Organisation id that disables buyer filtering.
pub const SHOW_ALL: &str = "SHOWALL";

#[derive(Debug, Parser)]
#[command(name = "fts_report")]
#[command(about = "Find a Tender OCDS notice reports", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch releases from the API and write the report
    Run {
        #[command(flatten)]
        api: ApiArgs,
        #[command(flatten)]
        report: ReportArgs,
        /// Run-metadata file holding the last successful window
        #[arg(long, env = "FTS_METADATA", default_value = "fts_metadata.json")]
        metadata: PathBuf,
        /// updatedFrom bound (default: last successful run)
        #[arg(long)]
        from: Option<String>,
        /// updatedTo bound (default: now)
        #[arg(long)]
        to: Option<String>,
    },
    /// Transform saved release-package files without touching the API
    Transform {
        /// Release package files (repeatable)
        #[arg(long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Print the run metadata and the window the next run would use
    Status {
        #[arg(long, env = "FTS_METADATA", default_value = "fts_metadata.json")]
        metadata: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct ApiArgs {
    #[arg(long, env = "FTS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
    #[arg(long, default_value_t = 100)]
    pub page_limit: usize,
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
    /// Pause between pages
    #[arg(long, default_value_t = 1000)]
    pub page_delay_ms: u64,
}

impl ApiArgs {
    pub fn settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.api_url.clone(),
            page_limit: self.page_limit,
            timeout: Duration::from_secs(self.timeout_secs),
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Buyer PPON to report on; SHOWALL keeps every release
    #[arg(long, env = "FTS_PPON", value_parser = parse_ppon)]
    pub ppon: String,
    #[arg(long, default_value = "reports")]
    pub out_dir: PathBuf,
    /// Rows shown per sheet in the console preview
    #[arg(long, default_value_t = 2)]
    pub preview_rows: usize,
}

impl ReportArgs {
    pub fn filter(&self) -> OrgFilter {
        org_filter(&self.ppon)
    }
}

/// A PPON must name an organisation; only the SHOWALL sentinel lifts the
/// filter.
fn parse_ppon(raw: &str) -> Result<String, String> {
    match raw.trim() {
        "" => Err("PPON (organisation ID) is required".to_string()),
        id => Ok(id.to_string()),
    }
}

pub fn org_filter(ppon: &str) -> OrgFilter {
    match ppon {
        SHOW_ALL => OrgFilter::All,
        id => OrgFilter::Buyer(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_showall_disables_filtering() {
        assert_eq!(org_filter(SHOW_ALL), OrgFilter::All);
        assert_eq!(org_filter("PXYZ-1234"), OrgFilter::Buyer("PXYZ-1234".into()));
    }

    #[test]
    fn blank_ppon_is_rejected() {
        for ppon in ["", " ", "\t"] {
            let parsed = Cli::try_parse_from(["fts_report", "transform", "--ppon", ppon, "--input", "a.json"]);
            assert!(parsed.is_err(), "accepted blank PPON {:?}", ppon);
        }
        let cli = Cli::try_parse_from(["fts_report", "transform", "--ppon", " PXYZ-1234 ", "--input", "a.json"]).unwrap();
        match cli.command {
            Command::Transform { report, .. } => {
                assert_eq!(report.filter(), OrgFilter::Buyer("PXYZ-1234".into()))
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_run_with_defaults() {
        let cli = Cli::try_parse_from(["fts_report", "run", "--ppon", "P1", "--from", "2025-03-01T00:00:00"]).unwrap();
        match cli.command {
            Command::Run { api, report, from, to, .. } => {
                assert_eq!(api.settings().page_limit, 100);
                assert_eq!(api.settings().page_delay, Duration::from_secs(1));
                assert_eq!(report.filter(), OrgFilter::Buyer("P1".into()));
                assert_eq!(from.as_deref(), Some("2025-03-01T00:00:00"));
                assert_eq!(to, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn transform_requires_input() {
        assert!(Cli::try_parse_from(["fts_report", "transform", "--ppon", SHOW_ALL]).is_err());
        let cli = Cli::try_parse_from(["fts_report", "transform", "--ppon", SHOW_ALL, "--input", "a.json", "--input", "b.json"]).unwrap();
        assert!(matches!(cli.command, Command::Transform { ref inputs, .. } if inputs.len() == 2));
    }
}
