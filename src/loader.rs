// Release packages saved to disk, read through the same `ReleaseSource`
// interface as the live API.
use crate::error::ReportError;
use crate::fetch::{repair_leading_zeros, FetchWindow, ReleaseSource};
use crate::util::format_int;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files: usize,
    pub packages: usize,
    pub releases: usize,
}

pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// Load releases from one file.
///
/// Accepted shapes:
/// - a release package (`{"releases": [...]}`),
/// - an array of release packages (as saved page by page),
/// - a bare array of releases.
pub fn load_releases(path: &Path) -> Result<(Vec<Value>, LoadReport), ReportError> {
    let raw = fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&repair_leading_zeros(&raw))?;
    let mut report = LoadReport {
        files: 1,
        ..LoadReport::default()
    };
    let mut releases = Vec::new();

    match doc {
        Value::Object(mut package) => {
            report.packages = 1;
            match package.remove("releases") {
                Some(Value::Array(items)) => releases.extend(items),
                _ => warn!(path = %path.display(), "package has no releases array"),
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(mut package) if package.contains_key("releases") => {
                        report.packages += 1;
                        if let Some(Value::Array(inner)) = package.remove("releases") {
                            releases.extend(inner);
                        }
                    }
                    release @ Value::Object(_) => releases.push(release),
                    _ => {}
                }
            }
        }
        _ => warn!(path = %path.display(), "not a release package"),
    }
    report.releases = releases.len();
    Ok((releases, report))
}

impl ReleaseSource for FileSource {
    /// The window is ignored: saved files already hold the releases wanted.
    fn fetch(&self, _window: &FetchWindow) -> Result<Vec<Value>, ReportError> {
        let mut all = Vec::new();
        let mut total = LoadReport::default();
        for path in &self.paths {
            let (releases, report) = load_releases(path)?;
            info!(
                path = %path.display(),
                packages = report.packages,
                releases = %format_int(report.releases),
                "loaded release file"
            );
            total.files += report.files;
            total.packages += report.packages;
            total.releases += report.releases;
            all.extend(releases);
        }
        info!(files = total.files, releases = %format_int(total.releases), "loaded releases from disk");
        Ok(all)
    }
}
