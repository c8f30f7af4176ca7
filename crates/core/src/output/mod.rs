mod json;
mod yaml;

pub use json::to_json;
pub use yaml::to_yaml;

use crate::models::{Dependency, DependencySet, ScanReport};

const WIDTH: usize = 80;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Summary,
}

/// Format a ScanReport according to the specified format.
///
/// `show_builtins` only affects the summary; structured formats carry everything.
pub fn format_report(
    report: &ScanReport,
    format: OutputFormat,
    show_builtins: bool,
) -> Result<String, FormatError> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Yaml => to_yaml(report),
        OutputFormat::Summary => Ok(format_summary(report, show_builtins)),
    }
}

/// Generate a human-readable summary: dependencies, builtins, import errors
pub fn format_summary(report: &ScanReport, show_builtins: bool) -> String {
    let mut output = String::new();

    push_section(&mut output, "Dependencies", &report.dependencies);

    if show_builtins {
        push_section(&mut output, "Builtins", &report.builtins);
    }

    if !report.import_errors.is_empty() {
        push_section(&mut output, "Import Errors", &report.import_errors);
    }

    if report.dependencies.iter().any(Dependency::is_top_level)
        || (show_builtins && report.builtins.iter().any(Dependency::is_top_level))
    {
        output.push_str("\n* imported directly by the target\n");
    }

    output
}

fn push_section(output: &mut String, title: &str, deps: &DependencySet) {
    output.push_str(&title_block(title));
    for dep in deps.sorted() {
        let marker = if dep.is_top_level() { '*' } else { ' ' };
        output.push_str(&format!("{} {:<50}    {}\n", marker, dep.name, detail(dep)));
    }
}

fn title_block(title: &str) -> String {
    let rule = "=".repeat(WIDTH);
    format!("{rule}\n{:^width$}\n{rule}\n", title, width = WIDTH, rule = rule)
}

/// Where a record came from, as far as the trace said
fn detail(dep: &Dependency) -> String {
    match (&dep.origin, &dep.kind, &dep.comment) {
        (Some(origin), Some(kind), _) => format!("{} ({})", origin, kind),
        (Some(origin), None, _) => origin.clone(),
        (None, _, Some(comment)) => comment.clone(),
        (None, Some(kind), None) => kind.clone(),
        (None, None, None) => String::new(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ScanMetadata, LEVEL_STATIC};

    pub(crate) fn sample_report() -> ScanReport {
        let mut yaml = Dependency::named("yaml");
        yaml.kind = Some("precompiled".to_string());
        yaml.origin = Some("/site-packages/yaml/__init__.pyc".to_string());
        yaml.level = LEVEL_STATIC;

        let mut csv = Dependency::named("_csv");
        csv.kind = Some("builtin".to_string());
        csv.comment = Some("builtin".to_string());

        ScanReport {
            target: "app.py".to_string(),
            invocation: vec!["app.py".to_string()],
            dependencies: vec![yaml, Dependency::from_static("attrs")].into(),
            builtins: vec![csv].into(),
            import_errors: vec![Dependency::named("lxml")].into(),
            baseline: DependencySet::new(),
            static_imports: vec![],
            trace: vec![],
            metadata: ScanMetadata::default(),
        }
    }

    #[test]
    fn test_summary_sections_and_order() {
        let summary = format_summary(&sample_report(), true);

        let deps = summary.find("Dependencies").unwrap();
        let builtins = summary.find("Builtins").unwrap();
        let errors = summary.find("Import Errors").unwrap();
        assert!(deps < builtins && builtins < errors);

        assert!(summary.find("attrs").unwrap() < summary.find("yaml").unwrap());
        assert!(summary.contains("/site-packages/yaml/__init__.pyc (precompiled)"));
        assert!(summary.contains("* yaml"));
        assert!(summary.contains("* imported directly by the target"));
    }

    #[test]
    fn test_summary_hides_builtins_and_empty_errors() {
        let mut report = sample_report();
        report.import_errors = DependencySet::new();

        let summary = format_summary(&report, false);
        assert!(!summary.contains("Builtins"));
        assert!(!summary.contains("_csv"));
        assert!(!summary.contains("Import Errors"));
    }

    #[test]
    fn test_title_block_is_centered() {
        let block = title_block("Builtins");
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), WIDTH);
        assert_eq!(lines[1].len(), WIDTH);
        assert_eq!(lines[1].trim(), "Builtins");
    }
}
