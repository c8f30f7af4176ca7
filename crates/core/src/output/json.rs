use crate::models::ScanReport;
use super::FormatError;

/// Serialize ScanReport to pretty-printed JSON
pub fn to_json(report: &ScanReport) -> Result<String, FormatError> {
    serde_json::to_string_pretty(report).map_err(FormatError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample_report;

    #[test]
    fn test_to_json() {
        let json = to_json(&sample_report()).unwrap();
        assert!(json.contains("\"dependencies\""));
        assert!(json.contains("\"import_errors\""));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let names: Vec<&str> = value["dependencies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["attrs", "yaml"]);
    }
}
