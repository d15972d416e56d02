//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "One-shot telemetry evaluation for the Eco-Source daemon CLI."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use eco_source_core::optimize_json;
use tokio::io::AsyncReadExt;

/// Read the whole document from `source`; `-` means stdin.
pub async fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("failed to read telemetry from stdin")?;
        return Ok(buffer);
    }
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read telemetry file {source}"))
}

/// Decide for one bare or enveloped telemetry document, rendered as pretty JSON.
pub fn evaluate_document(document: &str) -> Result<String> {
    let command = optimize_json(document)?;
    serde_json::to_string_pretty(&command).context("failed to render control command")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_command_for_enveloped_telemetry() {
        let rendered = evaluate_document(
            r#"{"telemetry":{"site_id":"T2","grid_price":0.25,"battery_soc":20,"load_amps":10}}"#,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["action"], "SWITCH_TO_GRID");
        assert_eq!(value["savings_estimated"], "None (Safety Priority)");
    }

    #[test]
    fn validation_failures_surface_as_errors() {
        let err = evaluate_document(
            r#"{"site_id":"T2","grid_price":-1,"battery_soc":20,"load_amps":10}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("grid_price"));
    }

    #[tokio::test]
    async fn reads_documents_from_files() {
        let path = std::env::temp_dir().join(format!("eco-sourced-{}.json", std::process::id()));
        tokio::fs::write(&path, r#"{"site_id":"T3","grid_price":0.1,"battery_soc":50,"load_amps":5}"#)
            .await
            .unwrap();
        let document = read_input(path.to_str().unwrap()).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;
        assert!(evaluate_document(&document).unwrap().contains("MAINTAIN_CURRENT"));
    }
}
