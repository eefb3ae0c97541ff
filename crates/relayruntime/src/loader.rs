// crates/relayruntime/src/loader.rs
use relaycore::{FlowError, Workflow};
use std::path::Path;

/// Load a workflow definition from a JSON file
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, FlowError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let workflow = parse_workflow(&raw)?;
    tracing::debug!(
        "Loaded workflow '{}' from {}",
        workflow.name,
        path.as_ref().display()
    );
    Ok(workflow)
}

/// Parse a workflow definition from JSON text
pub fn parse_workflow(raw: &str) -> Result<Workflow, FlowError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_definition_from_disk() {
        let path = std::env::temp_dir().join(format!("relay-wf-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"name": "disk", "nodes": [{"node_id": "a", "node_type": "input_user"}]}"#,
        )
        .unwrap();

        let workflow = load_workflow(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(workflow.name, "disk");
        assert!(workflow.edges.is_empty());
    }

    #[test]
    fn reports_missing_files_and_bad_json() {
        assert!(matches!(
            load_workflow("/no/such/workflow.json"),
            Err(FlowError::Io(_))
        ));
        assert!(matches!(
            parse_workflow("{\"name\": 1}"),
            Err(FlowError::Serialization(_))
        ));
    }
}
