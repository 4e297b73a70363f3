//! Loading prompt templates from YAML.

use crate::types::PromptTemplate;
use recall_core::{AppError, AppResult};
use std::path::Path;

/// Load a prompt template by ID from the workspace.
///
/// Looks for `.recall/prompts/<id>.yml`.
///
/// # Example
/// ```no_run
/// use recall_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let template = load_prompt(Path::new("."), "support.answer")?;
/// println!("Loaded template: {}", template.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptTemplate> {
    let prompt_file = workspace_path
        .join(".recall/prompts")
        .join(format!("{}.yml", prompt_id));
    load_template(&prompt_file)
}

/// Load a prompt template from a YAML file.
pub fn load_template(path: &Path) -> AppResult<PromptTemplate> {
    tracing::debug!("Loading prompt template from: {:?}", path);

    if !path.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            path
        )));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Prompt(format!("Failed to read prompt file {:?}: {}", path, e))
    })?;

    let template: PromptTemplate = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {:?}: {}", path, e))
    })?;

    validate_template(&template)?;

    tracing::info!("Loaded prompt template: {}", template.id);

    Ok(template)
}

fn validate_template(template: &PromptTemplate) -> AppResult<()> {
    if template.id.trim().is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if template.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !template.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            template.api_version
        )));
    }

    if !template.template.contains("{{query}}") {
        return Err(AppError::Prompt(format!(
            "Prompt template '{}' never renders {{{{query}}}}",
            template.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, content: &str) -> PathBuf {
        let prompts_dir = dir.join(".recall/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        let file_path = prompts_dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "support.answer",
            r#"
id: support.answer
title: "Support answer"
apiVersion: "1.0"
system: "Be brief."
template: "Context: {{context}}\nQ: {{query}}"
historyTurns: 1
"#,
        );

        let template = load_prompt(temp_dir.path(), "support.answer").unwrap();
        assert_eq!(template.id, "support.answer");
        assert_eq!(template.system.as_deref(), Some("Be brief."));
        assert_eq!(template.history_turns, 1);
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_prompt(temp_dir.path(), "nonexistent");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");
        assert!(load_template(&path).is_err());
    }

    #[test]
    fn test_template_must_render_query() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_prompt(
            temp_dir.path(),
            "no-query",
            "id: no-query\ntemplate: \"{{context}}\"\n",
        );
        let err = load_template(&path).unwrap_err();
        assert!(err.to_string().contains("never renders"));
    }
}
