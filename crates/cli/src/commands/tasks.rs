//! Tasks command implementation.

use miette::Result;

use super::Project;
use crate::output;

/// Lists every task the project's plugins register.
pub async fn execute(project: &Project) -> Result<()> {
    let tools = project.tools().await?;

    output::section_header("Tasks");
    for name in tools.task_names() {
        match tools.create_task(name) {
            Ok(task) => output::key_value(name, task.description()),
            Err(_) => output::list_item(name),
        }
    }

    output::section_header("Project");
    output::key_value("config", &project.config_path.display().to_string());
    output::key_value("root", &tools.config().root_dir.display().to_string());
    output::key_value("mode", project.env.mode.as_str());

    Ok(())
}
