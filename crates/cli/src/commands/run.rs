//! Run command implementation.

use aedris_engine::{TaskArgs, TaskOutput};
use miette::{Result, miette};

use super::Project;
use crate::output;

/// Runs a registered task and reports its output.
pub async fn execute(project: &Project, task_name: &str, args: TaskArgs) -> Result<()> {
    let tools = project.tools().await?;
    let task = tools
        .create_task(task_name)
        .map_err(|e| miette!("{}", e))?;

    let context = tools.task_context().with_build_observer(|result| match result {
        Ok(stats) => output::compilation(stats),
        Err(e) => output::error(&format!("Compilation failed: {}", e)),
    });

    if args.watch {
        output::info("Watching for changes, press Ctrl-C to stop");
        let result = task.run(&context, &args).await;
        return report(result.map_err(|e| miette!("{}", e))?);
    }

    let spinner = output::create_spinner(&format!("Running {}...", task_name));
    let result = task.run(&context, &args).await;
    spinner.finish_and_clear();

    report(result.map_err(|e| miette!("Task {} failed: {}", task_name, e))?)
}

fn report(task_output: TaskOutput) -> Result<()> {
    match task_output {
        TaskOutput::Built(stats) => {
            output::compilation(&stats);
            if !stats.success() {
                return Err(miette!("Build failed"));
            }
        }
        TaskOutput::Cleaned(removed) => {
            if removed.is_empty() {
                output::info("Nothing to clean");
            }
            for dir in &removed {
                output::success(&format!("Removed {}", dir.display()));
            }
        }
        TaskOutput::Inspected(value) => {
            let json = serde_json::to_string_pretty(&value)
                .map_err(|e| miette!("Failed to format output: {}", e))?;
            println!("{}", json);
        }
        TaskOutput::Watched => output::info("Stopped watching"),
    }

    Ok(())
}
