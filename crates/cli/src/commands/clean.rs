//! Clean command implementation.

use aedris_engine::{CLEAN_TASK, TaskArgs};
use miette::Result;

use super::{Project, run};

/// Removes the project's build outputs.
pub async fn execute(project: &Project) -> Result<()> {
    if project.env.simulate {
        crate::output::warning("Simulating: nothing will be removed");
    }

    run::execute(project, CLEAN_TASK, TaskArgs::default()).await
}
