//! Build command implementation.

use aedris_engine::{BUILD_TASK, TaskArgs};
use miette::Result;

use super::{Project, run};

/// Builds the project once, in watch mode, or prints its configuration.
pub async fn execute(
    project: &Project,
    watch: bool,
    print_config: bool,
    print_compiler_config: bool,
) -> Result<()> {
    let args = TaskArgs {
        watch,
        print_config,
        print_compiler_config,
    };

    run::execute(project, BUILD_TASK, args).await
}
