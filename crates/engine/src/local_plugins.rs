//! Compiles TypeScript plugins that live inside the project before they load.

use std::path::{Path, PathBuf};

use aedris_core::path::{clean_path, join_clean};
use aedris_core::{AedrisError, BuildEnvironment, ProjectConfig, Result};
use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::builder::{Builder, BuilderOptions, BuilderServices};
use crate::target::TargetOptions;

/// Where compiled local plugins are written, relative to the root directory.
pub const LOCAL_PLUGIN_OUTPUT_DIR: &str = ".cache/aedris/local-plugin";

/// Prefix of the targets compiling local plugins.
pub const LOCAL_PLUGIN_TARGET_PREFIX: &str = "@aedris/build-tools:BuildTask:";

/// Relative references to `.ts` files are compiled before loading.
pub fn is_source_plugin(reference: &str) -> bool {
    reference.starts_with('.') && reference.ends_with(".ts")
}

/// Absolute path of the compiled form of a local plugin.
pub fn compiled_plugin_path(root_dir: &Path, reference: &str) -> PathBuf {
    let source = Path::new(reference);
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = source.parent().unwrap_or(Path::new(""));

    clean_path(
        &root_dir
            .join(LOCAL_PLUGIN_OUTPUT_DIR)
            .join(dir)
            .join(format!("{stem}.js")),
    )
}

fn local_plugin_target(root_dir: &Path, reference: &str) -> TargetOptions {
    let source = Path::new(reference);
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output_dir = source.parent().map(Path::to_path_buf).unwrap_or_default();

    TargetOptions::new(format!("{LOCAL_PLUGIN_TARGET_PREFIX}{reference}"))
        .with_context("node")
        .with_entry(stem, [join_clean(root_dir, source).display().to_string()])
        .with_output_dir(output_dir)
}

/// Compiles every local `.ts` plugin with a nested builder and points the
/// config at the compiled files.
///
/// Boxed because the nested builder runs the same lifecycle as its caller.
pub fn build_local_plugins(
    config: &mut ProjectConfig,
    services: BuilderServices,
    env: BuildEnvironment,
) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let sources: Vec<String> = config
            .plugins
            .iter()
            .filter(|reference| is_source_plugin(reference))
            .cloned()
            .collect();

        if sources.is_empty() {
            return Ok(());
        }

        let root_dir = config.root_dir.clone();
        for reference in config.plugins.iter_mut() {
            if is_source_plugin(reference) {
                let compiled = compiled_plugin_path(&root_dir, reference).display().to_string();
                debug!(target: "aedris::local_plugins", source = %reference, %compiled, "rewriting plugin reference");

                // Options follow the plugin to its compiled name.
                let source_key = join_clean(&root_dir, Path::new(reference.as_str())).display().to_string();
                if let Some(options) = config
                    .options
                    .remove(&source_key)
                    .or_else(|| config.options.remove(reference.as_str()))
                {
                    config.options.insert(compiled.clone(), options);
                }

                *reference = compiled;
            }
        }

        info!(target: "aedris::local_plugins", count = sources.len(), "compiling local plugins");

        let nested_config = ProjectConfig::new(&root_dir)
            .with_plugin_shape(true)
            .with_output_dir(LOCAL_PLUGIN_OUTPUT_DIR);
        let mut builder = Builder::new(BuilderOptions::from_config(nested_config).with_env(env), services)?;

        builder.hooks.register_targets.tap("local-plugins", move |b| {
            let sources = sources.clone();
            let root_dir = root_dir.clone();
            Box::pin(async move {
                for reference in &sources {
                    b.create_target(local_plugin_target(&root_dir, reference)).await?;
                }
                Ok(())
            })
        });

        builder.load().await?;
        let stats = builder.build().await?;

        if !stats.success() {
            let errors: Vec<String> = stats.targets.iter().flat_map(|t| t.errors.clone()).collect();
            return Err(AedrisError::Compiler(format!(
                "local plugins failed to compile: {}",
                errors.join("; ")
            )));
        }

        Ok(())
    })
}

/// Compiles local plugins as soon as the raw config is known.
pub fn add_local_plugin_support(builder: &mut Builder) {
    builder.hooks.after_raw_config.tap("local-plugins", |b| {
        Box::pin(async move {
            let services = b.services().clone();
            let env = *b.env();
            build_local_plugins(b.config_mut(), services, env).await
        })
    });
}
