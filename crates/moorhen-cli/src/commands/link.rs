//! The `link` command: materialize a resolved graph into `node_modules`.

use miette::{IntoDiagnostic, Result};
use moorhen_core::{Config, FlatHoister, PackageLinker, ResolutionGraph};
use std::path::PathBuf;
use tracing::info;

pub struct LinkAction {
    /// Path to the serialized resolution graph.
    pub graph: PathBuf,
    pub cwd: PathBuf,
    pub bin_links: bool,
    pub link_duplicates: bool,
    pub modules_folder: Option<PathBuf>,
}

pub async fn run(action: LinkAction, json: bool) -> Result<()> {
    let mut graph = ResolutionGraph::load(&action.graph).into_diagnostic()?;
    let patterns = graph.seed_patterns.clone();

    info!(
        graph = %action.graph.display(),
        patterns = patterns.len(),
        "linking resolved graph"
    );

    let config = Config::new(action.cwd)
        .with_bin_links(action.bin_links)
        .with_modules_folder(action.modules_folder);

    let mut hoister = FlatHoister::new(config.clone());
    let mut linker = PackageLinker::new(&config, &mut graph);
    linker
        .init(&mut hoister, &patterns, action.link_duplicates)
        .await
        .into_diagnostic()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "linked": patterns.len(),
                "modulesFolder": config.modules_dir(),
            })
        );
    } else {
        println!(
            "Linked {} root pattern(s) into {}",
            patterns.len(),
            config.modules_dir().display()
        );
    }
    Ok(())
}
