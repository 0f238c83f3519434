//! Converge command - startup hooks plus one reconciliation cycle

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::Cli;

pub async fn run(cli: &Cli) -> Result<()> {
    let mut manager = super::setup_manager(cli).await?;

    println!("{} Running startup hooks", style("→").blue());
    manager.run_on_startup().await.into_diagnostic()?;

    println!("{} Reconciling modules", style("→").blue());
    manager.run_reconciliation().await.into_diagnostic()?;

    println!(
        "{} Converged {} module(s)",
        style("✓").green(),
        manager.module_names().len()
    );
    Ok(())
}
