//! Values command - print the effective global values

use miette::{IntoDiagnostic, Result};

use crate::Cli;

pub async fn run(cli: &Cli) -> Result<()> {
    let manager = super::setup_manager(cli).await?;
    let values = manager.global_values().into_diagnostic()?;
    print!("{}", values.to_yaml_string().into_diagnostic()?);
    Ok(())
}
