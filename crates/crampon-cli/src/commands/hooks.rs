//! Hooks command - show what discovery found

use console::style;
use miette::Result;

use crate::Cli;

pub async fn run(cli: &Cli) -> Result<()> {
    let manager = super::setup_manager(cli).await?;

    let hooks = manager.global_hook_names();
    println!("{} {} global hook(s)", style("→").blue(), hooks.len());
    for name in hooks {
        if let Some(hook) = manager.global_hook(&name) {
            let bindings: Vec<String> = hook.bindings.iter().map(|b| b.to_string()).collect();
            println!("  {} [{}]", name, bindings.join(", "));
        }
    }

    let modules = manager.module_names();
    println!("{} {} module(s)", style("→").blue(), modules.len());
    for name in modules {
        println!("  {}", name);
    }
    Ok(())
}
