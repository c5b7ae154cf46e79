//! Plan command - show what one viewport would request.

use clap::Args;
use deepzoom::scheduler::{plan, LevelPlan};

use super::common::ViewportArgs;
use crate::error::CliError;

/// Arguments for the plan command.
#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub viewport: ViewportArgs,

    /// Print every address, not just the per-level counts
    #[arg(long)]
    pub addresses: bool,
}

/// Run the plan command.
pub fn run(args: PlanArgs) -> Result<(), CliError> {
    args.viewport.validate()?;
    let snapshot = args.viewport.snapshot();

    match plan(&snapshot, args.viewport.max_level) {
        Some(level_plan) => {
            for line in describe(&level_plan, args.addresses) {
                println!("{}", line);
            }
        }
        None => println!("The viewport shows no part of the image."),
    }
    Ok(())
}

fn describe(level_plan: &LevelPlan, addresses: bool) -> Vec<String> {
    let b = &level_plan.bounds;
    let mut lines = vec![
        format!("Current level: {}", level_plan.current_level),
        format!("Scale factor:  {:.3}", level_plan.scale_factor),
        format!(
            "Bounds:        x {}..={}, y {}..={}",
            b.x_start, b.x_end, b.y_start, b.y_end
        ),
        String::new(),
        "Primary tier (requested first):".to_string(),
    ];

    let mut total = 0;
    for level in level_plan.primary_levels() {
        let bounds = b.at_level(level);
        total += bounds.tile_count();
        lines.push(format!("  L{:<3} {} tiles", level, bounds.tile_count()));
        if addresses {
            lines.extend(bounds.addresses().map(|a| format!("        {}", a)));
        }
    }

    let background: Vec<u8> = level_plan.background_levels().collect();
    if !background.is_empty() {
        lines.push("Background tier:".to_string());
        for level in background {
            let bounds = b.at_level(level);
            total += bounds.tile_count();
            lines.push(format!("  L{:<3} {} tiles", level, bounds.tile_count()));
            if addresses {
                lines.extend(bounds.addresses().map(|a| format!("        {}", a)));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!("Total: {} tiles", total));
    lines
}
