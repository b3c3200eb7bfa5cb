use anyhow::{Result, bail};
use colored::Colorize;
use descriptor::ModuleDescriptor;
use entitlement::{ModuleKind, ModuleSequencer, TransitionType};
use integration::DescriptorSource;

use crate::Context;
use crate::catalog;
use crate::cli::SequenceArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &SequenceArgs) -> Result<()> {
    let catalog = catalog::load(&ctx.config.catalog_path(args.catalog.as_deref())?)?;
    let descriptor = catalog.get_application_descriptor(&args.app_id)?;
    let installed = args
        .installed
        .as_deref()
        .map(|id| catalog.get_application_descriptor(id))
        .transpose()?;

    if let Some(installed) = &installed {
        if installed.name != descriptor.name {
            bail!("{} is not a version of {}", installed.id(), descriptor.name);
        }
    }

    let sequences = if args.revoke {
        ModuleSequencer::sequence_application(TransitionType::Revoke, None, Some(&descriptor))?
    } else if installed.is_some() {
        ModuleSequencer::sequence_application(
            TransitionType::Upgrade,
            Some(&descriptor),
            installed.as_ref(),
        )?
    } else {
        ModuleSequencer::sequence_application(TransitionType::Entitle, Some(&descriptor), None)?
    };

    ui::header(&format!("{} ({})", sequences.application_id, sequences.transition));
    if sequences.is_empty() {
        ui::info("No module changes");
        return Ok(());
    }

    for kind in [ModuleKind::Backend, ModuleKind::Ui] {
        let sequence = sequences.sequence(kind);
        if sequence.is_empty() {
            continue;
        }
        ui::section(kind.as_str());
        for (i, level) in sequence.levels.iter().enumerate() {
            let modules = level.iter().map(|holder| match holder.installed() {
                Some(installed) => format!("{} → {}", installed.id(), holder.current().version),
                None => holder.current().id(),
            });
            println!("  {} {}", format!("level {i}").blue().bold(), level_line(modules));
        }
        for (i, level) in sequence.deprecated_levels.iter().enumerate() {
            println!(
                "  {} {}",
                format!("remove {i}").yellow().bold(),
                level_line(level.iter().map(ModuleDescriptor::id))
            );
        }
    }
    Ok(())
}

fn level_line(ids: impl Iterator<Item = String>) -> String {
    ids.collect::<Vec<_>>().join(", ")
}
