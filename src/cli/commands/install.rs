//! Install command - precache the asset manifest

use super::{network, open_controller};
use crate::cli::args::InstallArgs;
use crate::config::Config;
use crate::error::CampusResult;
use crate::ui::{self, PrecacheProgress, UiContext};

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> CampusResult<()> {
    let ctx = UiContext::detect();
    let controller = open_controller(config, network(config, false))?;

    ui::intro(&ctx, "campus-cache install");
    ui::key_value(&ctx, "origin", &controller.policy().origin());
    ui::key_value(&ctx, "version", controller.version());

    let progress = PrecacheProgress::new(&ctx, controller.version(), controller.manifest().len());
    let report = match controller.install_with_progress(|_| progress.inc()).await {
        Ok(report) => {
            progress.finish(report.cached);
            report
        }
        Err(e) => {
            progress.abandon();
            return Err(e);
        }
    };

    ui::step_ok_detail(
        &ctx,
        &format!("Installed {}", report.version),
        &format!("{} asset(s) precached", report.cached),
    );

    if args.no_activate {
        ui::step_warn_hint(
            &ctx,
            "Generation installed but not active",
            "Run: campus-cache activate",
        );
        return Ok(());
    }

    let activation = controller.activate().await?;
    for generation in &activation.evicted {
        ui::step_info(&ctx, &format!("Evicted {}", generation));
    }
    for (generation, reason) in &activation.failed {
        ui::step_error_detail(&ctx, &format!("Could not evict {}", generation), reason);
    }

    ui::outro_success(&ctx, &format!("{} is active", activation.version));
    Ok(())
}
