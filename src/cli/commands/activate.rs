//! Activate command - promote the installed generation

use super::{network, open_controller};
use crate::config::Config;
use crate::error::{CampusError, CampusResult};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the activate command
pub async fn execute(config: &Config) -> CampusResult<()> {
    let ctx = UiContext::detect();
    // Activation never touches the network
    let controller = open_controller(config, network(config, true))?;

    if !controller.resume().await? {
        return Err(CampusError::NotInstalled(controller.version().to_string()));
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Activating {}...", controller.version()));

    let report = match controller.activate().await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop_error("Activation failed");
            return Err(e);
        }
    };

    spinner.stop(&format!("{} is active", report.version));

    if report.evicted.is_empty() && report.failed.is_empty() {
        ui::step_info(&ctx, "No stale generations");
    }
    for generation in &report.evicted {
        ui::step_ok(&ctx, &format!("Evicted {}", generation));
    }
    for (generation, reason) in &report.failed {
        ui::step_error_detail(&ctx, &format!("Could not evict {}", generation), reason);
    }

    Ok(())
}
