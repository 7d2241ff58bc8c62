//! Fetch command - run one request through the controller

use super::{network, open_controller};
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::controller::{ResponseSource, Served};
use crate::dispatch::Dispatcher;
use crate::error::CampusResult;
use crate::http::{Method, Request};
use console::style;
use std::sync::Arc;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> CampusResult<()> {
    let method: Method = args.method.parse()?;
    let network = network(config, args.offline);
    let controller = Arc::new(open_controller(config, Arc::clone(&network))?);
    let url = controller.policy().resolve(&args.target)?;

    let dispatcher = Dispatcher::from_config(&config.controller, network)?;
    dispatcher.adopt(Arc::clone(&controller));
    let page = dispatcher.open_page(&args.page);

    debug!("{} {} from {} (offline: {})", method, url, args.page, args.offline);
    let served = dispatcher.fetch(page, &Request::new(method, url)).await?;
    controller.settle().await;

    print_served(&served, args.include_headers);
    Ok(())
}

fn print_served(served: &Served, include_headers: bool) {
    let status = served.response.status;
    let status_style = if (200..300).contains(&status) {
        style(status.to_string()).green()
    } else if status >= 500 {
        style(status.to_string()).red()
    } else {
        style(status.to_string()).yellow()
    };

    println!("HTTP {} {}", status_style, source_label(served.source));

    if include_headers {
        for (name, value) in &served.response.headers {
            println!("{}: {}", style(name).dim(), value);
        }
    }

    println!();
    println!("{}", served.response.text());
}

fn source_label(source: ResponseSource) -> String {
    match source {
        ResponseSource::Network => style("(network)").dim().to_string(),
        ResponseSource::Cache => style("(cache)").cyan().to_string(),
        ResponseSource::Fallback => style("(fallback)").yellow().to_string(),
        ResponseSource::Passthrough => style("(passthrough)").dim().to_string(),
    }
}
