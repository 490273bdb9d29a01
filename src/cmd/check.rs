//! `autograder check` — verify node, npm, and WebDriver availability.

use anyhow::{Result, bail};
use autograder::config::Config;
use autograder::functional::webdriver::WebDriverClient;
use autograder::toolchain::Toolchain;
use console::style;
use std::time::Duration;

pub async fn cmd_check(config: &Config) -> Result<()> {
    let toolchain = Toolchain::new(config.install_timeout, config.build_timeout);

    let toolchain_ready = match toolchain.verify_environment().await {
        Ok(versions) => {
            println!("{} node {}", style("ok").green().bold(), versions.node);
            println!("{} npm {}", style("ok").green().bold(), versions.npm);
            true
        }
        Err(e) => {
            println!("{} {}", style("missing").red().bold(), e);
            false
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let driver = WebDriverClient::new(client, &config.webdriver_url);
    if driver.status_ok().await {
        println!(
            "{} WebDriver at {} (full browser testing)",
            style("ok").green().bold(),
            config.webdriver_url
        );
    } else {
        println!(
            "{} WebDriver not reachable at {}; HTTP probing will be used",
            style("note").yellow().bold(),
            config.webdriver_url
        );
    }

    if !toolchain_ready {
        bail!("Environment is not ready for grading");
    }
    println!("{}", style("Environment is ready").green());
    Ok(())
}
