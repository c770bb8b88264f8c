//! screen-nav 演示程序
//!
//! 入口：加载配置、初始化日志、按 [[pages]] 注册页面，然后从标准输入读取导航命令。
//! 每条命令在独立任务中发布，因此快速连续输入同类命令时可以观察到丢弃行为。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use screen_nav::config::{load_config, AppConfig};
use screen_nav::core::{Delivery, ShutdownCoordinator, ShutdownManager, ShutdownReason};
use screen_nav::navigation::{NavCommand, NavResult, NavigatorHandle, Outcome};
use screen_nav::page::{ConsoleLoader, ConsolePage, Page};
use screen_nav::{observability, Navigation, NavigationBuilder, PageId};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: to <id> | push <id> | replace <id> | back | stack | help | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (config, config_error) = match load_config(config_path) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    observability::init(&config.app.log_filter);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {e}");
    }

    let navigation = build_navigation(&config)
        .await
        .context("Failed to register pages")?;

    let mut errors = navigation.subscribe_errors();
    tokio::spawn(async move {
        while let Ok(error) = errors.recv().await {
            tracing::warn!(code = %error.code, operation = %error.operation, "{error}");
        }
    });

    let manager = ShutdownManager::new();
    let mut coordinator = ShutdownCoordinator::new(manager.clone());
    coordinator.register(navigation.cleanup());

    println!(
        "{} ready, {} page(s) registered. {HELP}",
        config.app.name.as_deref().unwrap_or("screen-nav"),
        config.pages.len()
    );

    let report = coordinator
        .run(read_commands(navigation.navigator().clone(), &navigation, manager))
        .await;
    tracing::info!(?report, "shut down");
    Ok(())
}

async fn build_navigation(config: &AppConfig) -> anyhow::Result<Navigation> {
    let settings = config.navigation.clone();
    let transition = settings.transition();
    let loader = Arc::new(ConsoleLoader::new(settings.load_delay(), transition));

    let navigation = NavigationBuilder::new(settings)
        .with_loader(loader)
        .register_specs(&config.pages, |spec| -> Arc<dyn Page> {
            ConsolePage::new(spec.id.clone(), transition)
        })?
        .build()
        .await;
    Ok(navigation)
}

async fn read_commands(navigator: NavigatorHandle, navigation: &Navigation, manager: ShutdownManager) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                manager.shutdown(ShutdownReason::InputClosed);
                return;
            }
            Err(e) => {
                manager.shutdown(ShutdownReason::FatalError(e.to_string()));
                return;
            }
        };

        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("to"), Some(id)) => NavCommand::To(PageId::from(id)),
            (Some("push"), Some(id)) => NavCommand::Push(PageId::from(id)),
            (Some("replace"), Some(id)) => NavCommand::Replace(PageId::from(id)),
            (Some("back"), _) => NavCommand::Back,
            (Some("stack"), _) => {
                match serde_json::to_string(&navigation.snapshot()) {
                    Ok(json) => println!("{json}"),
                    Err(e) => tracing::warn!("Failed to serialize snapshot: {e}"),
                }
                continue;
            }
            (Some("quit" | "exit"), _) => {
                manager.shutdown(ShutdownReason::UserInitiated);
                return;
            }
            _ => {
                println!("{HELP}");
                continue;
            }
        };

        let navigator = navigator.clone();
        tokio::spawn(async move {
            let label = format!("{command:?}");
            let delivery = match command {
                NavCommand::To(id) => navigator.to(id).await,
                NavCommand::Push(id) => navigator.push(id).await,
                NavCommand::Replace(id) => navigator.replace(id).await,
                NavCommand::Back => navigator.back().await,
            };
            report(&label, delivery);
        });
    }
}

fn report(label: &str, delivery: Delivery<NavResult>) {
    match delivery {
        Delivery::Completed(Ok(Outcome::Shown(id))) => println!("{label}: now showing '{id}'"),
        Delivery::Completed(Ok(Outcome::Emptied)) => println!("{label}: stack is empty"),
        Delivery::Completed(Ok(Outcome::Unchanged)) => println!("{label}: nothing to do"),
        Delivery::Completed(Err(error)) => println!("{label}: {error}"),
        Delivery::Dropped => println!("{label}: dropped, same command still running"),
        Delivery::Cancelled => println!("{label}: cancelled"),
        Delivery::Closed => println!("{label}: navigator stopped"),
    }
}
