use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

mod app;

mod domain {
    pub mod entities {
        pub mod config;
        pub mod edit;
        pub mod notice;
        pub mod query;
        pub mod row;
    }
}

mod infra {
    pub mod config {
        pub mod file;
    }
    pub mod export {
        pub mod csv;
    }
    pub mod postgrest {
        pub mod client;
    }
}

mod platform {
    pub mod desktop {
        pub mod blocking;
    }
}

mod ui {
    pub mod state {
        pub mod app_state;
    }
}

mod usecase {
    pub mod ports {
        pub mod gateway;
    }
    pub mod services {
        pub mod edit_service;
        pub mod query_service;
        pub mod submit_service;
    }
}


use domain::entities::config::AppConfig;
use infra::config::file::{default_config_path, load_config, project_dirs};
use infra::postgrest::client::PostgrestGateway;
use usecase::ports::gateway::TableGateway;

/// Long-lived collaborators shared with the UI through the root context.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub config_path: PathBuf,
    pub gateway: Arc<dyn TableGateway>,
    pub db_index: usize,
}

fn main() {
    init_tracing();

    let services = match build_services() {
        Ok(services) => services,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "startup failed");
            std::process::exit(1);
        }
    };
    let webview_data_dir = match default_webview_data_dir() {
        Ok(dir) => dir,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "failed to prepare webview data directory");
            std::process::exit(1);
        }
    };
    let title = services.config.title().to_string();

    dioxus::LaunchBuilder::desktop()
        .with_cfg(
            dioxus::desktop::Config::new()
                .with_window(dioxus::desktop::WindowBuilder::new().with_title(title))
                .with_data_directory(webview_data_dir),
        )
        .with_context(services)
        .launch(app::App);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Loads the config and builds the HTTP client. Runs before the UI runtime
/// starts because the blocking client must not be created inside it.
fn build_services() -> Result<AppServices> {
    let config_path = default_config_path()?;
    let config = load_config(&config_path)?;
    let gateway = PostgrestGateway::new().context("failed to build http client")?;
    tracing::info!(
        config = %config_path.display(),
        databases = config.databases.len(),
        "configuration loaded"
    );
    Ok(AppServices {
        config: Arc::new(config),
        config_path,
        gateway: Arc::new(gateway),
        db_index: 0,
    })
}

fn ensure_webview_data_dir(base_data_dir: &Path) -> Result<PathBuf> {
    let webview_data_dir = base_data_dir.join("webview2");
    std::fs::create_dir_all(&webview_data_dir).with_context(|| {
        format!(
            "failed to create webview dir: {}",
            webview_data_dir.display()
        )
    })?;
    Ok(webview_data_dir)
}

fn default_webview_data_dir() -> Result<PathBuf> {
    ensure_webview_data_dir(project_dirs()?.data_local_dir())
}
