//! Initialize command.

use console::style;

use docpipe::config::{Config, Settings};
use docpipe::llm::LlmClient;
use docpipe::registry::TypeRegistry;
use docpipe::repository::{run_migrations, AsyncSqlitePool};

/// Create the data directories, apply migrations and report the schema and model in use.
pub async fn cmd_init(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let pool = AsyncSqlitePool::new(&settings.database_url());
    let applied = run_migrations(&pool).await?;
    for name in &applied {
        println!("  {} Applied migration {}", style("✓").green(), name);
    }

    let types = TypeRegistry::load(&settings.schema_path);
    if types.source().is_fallback() {
        println!("  {} Schema: {}", style("!").yellow(), types.source());
    } else {
        println!("  {} Schema: {}", style("✓").green(), types.source());
    }

    let llm = LlmClient::new(config.llm.clone());
    if llm.is_available().await {
        println!(
            "  {} Model: {} ({})",
            style("✓").green(),
            config.llm.model,
            config.llm.provider.as_str()
        );
    } else {
        println!(
            "  {} Model {} ({}) unavailable; classification and metadata will use fallbacks",
            style("!").yellow(),
            config.llm.model,
            config.llm.provider.as_str()
        );
    }

    println!(
        "{} Initialized docpipe in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    Ok(())
}
