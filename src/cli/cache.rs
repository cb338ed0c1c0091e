// src/cli/cache.rs - `cache` subcommands

use super::CacheAction;
use crate::cache::{self, SqliteKvStore};
use crate::infra::config::Config;
use crate::scoring;

pub async fn run_cache(action: CacheAction, config: &Config) -> anyhow::Result<()> {
    let open = || cache::open(&config.cache);

    match action {
        CacheAction::Get { prompt } => match open()?.get(&prompt.join(" ")).await {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => println!("No cached entry"),
        },
        CacheAction::Delete { prompt } => {
            if open()?.delete(&prompt.join(" ")).await {
                println!("Deleted");
            } else {
                anyhow::bail!("delete failed, see log for details");
            }
        }
        CacheAction::Similar {
            prompt,
            style,
            threshold,
        } => {
            let threshold = threshold.unwrap_or(config.cache.similarity_threshold);
            let found = open()?.find_similar(&prompt.join(" "), &style, threshold).await;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        CacheAction::Nearest { prompt, style, top } => {
            let scorer = scoring::from_config(&config.scoring);
            let ranked = open()?.find_nearest(&prompt.join(" "), &style, top, &scorer).await;
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        CacheAction::Stats => {
            println!("{}", serde_json::to_string_pretty(&open()?.stats().await)?);
        }
        CacheAction::Purge => {
            let path = config.cache.resolved_db_path();
            let removed = SqliteKvStore::open(&path)?.purge_expired()?;
            println!("Purged {} expired row(s) from {}", removed, path.display());
        }
    }
    Ok(())
}
