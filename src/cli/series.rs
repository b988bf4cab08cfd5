use crate::{services::series, Config, Database};
use anyhow::Result;
use std::path::Path;

use super::SeriesCommand;

pub async fn run(config_path: &Path, command: SeriesCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    let db = Database::open_with_pool_size(&config.database.path, config.database.pool_size)?;
    db.migrate()?;

    match command {
        SeriesCommand::Add { title, slug } => {
            let id = series::create_series(&db, &title, slug.as_deref())?;
            tracing::info!("Series '{}' created with id {}", title, id);
        }
        SeriesCommand::List => {
            println!("{:<6} {:<30} {:<30} {:<8}", "ID", "TITLE", "SLUG", "COURSES");
            println!("{}", "-".repeat(76));
            for entry in series::list_series_with_counts(&db)? {
                println!(
                    "{:<6} {:<30} {:<30} {:<8}",
                    entry.series.id, entry.series.title, entry.series.slug, entry.total_courses
                );
            }
        }
        SeriesCommand::Remove { slug } => match series::get_series_by_slug(&db, &slug)? {
            Some(found) => {
                series::delete_series(&db, found.id)?;
                tracing::info!("Series '{}' removed with its courses", slug);
            }
            None => tracing::warn!("Series '{}' not found", slug),
        },
    }

    Ok(())
}
