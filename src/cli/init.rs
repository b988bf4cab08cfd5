use crate::config::default_config_toml;
use anyhow::Result;
use std::path::PathBuf;

pub async fn run(path: PathBuf, name: Option<String>) -> Result<()> {
    let site_name = name.unwrap_or_else(|| "Academy".to_string());

    let config_path = path.join("academy.toml");
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    std::fs::create_dir_all(&path)?;
    std::fs::create_dir_all(path.join("data"))?;
    for subdir in ["courses", "images", "files"] {
        std::fs::create_dir_all(path.join("data/media").join(subdir))?;
    }

    std::fs::write(&config_path, default_config_toml(&site_name))?;

    tracing::info!("Created new academy at {:?}", path);
    tracing::info!("Run 'academy migrate' to set up the database");
    tracing::info!("Run 'academy user add --superuser' to create an administrator");
    tracing::info!("Run 'academy serve' to start the server");

    Ok(())
}
