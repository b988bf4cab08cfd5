use crate::models::UserType;
use crate::{services::auth, Config, Database};
use anyhow::Result;
use std::path::Path;

use super::UserCommand;

fn parse_type(value: &str) -> Result<UserType> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid user type '{}': use student or instructor", value))
}

fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt)?;
    let password_confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != password_confirm {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}

pub async fn run(config_path: &Path, command: UserCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    let db = Database::open_with_pool_size(&config.database.path, config.database.pool_size)?;
    db.migrate()?;

    match command {
        UserCommand::Add {
            email,
            name,
            user_type,
            superuser,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_new_password("Password: ")?,
            };

            if superuser {
                auth::create_superuser(&db, &email, &name, &password)?;
            } else {
                auth::create_user(&db, &email, &name, &password, parse_type(&user_type)?)?;
            }
            tracing::info!("User '{}' created", email);
        }
        UserCommand::List { user_type } => {
            let filter = user_type.as_deref().map(parse_type).transpose()?;
            let users = auth::list_users(&db, filter)?;

            println!(
                "{:<30} {:<24} {:<12} {:<6}",
                "EMAIL", "NAME", "TYPE", "STAFF"
            );
            println!("{}", "-".repeat(74));
            for user in users {
                println!(
                    "{:<30} {:<24} {:<12} {:<6}",
                    user.email,
                    user.name,
                    user.user_type.to_string(),
                    if user.can_administer() { "yes" } else { "no" }
                );
            }
        }
        UserCommand::Remove { email } => {
            if auth::delete_user_by_email(&db, &email)? {
                tracing::info!("User '{}' removed", email);
            } else {
                tracing::warn!("User '{}' not found", email);
            }
        }
        UserCommand::Passwd { email } => {
            let password = prompt_new_password("New password: ")?;
            auth::update_password(&db, &email, &password)?;
            tracing::info!("Password updated for '{}'", email);
        }
    }

    Ok(())
}
