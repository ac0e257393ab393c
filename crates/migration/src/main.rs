use sea_orm::Database;
use sea_orm_migration::prelude::*;

use migration::Migrator;

const USAGE: &str = "usage: migration [up|down [steps]|fresh|status]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:./rozliczenia.db?mode=rwc".to_string());
    let db = Database::connect(&database_url).await?;

    match args.first().map(String::as_str).unwrap_or("up") {
        "up" => Migrator::up(&db, None).await?,
        "down" => {
            let steps = match args.get(1) {
                Some(raw) => raw.parse::<u32>().map_err(|_| USAGE)?,
                None => 1,
            };
            Migrator::down(&db, Some(steps)).await?
        }
        "fresh" => Migrator::fresh(&db).await?,
        "status" => Migrator::status(&db).await?,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
