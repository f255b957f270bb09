use std::fs;

use anyhow::{Context, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser};

use crate::db::seed_data::SeedData;

#[derive(Args, serde::Deserialize, Clone)]
pub struct Config {
    #[arg(long, default_value_t)]
    dev: bool,
    #[arg(long)]
    secrets_dir: Option<Utf8PathBuf>,
    #[arg(long, env = "CRYOBANK_DB_USER", default_value_t = String::from("postgres"))]
    db_user: String,
    #[arg(long, env = "CRYOBANK_DB_PASSWORD", default_value_t)]
    db_password: String,
    #[arg(long, env = "CRYOBANK_DB_HOST", default_value_t = String::from("localhost"))]
    db_host: String,
    #[arg(long, env = "CRYOBANK_DB_PORT", default_value_t = 5432)]
    db_port: u16,
    #[arg(long, env = "CRYOBANK_DB_NAME", default_value_t = String::from("cryobank"))]
    db_name: String,
    #[arg(long, env = "CRYOBANK_HOST", default_value_t = String::from("localhost"))]
    host: String,
    #[arg(long, env = "CRYOBANK_PORT", default_value_t = 8000)]
    port: u16,
    #[arg(long, env = "CRYOBANK_ASSETS_DIR", default_value = "assets")]
    assets_dir: Utf8PathBuf,
    #[arg(skip)]
    seed_data: Option<SeedData>,
    #[arg(long, env = "CRYOBANK_SEED_DATA_PATH")]
    seed_data_path: Option<Utf8PathBuf>,
}

impl Config {
    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.dev
    }

    /// # Errors
    pub fn read_secrets(&mut self) -> anyhow::Result<()> {
        let Self {
            secrets_dir,
            db_user,
            db_password,
            db_name,
            seed_data,
            seed_data_path,
            ..
        } = self;

        let Some(secrets_dir) = secrets_dir else {
            return Ok(());
        };

        let read_secret = |name: &str| {
            fs::read_to_string(secrets_dir.join(name))
                .context(format!("failed to read secret {name}"))
        };

        *db_user = read_secret("db_user")?;
        *db_password = read_secret("db_password")?;
        *db_name = read_secret("db_name")?;
        *seed_data = serde_json::from_str(&read_secret("seed_data")?)?;
        *seed_data_path = None;

        Ok(())
    }

    #[must_use]
    pub fn app_address(&self) -> String {
        let Self { host, port, .. } = self;

        format!("{host}:{port}")
    }

    #[must_use]
    pub fn db_url(&self) -> String {
        let Self {
            db_user,
            db_password,
            db_host,
            db_port,
            db_name,
            ..
        } = self;

        format!("postgres://{db_user}:{db_password}@{db_host}:{db_port}/{db_name}")
    }

    #[must_use]
    pub fn assets_dir(&self) -> &Utf8PathBuf {
        &self.assets_dir
    }

    /// # Errors
    pub fn seed_data(&self) -> anyhow::Result<SeedData> {
        let Self {
            dev,
            seed_data,
            seed_data_path,
            ..
        } = self;

        match (seed_data, seed_data_path) {
            (Some(seed_data), None) => Ok(seed_data.clone()),
            (None, Some(seed_data_path)) => {
                Ok(serde_json::from_str(&fs::read_to_string(seed_data_path)?)?)
            }
            (Some(_), Some(_)) => bail!("`seed_data` and `seed_data_path` are mutually exclusive"),
            (None, None) if *dev => Ok(SeedData::dev()),
            (None, None) => bail!("neither `seed_data` nor `seed_data_path` was supplied"),
        }
    }
}

#[derive(Parser)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
    #[arg(long, env = "CRYOBANK_LOG_DIR")]
    pub log_dir: Option<Utf8PathBuf>,
}
