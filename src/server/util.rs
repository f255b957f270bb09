use testcontainers_modules::{
    postgres::Postgres,
    testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
};
use uuid::Uuid;

const POSTGRES_TAG: &str = "17-alpine";

/// A disposable Postgres instance backing dev mode and the integration test.
/// Dev mode trusts host auth; the test asks for a generated password so it
/// exercises the production connection string.
pub struct DevContainer {
    postgres: ContainerAsync<Postgres>,
    password: Option<String>,
}

impl DevContainer {
    /// # Errors
    pub async fn new(name: &str, password_protected: bool) -> anyhow::Result<Self> {
        let image = Postgres::default();

        let (image, password) = if password_protected {
            let password = Uuid::now_v7().to_string();
            (image.with_password(&password), Some(password))
        } else {
            (image.with_host_auth(), None)
        };

        let postgres = image
            .with_tag(POSTGRES_TAG)
            .with_container_name(name)
            .start()
            .await?;

        Ok(Self { postgres, password })
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// # Errors
    pub async fn db_host(&self) -> anyhow::Result<String> {
        Ok(self.postgres.get_host().await?.to_string())
    }

    /// # Errors
    pub async fn db_port(&self) -> anyhow::Result<u16> {
        Ok(self.postgres.get_host_port_ipv4(5432).await?)
    }

    /// # Errors
    pub async fn db_url(&self) -> anyhow::Result<String> {
        let host = self.db_host().await?;
        let port = self.db_port().await?;

        let url = match &self.password {
            Some(password) => format!("postgres://postgres:{password}@{host}:{port}/postgres"),
            None => format!("postgres://postgres@{host}:{port}/postgres"),
        };

        Ok(url)
    }
}
