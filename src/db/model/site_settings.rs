use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use garde::Validate;
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use crate::{db::error, schema::site_settings};

const SETTINGS_KEY: &str = "default";

/// Site-wide branding. A single row keyed on a fixed value, created lazily on
/// first read and never deleted.
#[derive(Serialize, Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = site_settings, check_for_backend(Pg))]
pub struct SiteSettings {
    #[serde(skip)]
    key: String,
    pub site_name_en: String,
    pub site_name_zh_hant: String,
    pub site_name_zh_hans: String,
    pub logo_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SiteSettings {
    /// Resolves the display name for a language tag, falling back to English
    /// when the tag is unknown or the translation is blank.
    #[must_use]
    pub fn site_name(&self, language: &str) -> &str {
        let tag = language.to_ascii_lowercase().replace('_', "-");

        let name = match tag.as_str() {
            "zh-hant" => &self.site_name_zh_hant,
            "zh-hans" => &self.site_name_zh_hans,
            _ => &self.site_name_en,
        };

        if name.is_empty() {
            &self.site_name_en
        } else {
            name
        }
    }

    pub async fn fetch_or_init(db_conn: &mut AsyncPgConnection) -> error::Result<Self> {
        diesel::insert_into(site_settings::table)
            .values(site_settings::key.eq(SETTINGS_KEY))
            .on_conflict_do_nothing()
            .execute(db_conn)
            .await?;

        Ok(site_settings::table
            .find(SETTINGS_KEY)
            .select(Self::as_select())
            .first(db_conn)
            .await?)
    }
}

#[derive(Deserialize, AsChangeset, Validate, Valuable, Clone)]
#[diesel(table_name = site_settings, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct UpdatedSiteSettings {
    #[serde(default)]
    #[garde(inner(length(min = 1)))]
    pub site_name_en: Option<String>,
    #[serde(default)]
    pub site_name_zh_hant: Option<String>,
    #[serde(default)]
    pub site_name_zh_hans: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
}

impl UpdatedSiteSettings {
    pub async fn apply(self, db_conn: &mut AsyncPgConnection) -> error::Result<SiteSettings> {
        let current = SiteSettings::fetch_or_init(db_conn).await?;

        // An empty changeset is a query-builder error in diesel
        if matches!(
            &self,
            Self {
                site_name_en: None,
                site_name_zh_hant: None,
                site_name_zh_hans: None,
                logo_path: None,
            }
        ) {
            return Ok(current);
        }

        Ok(diesel::update(site_settings::table.find(SETTINGS_KEY))
            .set(self)
            .returning(SiteSettings::as_returning())
            .get_result(db_conn)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn settings() -> SiteSettings {
        SiteSettings {
            key: SETTINGS_KEY.to_string(),
            site_name_en: "Stem Cell Resource Bank".to_string(),
            site_name_zh_hant: "幹細胞資源庫".to_string(),
            site_name_zh_hans: "干细胞资源库".to_string(),
            logo_path: None,
            updated_at: Utc::now(),
        }
    }

    #[rstest]
    #[case("en", "Stem Cell Resource Bank")]
    #[case("zh-hant", "幹細胞資源庫")]
    #[case("zh_hant", "幹細胞資源庫")]
    #[case("ZH-Hans", "干细胞资源库")]
    #[case("fr", "Stem Cell Resource Bank")]
    fn site_name_resolution(#[case] language: &str, #[case] expected: &str) {
        assert_eq!(settings().site_name(language), expected);
    }

    #[test]
    fn blank_translation_falls_back_to_english() {
        let mut settings = settings();
        settings.site_name_zh_hans = String::new();

        assert_eq!(settings.site_name("zh-hans"), "Stem Cell Resource Bank");
    }
}
