use diesel::{pg::Pg, prelude::*};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{Write, error, model::person::UserRole};
use crate::{schema::person, server::auth::ApiKey};

/// The administrator written at startup. The API key is supplied in plaintext
/// here and stored hashed, so the seed file is the only place it ever appears.
#[derive(Deserialize, Serialize, Validate, Clone)]
#[garde(allow_unvalidated)]
pub struct NewAdmin {
    #[garde(length(min = 1))]
    name: String,
    #[garde(length(min = 3))]
    email: String,
    api_key: String,
}

#[derive(Insertable)]
#[diesel(table_name = person, check_for_backend(Pg))]
struct AdminRow<'a> {
    id: Uuid,
    name: &'a str,
    email: &'a str,
    roles: Vec<UserRole>,
    api_key_prefix: String,
    api_key_hash: String,
}

impl NewAdmin {
    async fn write(&self, db_conn: &mut AsyncPgConnection) -> error::Result<Uuid> {
        let hashed = ApiKey::from(self.api_key.clone()).hash();

        let row = AdminRow {
            id: Uuid::now_v7(),
            name: &self.name,
            email: &self.email,
            roles: vec![UserRole::AppAdmin, UserRole::LabStaff],
            api_key_prefix: hashed.prefix.clone(),
            api_key_hash: hashed.hash.clone(),
        };

        // Re-running against an existing database rotates the admin's key
        // rather than failing
        let id = diesel::insert_into(person::table)
            .values(row)
            .on_conflict(person::email)
            .do_update()
            .set((
                person::api_key_prefix.eq(&hashed.prefix),
                person::api_key_hash.eq(&hashed.hash),
                person::roles.eq(vec![UserRole::AppAdmin, UserRole::LabStaff]),
            ))
            .returning(person::id)
            .get_result(db_conn)
            .await?;

        Ok(id)
    }
}

#[derive(Deserialize, Serialize, Clone)]
pub struct SeedData {
    admin: NewAdmin,
    #[serde(default)]
    demo_samples: bool,
}

impl SeedData {
    pub fn dev() -> Self {
        Self {
            admin: NewAdmin {
                name: "Site Admin".to_string(),
                email: "admin@example.com".to_string(),
                api_key: ApiKey::new().to_string(),
            },
            demo_samples: true,
        }
    }

    pub async fn write(
        self,
        dev_user_id: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> anyhow::Result<()> {
        let Self {
            admin,
            demo_samples,
        } = self;

        admin.validate()?;
        let admin_id = admin.write(db_conn).await?;

        if let Some(dev_user_id) = dev_user_id {
            diesel::insert_into(person::table)
                .values((
                    person::id.eq(dev_user_id),
                    person::name.eq("Dev User"),
                    person::email.eq("dev@example.com"),
                    person::roles.eq(vec![UserRole::AppAdmin, UserRole::LabStaff]),
                ))
                .on_conflict_do_nothing()
                .execute(db_conn)
                .await?;
        }

        if demo_samples {
            insert_demo_samples(admin_id, db_conn).await?;
        }

        Ok(())
    }
}

async fn insert_demo_samples(
    admin_id: Uuid,
    db_conn: &mut AsyncPgConnection,
) -> anyhow::Result<()> {
    use super::model::sample::NewSample;

    let today = chrono::Utc::now().date_naive();
    let days_ago = |n: u64| (today - chrono::Days::new(n)).to_string();

    let demo_samples = [
        json!({
            "sample_id": "IPSC-2024-001",
            "name": "Human iPSC Line - Patient A",
            "sample_type": "IPSC",
            "description": "Induced pluripotent stem cells derived from adult fibroblasts. High quality line with confirmed pluripotency markers.",
            "source": "Stanford Stem Cell Institute",
            "storage_location": "Freezer A, Rack 1, Box 5",
            "status": "AVAILABLE",
            "quantity": 10.0,
            "passage_number": 15,
            "collection_date": days_ago(180),
            "viability": 95.5,
            "quality_control_notes": "Karyotype normal. OCT4, SOX2, NANOG positive.",
        }),
        json!({
            "sample_id": "ESC-2024-002",
            "name": "Human Embryonic Stem Cell H9",
            "sample_type": "ESC",
            "description": "Well-characterized human embryonic stem cell line. Widely used in research.",
            "source": "WiCell Research Institute",
            "storage_location": "Freezer B, Rack 2, Box 3",
            "status": "AVAILABLE",
            "quantity": 8.0,
            "passage_number": 42,
            "collection_date": days_ago(120),
            "viability": 92.0,
            "quality_control_notes": "Pluripotency markers confirmed. Mycoplasma negative.",
        }),
        json!({
            "sample_id": "MSC-2024-003",
            "name": "Bone Marrow MSC",
            "sample_type": "MSC",
            "description": "Mesenchymal stem cells isolated from human bone marrow. Capable of multilineage differentiation.",
            "source": "Local Hospital Donor Program",
            "storage_location": "Freezer A, Rack 3, Box 1",
            "status": "AVAILABLE",
            "quantity": 15.0,
            "passage_number": 5,
            "collection_date": days_ago(60),
            "viability": 98.2,
            "quality_control_notes": "CD73, CD90, CD105 positive. CD34, CD45 negative.",
        }),
        json!({
            "sample_id": "HSC-2024-004",
            "name": "Cord Blood Hematopoietic Stem Cells",
            "sample_type": "HSC",
            "description": "Purified CD34+ hematopoietic stem cells from umbilical cord blood.",
            "source": "Cord Blood Bank",
            "storage_location": "Freezer C, Rack 1, Box 2",
            "status": "RESERVED",
            "quantity": 5.0,
            "collection_date": days_ago(30),
            "viability": 96.7,
            "quality_control_notes": "CD34+, CD38- population confirmed by flow cytometry.",
        }),
        json!({
            "sample_id": "NSC-2024-005",
            "name": "Neural Stem Cells",
            "sample_type": "NSC",
            "description": "Neural stem cells derived from iPSCs. Can differentiate into neurons, astrocytes, and oligodendrocytes.",
            "source": "In-house Differentiation",
            "storage_location": "Freezer A, Rack 2, Box 4",
            "status": "AVAILABLE",
            "quantity": 12.0,
            "passage_number": 8,
            "collection_date": days_ago(45),
            "viability": 94.3,
            "quality_control_notes": "Nestin and SOX2 positive. Neural differentiation potential confirmed.",
        }),
        json!({
            "sample_id": "IPSC-2024-006",
            "name": "Disease-specific iPSC - Parkinson's",
            "sample_type": "IPSC",
            "description": "Patient-derived iPSCs from individual with Parkinson's disease. Carries LRRK2 mutation.",
            "source": "Collaborative Research Network",
            "storage_location": "Freezer B, Rack 1, Box 1",
            "status": "IN_USE",
            "quantity": 6.0,
            "passage_number": 20,
            "collection_date": days_ago(90),
            "viability": 93.8,
            "quality_control_notes": "LRRK2 G2019S mutation confirmed. Pluripotency verified.",
        }),
    ];

    for raw in demo_samples {
        let sample: NewSample = serde_json::from_value(raw)?;

        let result = sample.write(Some(admin_id), db_conn).await;
        if !matches!(result, Err(error::Error::DuplicateRecord { .. }) | Ok(_)) {
            result?;
        }
    }

    Ok(())
}
